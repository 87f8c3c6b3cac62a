use crate::row::{InitPhase, InvalidInfo, RowDescriptor};

use super::InitStep;

/// Accurate 16 to 8 bit reduction.
///
/// When no channel has more than 8 significant bits the low byte is just
/// dropped.
#[derive(Debug, Clone, Default)]
pub(crate) struct Scale16 {
  chop: bool,
  /// Insignificant low bits per `[r, g, b, a]` slot.
  shifts: [u8; 4],
}
impl Scale16 {
  pub fn init(&mut self, tc: &mut RowDescriptor) -> InitStep {
    if tc.bit_depth != 16 {
      return InitStep::Inert;
    }
    tc.bit_depth = 8;
    tc.invalid.insert(InvalidInfo::TRNS | InvalidInfo::HIST | InvalidInfo::PCAL);
    if tc.init == Some(InitPhase::Final) {
      let (layout, n) = tc.layout();
      self.chop = layout[..n].iter().all(|c| tc.sbit[c.sbit_index()] <= 8);
      for (shift, &s) in self.shifts.iter_mut().zip(&tc.sbit) {
        *shift = 16 - s.clamp(1, 16);
      }
      if !self.chop {
        let mut handled = true;
        for s in &mut tc.sbit {
          if *s >= 8 {
            *s = 8;
          } else {
            handled = false;
          }
        }
        if handled {
          tc.invalid.insert(InvalidInfo::SBIT);
        }
      }
    }
    InitStep::Keep
  }

  pub fn run(&self, row: &mut [u8], tc: &mut RowDescriptor) {
    let (layout, n) = tc.layout();
    let samples = tc.width as usize * n;
    for i in 0..samples {
      row[i] = if self.chop {
        row[i * 2]
      } else {
        let v = u32::from(u16::from_be_bytes([row[i * 2], row[i * 2 + 1]]));
        let shift = u32::from(self.shifts[layout[i % n].sbit_index()]);
        let bits = 16 - shift;
        let scale = (0xFF00_0000_u32 + ((1 << bits) >> 1)) / ((1 << bits) - 1);
        (((v >> shift) * scale + 0x80_0000) >> 24) as u8
      };
    }
    tc.bit_depth = 8;
  }
}
