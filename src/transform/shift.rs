use crate::{
  row::{get_packed, get_sample, put_packed, put_sample, Channel, RowDescriptor, RowFormat},
  sample::replicate,
};

use super::InitStep;

/// The significant bits of each channel, as for [`set_shift`].
///
/// [`set_shift`]: crate::push::ReadSession::set_shift
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TrueBits {
  pub red: u8,
  pub green: u8,
  pub blue: u8,
  pub gray: u8,
  pub alpha: u8,
}
impl TrueBits {
  #[inline]
  #[must_use]
  fn of(&self, channel: Channel) -> u8 {
    match channel {
      Channel::Red => self.red,
      Channel::Green => self.green,
      Channel::Blue => self.blue,
      Channel::Gray => self.gray,
      Channel::Alpha => self.alpha,
    }
  }
}

/// Moves samples down to their significant bits (decoding), or back up with
/// bit replication (encoding).
#[derive(Debug, Clone)]
pub(crate) struct Shift {
  true_bits: TrueBits,
}
impl Shift {
  #[inline]
  #[must_use]
  pub const fn new(true_bits: TrueBits) -> Self {
    Self { true_bits }
  }

  /// The per-slot `(significant bits, shift)`, with a zero shift where a
  /// value doesn't fit the depth.
  fn shifts(&self, tc: &RowDescriptor) -> ([(u8, u8); 4], usize) {
    let (layout, n) = tc.layout();
    let mut out = [(tc.bit_depth, 0); 4];
    for (o, &c) in out.iter_mut().zip(&layout[..n]) {
      let bits = self.true_bits.of(c);
      if bits > 0 && bits < tc.bit_depth {
        *o = (bits, tc.bit_depth - bits);
      }
    }
    (out, n)
  }

  pub fn init(&mut self, tc: &mut RowDescriptor) -> InitStep {
    if tc.format.contains(RowFormat::COLORMAP) {
      return InitStep::Inert;
    }
    let (shifts, n) = self.shifts(tc);
    if shifts[..n].iter().all(|&(_, s)| s == 0) {
      return InitStep::Inert;
    }
    tc.format.insert(RowFormat::RANGE);
    InitStep::Keep
  }

  pub fn run(&self, row: &mut [u8], tc: &mut RowDescriptor) {
    let (shifts, n) = self.shifts(tc);
    self.each_sample(row, tc, n, |i, v| v >> shifts[i % n].1);
    tc.format.insert(RowFormat::RANGE);
  }

  pub fn run_backwards(&self, row: &mut [u8], tc: &RowDescriptor) {
    let (shifts, n) = self.shifts(tc);
    let depth = u32::from(tc.bit_depth);
    self.each_sample(row, tc, n, |i, v| {
      let (bits, shift) = shifts[i % n];
      if shift == 0 {
        v
      } else {
        replicate(v, u32::from(bits), depth)
      }
    });
  }

  fn each_sample(&self, row: &mut [u8], tc: &RowDescriptor, n: usize, f: impl Fn(usize, u32) -> u32) {
    let depth = tc.bit_depth;
    let samples = tc.width as usize * n;
    if depth < 8 {
      let lsb = tc.format.contains(RowFormat::SWAPPED);
      for i in 0..samples {
        let v = f(i, get_packed(row, i, depth, lsb));
        put_packed(row, i, depth, lsb, v);
      }
    } else {
      let swapped = tc.format.contains(RowFormat::SWAPPED);
      for i in 0..samples {
        let v = f(i, get_sample(row, i, depth, swapped));
        put_sample(row, i, depth, swapped, v);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ihdr::{PngColorType, IHDR};

  #[test]
  fn test_shift_and_back() {
    let ihdr = IHDR { width: 1, height: 1, bit_depth: 8, color_type: PngColorType::RGBA, is_interlaced: false };
    let mut tc = RowDescriptor::for_image(&ihdr, None, 0);
    let t = Shift::new(TrueBits { red: 5, green: 6, blue: 5, gray: 0, alpha: 8 });
    let mut row = [0b1010_1101, 0b1111_1100, 0b0000_0111, 0x80];
    t.run(&mut row, &mut tc);
    assert_eq!(row, [0b10101, 0b111111, 0, 0x80]);
    t.run_backwards(&mut row, &tc);
    assert_eq!(row, [0b1010_1101, 0xFF, 0, 0x80]);
  }

  #[test]
  fn test_low_bit_depth_gray() {
    let ihdr = IHDR { width: 2, height: 1, bit_depth: 4, color_type: PngColorType::Y, is_interlaced: false };
    let mut tc = RowDescriptor::for_image(&ihdr, None, 0);
    let t = Shift::new(TrueBits { gray: 2, ..TrueBits::default() });
    let mut row = [0xC4];
    t.run(&mut row, &mut tc);
    assert_eq!(row, [0x31]);
  }
}
