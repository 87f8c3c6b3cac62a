use crate::{
  row::{get_sample, put_packed, put_sample, Channel, InitPhase, InvalidInfo, RowDescriptor, RowFormat},
  sample::{gamma_correction, gamma_nxmbit_correct, scale_down},
};

use super::{expand::push_gamma_expand, order, scale16::Scale16, InitContext, InitStep, Transform};

/// Gamma correction, and the bit depth changes that go with it.
///
/// The node is added with a target gamma and (optionally) a target bit
/// depth. If the gamma of the data at that point differs significantly from
/// the target, every color channel is corrected. If not, only the bit depth
/// is changed, when it needs to be.
#[derive(Debug, Clone)]
pub(crate) struct Gamma {
  to_gamma: i32,
  /// 0 means the output bit depth.
  to_bit_depth: u8,
  force: bool,
  correct: Option<i32>,
  /// Insignificant low bits per `[r, g, b, a]` slot.
  shifts: [u8; 4],
}
impl Gamma {
  /// A node that sets `to_gamma` only if a node already at the same order
  /// doesn't have one.
  #[inline]
  #[must_use]
  pub const fn new(to_gamma: i32, to_bit_depth: u8) -> Self {
    Self { to_gamma, to_bit_depth, force: false, correct: None, shifts: [0; 4] }
  }

  /// A node that replaces the gamma of a node already at the same order.
  #[inline]
  #[must_use]
  pub const fn forced(to_gamma: i32, to_bit_depth: u8) -> Self {
    Self { force: true, ..Self::new(to_gamma, to_bit_depth) }
  }

  pub fn merge(&mut self, other: &Self) {
    if other.force || self.to_gamma == 0 {
      self.to_gamma = other.to_gamma;
    }
    self.to_bit_depth = other.to_bit_depth;
  }

  pub fn init(&mut self, at: u32, tc: &mut RowDescriptor, cx: &mut InitContext<'_>) -> InitStep {
    if tc.init == Some(InitPhase::Format) {
      // only the final encode exists this early; record the gamma the
      // output rows will have
      if self.to_gamma > 0 {
        tc.gamma = self.to_gamma;
      }
      tc.invalid.insert(InvalidInfo::SBIT);
      return InitStep::Keep;
    }

    if self.to_bit_depth == 0 {
      let output = &cx.info.output;
      self.to_bit_depth = if output.format.contains(RowFormat::COLORMAP) { 8 } else { output.bit_depth };
    }
    let to_depth = self.to_bit_depth;

    if let Some(correct) = gamma_correction(tc.gamma, self.to_gamma, tc.color_sbit(), cx.gamma_threshold) {
      if let Some(expand) = push_gamma_expand(tc, cx.info, false) {
        return InitStep::PushBefore(expand);
      }
      self.init_shifts(tc);
      self.correct = Some(correct);
      self.apply(tc);
      tracing::trace!("gamma {} -> {} correction {}", tc.gamma, self.to_gamma, correct);
      return InitStep::Keep;
    }

    // close enough to count as equal
    if self.to_gamma > 0 && tc.gamma > 0 {
      tc.gamma = self.to_gamma;
    }
    if to_depth > tc.bit_depth {
      if at >= order::GAMMA_ENCODE {
        // a later expand does this
        return InitStep::Inert;
      }
      if let Some(expand) = push_gamma_expand(tc, cx.info, false) {
        return InitStep::PushBefore(expand);
      }
      self.init_shifts(tc);
      tc.bit_depth = to_depth;
      InitStep::Keep
    } else if to_depth < tc.bit_depth {
      if to_depth == 8 && tc.bit_depth == 16 {
        cx.add(order::SCALE_16_TO_8, Transform::Scale16(Scale16::default()));
        InitStep::Inert
      } else {
        self.init_shifts(tc);
        tc.bit_depth = to_depth;
        InitStep::Keep
      }
    } else {
      InitStep::Inert
    }
  }

  fn init_shifts(&mut self, tc: &RowDescriptor) {
    let sbit_valid = !tc.invalid.contains(InvalidInfo::SBIT);
    for (shift, &s) in self.shifts.iter_mut().zip(&tc.sbit) {
      *shift = if sbit_valid && s > 0 && s < tc.bit_depth { tc.bit_depth - s } else { 0 };
    }
  }

  /// The descriptor changes of a correcting run.
  fn apply(&self, tc: &mut RowDescriptor) {
    tc.invalid.insert(InvalidInfo::SBIT);
    tc.bit_depth = self.to_bit_depth;
    tc.sbit[..3].fill(self.to_bit_depth);
    tc.gamma = self.to_gamma;
  }

  pub fn run(&self, row: &mut [u8], tc: &mut RowDescriptor) {
    let from = tc.bit_depth;
    let to = self.to_bit_depth;
    let (layout, n) = tc.layout();
    let swapped = tc.format.contains(RowFormat::SWAPPED);
    let convert = |i: usize, v: u32| -> u32 {
      let channel = layout[i % n];
      let shift = self.shifts[channel.sbit_index()];
      let bits = u32::from(from - shift);
      let v = v >> shift;
      match self.correct {
        Some(c) if channel != Channel::Alpha => gamma_nxmbit_correct(v, c, bits, u32::from(to)),
        _ => rescale(v, bits, u32::from(to)),
      }
    };
    let samples = tc.width as usize * n;
    if to < 8 {
      // only single channel gray output is packed
      let per_byte = usize::from(8 / to);
      for i in 0..samples {
        let v = convert(i, get_sample(row, i, from, swapped));
        if i % per_byte == 0 {
          row[i / per_byte] = 0;
        }
        put_packed(row, i, to, false, v);
      }
    } else if to > from {
      for i in (0..samples).rev() {
        let v = convert(i, get_sample(row, i, from, swapped));
        put_sample(row, i, to, swapped, v);
      }
    } else {
      for i in 0..samples {
        let v = convert(i, get_sample(row, i, from, swapped));
        put_sample(row, i, to, swapped, v);
      }
    }
    if self.correct.is_some() {
      self.apply(tc);
    } else {
      tc.bit_depth = to;
    }
  }
}

/// Rescales a sample between bit depths, rounding to nearest.
#[inline]
#[must_use]
fn rescale(value: u32, from: u32, to: u32) -> u32 {
  if from == to {
    value
  } else {
    scale_down(value, from, to)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    ihdr::{PngColorType, IHDR},
    sample::FP_1,
  };

  fn descriptor(color_type: PngColorType, depth: u8, width: u32) -> RowDescriptor {
    let ihdr = IHDR { width, height: 1, bit_depth: depth, color_type, is_interlaced: false };
    RowDescriptor::for_image(&ihdr, None, FP_1)
  }

  #[test]
  fn test_expand_8_to_16() {
    let g = Gamma::new(FP_1, 16);
    let mut tc = descriptor(PngColorType::YA, 8, 2);
    let mut row = [0x12, 0xFF, 0x80, 0x00, 0, 0, 0, 0];
    g.run(&mut row, &mut tc);
    assert_eq!(row, [0x12, 0x12, 0xFF, 0xFF, 0x80, 0x80, 0, 0]);
    assert_eq!(tc.bit_depth, 16);
  }

  #[test]
  fn test_correct_leaves_alpha() {
    let mut g = Gamma::new(FP_1, 8);
    g.correct = Some(2 * FP_1);
    let mut tc = descriptor(PngColorType::YA, 8, 1);
    let mut row = [128, 128];
    g.run(&mut row, &mut tc);
    // (128/255)^2 * 255 = 64.25
    assert_eq!(row, [64, 128]);
    assert_eq!(tc.gamma, FP_1);
  }

  #[test]
  fn test_scale_down_to_packed_gray() {
    let g = Gamma::new(FP_1, 2);
    let mut tc = descriptor(PngColorType::Y, 16, 4);
    let mut row = [0xFF, 0xFF, 0x55, 0x55, 0, 0, 0xAA, 0xAA];
    g.run(&mut row, &mut tc);
    assert_eq!(row[0], 0b11_01_00_10);
    assert_eq!(tc.bit_depth, 2);
  }
}
