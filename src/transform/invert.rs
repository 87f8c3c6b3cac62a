use crate::row::{get_sample, put_sample, Channel, RowDescriptor, RowFormat};

/// Gray (not color) channels.
pub(crate) const INVERT_MONO: u8 = 1;
pub(crate) const INVERT_ALPHA: u8 = 2;

/// Inverts gray and/or alpha samples.
///
/// Running it twice gives back the original row, so it serves both
/// directions.
#[derive(Debug, Clone, Default)]
pub(crate) struct Invert {
  flags: u8,
}
impl Invert {
  #[inline]
  #[must_use]
  pub const fn new(flags: u8) -> Self {
    Self { flags }
  }

  #[inline]
  pub fn merge(&mut self, other: &Self) {
    self.flags |= other.flags;
  }

  /// The flags that apply to rows of `tc`.
  #[inline]
  fn present(&self, tc: &RowDescriptor) -> u8 {
    if tc.format.contains(RowFormat::COLORMAP) {
      return 0;
    }
    let mut present = 0;
    if !tc.format.contains(RowFormat::COLOR) {
      present |= INVERT_MONO;
    }
    if tc.format.contains(RowFormat::ALPHA) {
      present |= INVERT_ALPHA;
    }
    self.flags & present
  }

  pub fn init(&mut self, tc: &mut RowDescriptor) -> super::InitStep {
    if self.present(tc) == 0 {
      return super::InitStep::Inert;
    }
    tc.format.insert(RowFormat::RANGE);
    super::InitStep::Keep
  }

  pub fn run(&self, row: &mut [u8], tc: &mut RowDescriptor) {
    self.invert(row, tc);
    tc.format.insert(RowFormat::RANGE);
  }

  #[inline]
  pub fn run_backwards(&self, row: &mut [u8], tc: &RowDescriptor) {
    self.invert(row, tc);
  }

  fn invert(&self, row: &mut [u8], tc: &RowDescriptor) {
    let flags = self.present(tc);
    let (layout, n) = tc.layout();
    let all = layout[..n].iter().all(|c| match c {
      Channel::Gray => flags & INVERT_MONO != 0,
      Channel::Alpha => flags & INVERT_ALPHA != 0,
      _ => false,
    });
    if all {
      // every bit of the row belongs to an inverted sample
      for b in &mut row[..tc.row_bytes()] {
        *b = !*b;
      }
      return;
    }
    let depth = tc.bit_depth;
    let max = if depth == 16 { 0xFFFF } else { 0xFF };
    let swapped = tc.format.contains(RowFormat::SWAPPED);
    for (c, channel) in layout[..n].iter().enumerate() {
      let wanted = match channel {
        Channel::Gray => flags & INVERT_MONO != 0,
        Channel::Alpha => flags & INVERT_ALPHA != 0,
        _ => false,
      };
      if !wanted {
        continue;
      }
      for x in 0..tc.width as usize {
        let i = x * n + c;
        let v = get_sample(row, i, depth, swapped);
        put_sample(row, i, depth, swapped, v ^ max);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ihdr::{PngColorType, IHDR};

  fn descriptor(color_type: PngColorType, depth: u8, width: u32) -> RowDescriptor {
    let ihdr = IHDR { width, height: 1, bit_depth: depth, color_type, is_interlaced: false };
    RowDescriptor::for_image(&ihdr, None, 0)
  }

  #[test]
  fn test_invert_mono_low_bit_depth() {
    let t = Invert::new(INVERT_MONO);
    let mut tc = descriptor(PngColorType::Y, 1, 8);
    let mut row = [0b1010_0000];
    t.run(&mut row, &mut tc);
    assert_eq!(row, [0b0101_1111]);
    assert!(tc.format.contains(RowFormat::RANGE));
  }

  #[test]
  fn test_invert_alpha_only() {
    let t = Invert::new(INVERT_ALPHA);
    let mut tc = descriptor(PngColorType::RGBA, 8, 1);
    let mut row = [1, 2, 3, 0xF0];
    t.run(&mut row, &mut tc);
    assert_eq!(row, [1, 2, 3, 0x0F]);
    t.run_backwards(&mut row, &tc);
    assert_eq!(row, [1, 2, 3, 0xF0]);
  }

  #[test]
  fn test_mono_does_nothing_to_color() {
    let mut t = Invert::new(INVERT_MONO);
    let mut tc = descriptor(PngColorType::RGB, 8, 1);
    assert!(matches!(t.init(&mut tc), crate::transform::InitStep::Inert));
  }
}
