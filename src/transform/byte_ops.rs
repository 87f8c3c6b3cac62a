use crate::{
  row::{get_sample, put_sample, Channel, InitPhase, InvalidInfo, RowDescriptor, RowFormat},
  sample::max_value,
};

use super::{order, InitContext, InitStep, Transform};

pub(crate) const BYTE_OPS_STRIP_ALPHA: u16 = 0x001;
pub(crate) const BYTE_OPS_CHOP_16: u16 = 0x002;
pub(crate) const BYTE_OPS_EXPAND_16: u16 = 0x004;
pub(crate) const BYTE_OPS_GRAY_TO_RGB: u16 = 0x008;
pub(crate) const BYTE_OPS_BGR: u16 = 0x010;
pub(crate) const BYTE_OPS_FILLER: u16 = 0x020;
/// The filler goes before the color channels.
pub(crate) const BYTE_OPS_FILLER_FIRST: u16 = 0x040;
/// The filler is a real alpha channel.
pub(crate) const BYTE_OPS_FILLER_ALPHA: u16 = 0x080;
pub(crate) const BYTE_OPS_SWAP_ALPHA: u16 = 0x100;
pub(crate) const BYTE_OPS_SWAP_16: u16 = 0x200;

/// The channel and byte rearrangements of 8 and 16 bit rows.
///
/// Every operation maps whole samples to whole samples, so one pass handles
/// any combination of them, in either direction.
#[derive(Debug, Clone, Default)]
pub(crate) struct ByteOps {
  flags: u16,
  filler: u16,
  /// The flags that apply to the data, fixed at init.
  active: u16,
}
impl ByteOps {
  #[inline]
  #[must_use]
  pub const fn new(flags: u16) -> Self {
    Self { flags, filler: 0, active: 0 }
  }

  /// A filler (or opaque alpha) channel of `value`.
  #[inline]
  #[must_use]
  pub const fn filler(value: u16, first: bool, alpha: bool) -> Self {
    let mut flags = BYTE_OPS_FILLER;
    if first {
      flags |= BYTE_OPS_FILLER_FIRST;
    }
    if alpha {
      flags |= BYTE_OPS_FILLER_ALPHA;
    }
    Self { flags, filler: value, active: 0 }
  }

  pub fn merge(&mut self, other: &Self) {
    if other.flags & BYTE_OPS_FILLER != 0 {
      self.flags &= !(BYTE_OPS_FILLER_FIRST | BYTE_OPS_FILLER_ALPHA);
      self.filler = other.filler;
    }
    self.flags |= other.flags;
  }

  pub fn init(&mut self, at: u32, tc: &mut RowDescriptor, cx: &mut InitContext<'_>) -> InitStep {
    if tc.format.contains(RowFormat::COLORMAP) || tc.bit_depth < 8 {
      return InitStep::Inert;
    }
    if at == order::CHANNEL_PREQ && cx.next_order == Some(order::CHANNEL_POSTQ) {
      cx.add(order::CHANNEL_POSTQ, Transform::ByteOps(self.clone()));
      return InitStep::Inert;
    }
    let active = apply(self.flags, tc);
    if active == 0 {
      return InitStep::Inert;
    }
    if tc.init == Some(InitPhase::Final) {
      self.active = active;
    }
    InitStep::Keep
  }

  pub fn run(&self, row: &mut [u8], tc: &mut RowDescriptor) {
    let from = *tc;
    apply(self.active, tc);
    let fill = if tc.bit_depth == 16 { u32::from(self.filler) } else { u32::from(self.filler & 0xFF) };
    convert(row, &from, tc, fill);
  }

  /// Turns a row in the output format of the node back into `input`.
  pub fn run_backwards(&self, row: &mut [u8], tc: &RowDescriptor, input: &RowDescriptor) {
    let mut to = *input;
    to.width = tc.width;
    convert(row, tc, &to, max_value(u32::from(to.bit_depth)));
  }
}

/// Applies the format changes of `flags` to `tc`, giving the flags that did
/// anything.
fn apply(flags: u16, tc: &mut RowDescriptor) -> u16 {
  let mut flags = flags;
  let format = &mut tc.format;
  if flags & BYTE_OPS_STRIP_ALPHA != 0 {
    if format.contains(RowFormat::ALPHA) {
      format.remove(RowFormat::ALPHA | RowFormat::AFIRST | RowFormat::AFILLER);
    } else {
      flags &= !BYTE_OPS_STRIP_ALPHA;
    }
  }
  if flags & BYTE_OPS_CHOP_16 != 0 {
    if flags & BYTE_OPS_EXPAND_16 != 0 {
      // asking for both keeps the depth
      flags &= !(BYTE_OPS_CHOP_16 | BYTE_OPS_EXPAND_16);
    } else if tc.bit_depth == 16 {
      tc.bit_depth = 8;
      tc.invalid.insert(InvalidInfo::TRNS | InvalidInfo::HIST | InvalidInfo::PCAL);
      for s in &mut tc.sbit {
        *s = (*s).min(8);
      }
    } else {
      flags &= !BYTE_OPS_CHOP_16;
    }
  }
  if flags & BYTE_OPS_EXPAND_16 != 0 {
    if tc.bit_depth == 8 {
      tc.bit_depth = 16;
    } else {
      flags &= !BYTE_OPS_EXPAND_16;
    }
  }
  let format = &mut tc.format;
  if flags & BYTE_OPS_GRAY_TO_RGB != 0 {
    if format.contains(RowFormat::COLOR) {
      flags &= !BYTE_OPS_GRAY_TO_RGB;
    } else {
      format.insert(RowFormat::COLOR);
      tc.sbit[0] = tc.sbit[1];
      tc.sbit[2] = tc.sbit[1];
    }
  }
  if flags & BYTE_OPS_BGR != 0 {
    // palette entries stay in rgb order
    if format.contains(RowFormat::COLOR) && !tc.palette {
      format.insert(RowFormat::BGR);
    } else {
      flags &= !BYTE_OPS_BGR;
    }
  }
  if flags & BYTE_OPS_FILLER != 0 {
    if format.contains(RowFormat::ALPHA) {
      flags &= !BYTE_OPS_FILLER;
    } else {
      format.insert(RowFormat::ALPHA);
      if flags & BYTE_OPS_FILLER_FIRST != 0 {
        flags |= BYTE_OPS_SWAP_ALPHA;
      } else {
        flags &= !BYTE_OPS_SWAP_ALPHA;
      }
      if flags & BYTE_OPS_FILLER_ALPHA == 0 {
        format.insert(RowFormat::AFILLER);
      }
    }
  }
  if flags & BYTE_OPS_SWAP_ALPHA != 0 {
    if format.contains(RowFormat::ALPHA) && !tc.palette {
      format.insert(RowFormat::AFIRST);
    } else {
      flags &= !BYTE_OPS_SWAP_ALPHA;
    }
  }
  if flags & BYTE_OPS_SWAP_16 != 0 {
    if tc.bit_depth == 16 {
      format.insert(RowFormat::SWAPPED);
    } else {
      flags &= !BYTE_OPS_SWAP_16;
    }
  }
  // the option bits only mean something along with the filler
  if flags & BYTE_OPS_FILLER == 0 {
    flags &= !(BYTE_OPS_FILLER_FIRST | BYTE_OPS_FILLER_ALPHA);
  }
  flags
}

/// Rewrites each pixel of a `from` row as a `to` pixel.
///
/// Channels are matched by name. A missing color comes from gray, a missing
/// gray from green, and a missing alpha is `fill`.
fn convert(row: &mut [u8], from: &RowDescriptor, to: &RowDescriptor, fill: u32) {
  let (in_layout, n_in) = from.layout();
  let (out_layout, n_out) = to.layout();
  let in_swapped = from.format.contains(RowFormat::SWAPPED);
  let out_swapped = to.format.contains(RowFormat::SWAPPED);
  let (in_depth, out_depth) = (from.bit_depth, to.bit_depth);
  let rescale = |v: u32| match (in_depth, out_depth) {
    (16, 8) => v >> 8,
    (8, 16) => v * 257,
    _ => v,
  };
  let pixel = |x: usize, row: &mut [u8]| {
    // red, green, blue, alpha
    let mut value = [0; 4];
    let mut have_alpha = false;
    for (c, channel) in in_layout[..n_in].iter().enumerate() {
      let v = rescale(get_sample(row, x * n_in + c, in_depth, in_swapped));
      match channel {
        Channel::Gray => value[..3].fill(v),
        Channel::Alpha => {
          value[3] = v;
          have_alpha = true;
        }
        other => value[other.sbit_index()] = v,
      }
    }
    if !have_alpha {
      value[3] = fill;
    }
    for (c, channel) in out_layout[..n_out].iter().enumerate() {
      put_sample(row, x * n_out + c, out_depth, out_swapped, value[channel.sbit_index()]);
    }
  };
  let width = from.width as usize;
  if to.pixel_depth() > from.pixel_depth() {
    for x in (0..width).rev() {
      pixel(x, row);
    }
  } else {
    for x in 0..width {
      pixel(x, row);
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

  fn ops(flags: u16, tc: &RowDescriptor) -> ByteOps {
    let mut t = ByteOps::new(flags);
    let mut probe = *tc;
    t.active = apply(flags, &mut probe);
    t
  }

  #[test]
  fn test_gray_to_rgb_with_filler_first() {
    let tc = descriptor(PngColorType::Y, 8, 2);
    let mut t = ops(BYTE_OPS_GRAY_TO_RGB, &tc);
    t.merge(&ByteOps::filler(0xAA, true, false));
    t.active = apply(t.flags, &mut tc.clone());
    let mut row = [5, 6, 0, 0, 0, 0, 0, 0];
    let mut out = tc;
    t.run(&mut row, &mut out);
    assert_eq!(row, [0xAA, 5, 5, 5, 0xAA, 6, 6, 6]);
    assert!(out.format.contains(RowFormat::AFIRST | RowFormat::AFILLER | RowFormat::COLOR));

    // and back again
    t.run_backwards(&mut row, &out, &tc);
    assert_eq!(&row[..2], &[5, 6]);
  }

  #[test]
  fn test_strip_chop_and_swap() {
    let tc = descriptor(PngColorType::RGBA, 16, 1);
    let t = ops(BYTE_OPS_STRIP_ALPHA | BYTE_OPS_CHOP_16 | BYTE_OPS_BGR, &tc);
    let mut row = [0x11, 0x12, 0x21, 0x22, 0x31, 0x32, 0x41, 0x42];
    let mut out = tc;
    t.run(&mut row, &mut out);
    assert_eq!(&row[..3], &[0x31, 0x21, 0x11]);
    assert_eq!(out.bit_depth, 8);
    assert_eq!(out.channels(), 3);

    let t = ops(BYTE_OPS_SWAP_16 | BYTE_OPS_SWAP_ALPHA, &tc);
    let mut row = [0x11, 0x12, 0x21, 0x22, 0x31, 0x32, 0x41, 0x42];
    let mut out = tc;
    t.run(&mut row, &mut out);
    assert_eq!(row, [0x42, 0x41, 0x12, 0x11, 0x22, 0x21, 0x32, 0x31]);
  }

  #[test]
  fn test_expand_16_cancels_chop() {
    let mut tc = descriptor(PngColorType::Y, 16, 1);
    assert_eq!(apply(BYTE_OPS_CHOP_16 | BYTE_OPS_EXPAND_16, &mut tc), 0);
    assert_eq!(tc.bit_depth, 16);
    let mut tc = descriptor(PngColorType::Y, 8, 1);
    assert_eq!(apply(BYTE_OPS_EXPAND_16, &mut tc), BYTE_OPS_EXPAND_16);
    assert_eq!(tc.bit_depth, 16);
  }
}
