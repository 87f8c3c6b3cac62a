use crate::{
  chunks::tRNS,
  info::ImageInfo,
  row::{get_packed, InitPhase, InvalidInfo, RowDescriptor, RowFormat},
};

use super::{InitContext, InitStep, Transform};

/// Palette images only; tRNS comes along with it.
pub(crate) const EXPAND_PALETTE: u8 = 1;
/// Gray below 8 bits.
pub(crate) const EXPAND_LBD_GRAY: u8 = 2;
/// tRNS to alpha, non-palette images only.
pub(crate) const EXPAND_TRNS: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
  /// Not yet initialized for the run.
  Pending,
  /// Running over palette entries: just marks the palette as expanded.
  Palette,
  LowBitGray { gray: Option<u32> },
  Trns { pixel: [u8; 6], len: usize },
}

/// Expands palette data, low bit depth gray and tRNS.
#[derive(Debug, Clone)]
pub(crate) struct Expand {
  flags: u8,
  mode: Mode,
}
impl Expand {
  #[inline]
  #[must_use]
  pub const fn new(flags: u8) -> Self {
    Self { flags, mode: Mode::Pending }
  }

  #[cfg(test)]
  pub const fn flags(&self) -> u8 {
    self.flags
  }

  #[inline]
  pub fn merge(&mut self, other: &Self) {
    self.flags |= other.flags;
  }

  pub fn init(&mut self, tc: &mut RowDescriptor, cx: &mut InitContext<'_>) -> InitStep {
    if tc.palette {
      if self.flags & EXPAND_PALETTE != 0 {
        tc.palette = false;
        tc.invalid.insert(InvalidInfo::PLTE | InvalidInfo::TRNS);
      }
      self.mode = Mode::Palette;
      return InitStep::Keep;
    }
    if tc.format.contains(RowFormat::COLORMAP) {
      return InitStep::Inert;
    }
    let mut flags = self.flags & !EXPAND_PALETTE;
    if tc.bit_depth >= 8 {
      flags &= !EXPAND_LBD_GRAY;
    } else if flags & EXPAND_TRNS != 0 {
      // low bit depth tRNS can only be done while expanding
      flags |= EXPAND_LBD_GRAY;
    }
    if cx.info.num_trans() == 0 || tc.format.contains(RowFormat::ALPHA) || !tc.trns_valid() {
      flags &= !EXPAND_TRNS;
    }
    self.flags = flags;
    let final_init = tc.init == Some(InitPhase::Final);
    match flags {
      EXPAND_LBD_GRAY => {
        tc.bit_depth = 8;
        tc.invalid.insert(InvalidInfo::TRNS);
        if final_init {
          self.mode = Mode::LowBitGray { gray: None };
        }
      }
      f if f == EXPAND_LBD_GRAY | EXPAND_TRNS => {
        let depth = tc.bit_depth;
        tc.bit_depth = 8;
        tc.format.insert(RowFormat::ALPHA);
        tc.invalid.insert(InvalidInfo::TRNS);
        tc.transparent_alpha = true;
        tc.sbit[3] = 8;
        if final_init {
          let gray = match cx.info.trns {
            Some(tRNS::Y(y)) => u32::from(y) & ((1 << depth) - 1),
            _ => 0xFFFF,
          };
          self.mode = Mode::LowBitGray { gray: Some(gray) };
        }
      }
      EXPAND_TRNS => {
        if final_init {
          let mut pixel = [0; 6];
          let len = fill_transparent_pixel(cx.info, &mut pixel);
          self.mode = Mode::Trns { pixel, len };
        }
        tc.format.insert(RowFormat::ALPHA);
        tc.invalid.insert(InvalidInfo::TRNS);
        tc.transparent_alpha = true;
        tc.sbit[3] = tc.bit_depth;
      }
      _ => return InitStep::Inert,
    }
    InitStep::Keep
  }

  pub fn run(&self, row: &mut [u8], tc: &mut RowDescriptor) {
    match self.mode {
      Mode::Pending => (),
      Mode::Palette => {
        if tc.palette && self.flags & EXPAND_PALETTE != 0 {
          tc.palette = false;
          tc.invalid.insert(InvalidInfo::PLTE | InvalidInfo::TRNS);
        }
      }
      Mode::LowBitGray { gray } => expand_lbd_gray(row, tc, gray),
      Mode::Trns { pixel, len } => expand_trns(row, tc, &pixel[..len]),
    }
  }
}

fn expand_lbd_gray(row: &mut [u8], tc: &mut RowDescriptor, gray: Option<u32>) {
  let depth = tc.bit_depth;
  let insignificant = if depth > 1
    && !tc.invalid.contains(InvalidInfo::SBIT)
    && tc.sbit[1] > 0
    && tc.sbit[1] < depth
  {
    u32::from(depth - tc.sbit[1])
  } else {
    0
  };
  let out_bytes = if gray.is_some() { 2 } else { 1 };
  let div = (1_u32 << (4 - insignificant.min(3))) - 1;
  for x in (0..tc.width as usize).rev() {
    let p = get_packed(row, x, depth, false);
    let v = match (depth, insignificant) {
      (1, _) => p * 255,
      (2, 0) => p * 85,
      (2, _) => (p >> 1) * 255,
      (_, 0) => p * 17,
      (_, ins) => ((p >> ins) * 255 + (div >> 1)) / div,
    };
    row[x * out_bytes] = v as u8;
    if let Some(g) = gray {
      row[x * out_bytes + 1] = if p != g { 255 } else { 0 };
    }
  }
  tc.bit_depth = 8;
  tc.invalid.insert(InvalidInfo::TRNS);
  if gray.is_some() {
    tc.format.insert(RowFormat::ALPHA);
    tc.transparent_alpha = true;
    tc.sbit[3] = 8;
  }
}

fn expand_trns(row: &mut [u8], tc: &mut RowDescriptor, transparent: &[u8]) {
  let in_px = (tc.pixel_depth() / 8) as usize;
  let alpha_bytes = usize::from(tc.bit_depth / 8);
  let out_px = in_px + alpha_bytes;
  for x in (0..tc.width as usize).rev() {
    let src = x * in_px;
    let dst = x * out_px;
    let alpha = if row[src..src + in_px] != *transparent { 0xFF } else { 0 };
    row.copy_within(src..src + in_px, dst);
    row[dst + in_px..dst + out_px].fill(alpha);
  }
  tc.format.insert(RowFormat::ALPHA);
  tc.invalid.insert(InvalidInfo::TRNS);
  tc.transparent_alpha = true;
  tc.sbit[3] = tc.bit_depth;
}

/// Writes the tRNS pixel in the image's own sample encoding, giving the
/// number of bytes written.
///
/// Gray below 8 bits is replicated across the whole byte.
pub(crate) fn fill_transparent_pixel(info: &ImageInfo, out: &mut [u8; 6]) -> usize {
  let depth = info.ihdr.bit_depth;
  match info.trns {
    Some(tRNS::Y(y)) if depth == 16 => {
      out[..2].copy_from_slice(&y.to_be_bytes());
      2
    }
    Some(tRNS::Y(y)) => {
      let mut t = u32::from(y) & ((1 << depth) - 1);
      let mut d = u32::from(depth);
      while d < 8 {
        t |= t << d;
        d <<= 1;
      }
      out[0] = t as u8;
      1
    }
    Some(tRNS::RGB(rgb)) if depth == 16 => {
      for (i, c) in rgb.iter().enumerate() {
        out[i * 2..i * 2 + 2].copy_from_slice(&c.to_be_bytes());
      }
      6
    }
    Some(tRNS::RGB(rgb)) => {
      for (o, c) in out.iter_mut().zip(rgb) {
        *o = c as u8;
      }
      3
    }
    _ => 0,
  }
}

/// Asks for the expansions gamma arithmetic needs first: low bit depth gray
/// to 8 bits, and tRNS to alpha when it must (or was asked to) survive.
///
/// Gives the node to push, if any. When tRNS isn't needed it's marked
/// invalid instead.
pub(crate) fn push_gamma_expand(tc: &mut RowDescriptor, info: &ImageInfo, need_alpha: bool) -> Option<Transform> {
  let mut flags = 0;
  if tc.bit_depth < 8 {
    flags |= EXPAND_LBD_GRAY;
  }
  if !tc.format.intersects(RowFormat::ALPHA | RowFormat::COLORMAP)
    && !tc.palette
    && info.num_trans() == 1
    && tc.trns_valid()
  {
    if need_alpha || (tc.expand_trns && !tc.strip_alpha) {
      flags |= EXPAND_TRNS;
    } else {
      tc.invalid.insert(InvalidInfo::TRNS);
    }
  }
  (flags != 0).then(|| Transform::Expand(Expand::new(flags)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ihdr::{PngColorType, IHDR};

  fn gray(depth: u8, width: u32) -> RowDescriptor {
    let ihdr = IHDR { width, height: 1, bit_depth: depth, color_type: PngColorType::Y, is_interlaced: false };
    RowDescriptor::for_image(&ihdr, None, 0)
  }

  #[test]
  fn test_expand_lbd_gray() {
    let mut tc = gray(2, 4);
    let mut row = [0b00_01_10_11, 0, 0, 0];
    expand_lbd_gray(&mut row, &mut tc, None);
    assert_eq!(row, [0, 85, 170, 255]);
    assert_eq!(tc.bit_depth, 8);

    let mut tc = gray(1, 3);
    let mut row = [0b101_00000, 0, 0, 0, 0, 0];
    expand_lbd_gray(&mut row, &mut tc, Some(0));
    assert_eq!(row, [255, 255, 0, 0, 255, 255]);
    assert!(tc.format.contains(RowFormat::ALPHA));
  }

  #[test]
  fn test_expand_lbd_gray_sbit() {
    let mut tc = gray(4, 2);
    tc.sbit = [2; 4];
    tc.invalid = InvalidInfo::NONE;
    let mut row = [0b1100_0100, 0];
    expand_lbd_gray(&mut row, &mut tc, None);
    assert_eq!(row, [255, 85]);
  }

  #[test]
  fn test_expand_trns() {
    let ihdr = IHDR { width: 2, height: 1, bit_depth: 8, color_type: PngColorType::RGB, is_interlaced: false };
    let mut tc = RowDescriptor::for_image(&ihdr, None, 0);
    let mut row = [1, 2, 3, 4, 5, 6, 0, 0];
    expand_trns(&mut row, &mut tc, &[4, 5, 6]);
    assert_eq!(row, [1, 2, 3, 255, 4, 5, 6, 0]);
    assert_eq!(tc.channels(), 4);
  }

  #[test]
  fn test_fill_transparent_pixel() {
    let ihdr = IHDR { width: 1, height: 1, bit_depth: 2, color_type: PngColorType::Y, is_interlaced: false };
    let mut info = ImageInfo::new(ihdr);
    info.trns = Some(tRNS::Y(1));
    let mut out = [0; 6];
    assert_eq!(fill_transparent_pixel(&info, &mut out), 1);
    assert_eq!(out[0], 0b0101_0101);
  }
}
