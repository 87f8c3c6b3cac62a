//! The ancillary chunks that feed values into the transform chain.
//!
//! Only the scalar content is parsed. Each parser returns `Err(())` for data
//! that isn't valid for the image; the session turns that into a warning and
//! ignores the chunk.

#![allow(nonstandard_style)]

use alloc::vec::Vec;

use bytemuck::{Pod, Zeroable};

use crate::{
  ihdr::{PngColorType, IHDR},
  sample::GAMMA_SRGB_INVERSE,
};

/// A palette entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct RGB8 {
  pub r: u8,
  pub g: u8,
  pub b: u8,
}
impl RGB8 {
  #[inline]
  #[must_use]
  pub const fn new(r: u8, g: u8, b: u8) -> Self {
    Self { r, g, b }
  }
}

/// Views `PLTE` chunk data as palette entries.
///
/// The length must be a non-zero multiple of 3 with no more than 256 entries,
/// and for indexed images no more entries than the bit depth can address.
pub fn parse_plte<'b>(data: &'b [u8], ihdr: &IHDR) -> Result<&'b [RGB8], ()> {
  let entries: &[RGB8] = bytemuck::try_cast_slice(data).map_err(|_| ())?;
  if entries.is_empty() || entries.len() > 256 {
    return Err(());
  }
  if ihdr.color_type == PngColorType::Index && entries.len() > (1 << ihdr.bit_depth) {
    return Err(());
  }
  Ok(entries)
}

/// Transparency data
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum tRNS {
  /// The one gray value that is fully transparent.
  Y(u16),
  /// The one RGB value that is fully transparent.
  RGB([u16; 3]),
  /// Alpha per palette index; missing trailing entries are opaque.
  Index(Vec<u8>),
}
impl tRNS {
  /// Parses the chunk for the given image.
  ///
  /// Gray and RGB values must fit in the image's bit depth, and a palette tRNS
  /// can't be longer than the palette.
  pub fn parse(data: &[u8], ihdr: &IHDR, palette_len: usize) -> Result<Self, ()> {
    let max = (1_u32 << ihdr.bit_depth) - 1;
    let fits = |v: u16| u32::from(v) <= max;
    match (ihdr.color_type, data) {
      (PngColorType::Y, [y0, y1]) => {
        let y = u16::from_be_bytes([*y0, *y1]);
        if fits(y) {
          Ok(Self::Y(y))
        } else {
          Err(())
        }
      }
      (PngColorType::RGB, [r0, r1, g0, g1, b0, b1]) => {
        let rgb = [
          u16::from_be_bytes([*r0, *r1]),
          u16::from_be_bytes([*g0, *g1]),
          u16::from_be_bytes([*b0, *b1]),
        ];
        if rgb.iter().copied().all(fits) {
          Ok(Self::RGB(rgb))
        } else {
          Err(())
        }
      }
      (PngColorType::Index, alphas) if !alphas.is_empty() && alphas.len() <= palette_len => {
        Ok(Self::Index(alphas.to_vec()))
      }
      _ => Err(()),
    }
  }

  /// Serializes the chunk payload.
  #[must_use]
  pub fn to_bytes(&self) -> Vec<u8> {
    match self {
      Self::Y(y) => y.to_be_bytes().to_vec(),
      Self::RGB(rgb) => rgb.iter().flat_map(|c| c.to_be_bytes()).collect(),
      Self::Index(alphas) => alphas.clone(),
    }
  }
}

/// Parses a `gAMA` chunk into a fixed point encoding exponent.
pub fn parse_gama(data: &[u8]) -> Result<i32, ()> {
  match data {
    [g0, g1, g2, g3] => match i32::try_from(u32::from_be_bytes([*g0, *g1, *g2, *g3])) {
      Ok(g) if g > 0 => Ok(g),
      _ => Err(()),
    },
    _ => Err(()),
  }
}

/// Parses an `sRGB` chunk, giving the gamma it implies.
pub fn parse_srgb(data: &[u8]) -> Result<i32, ()> {
  match data {
    [intent] if *intent <= 3 => Ok(GAMMA_SRGB_INVERSE),
    _ => Err(()),
  }
}

/// Parses an `sBIT` chunk into `[r, g, b, a]` significant bits.
///
/// Gray images put the gray value in all three color slots. Absent channels
/// are given the full sample depth.
pub fn parse_sbit(data: &[u8], ihdr: &IHDR) -> Result<[u8; 4], ()> {
  let depth = if ihdr.color_type == PngColorType::Index { 8 } else { ihdr.bit_depth };
  let ok = |s: &u8| *s >= 1 && *s <= depth;
  if !data.iter().all(ok) {
    return Err(());
  }
  Ok(match (ihdr.color_type, data) {
    (PngColorType::Y, [y]) => [*y, *y, *y, depth],
    (PngColorType::YA, [y, a]) => [*y, *y, *y, *a],
    (PngColorType::RGB | PngColorType::Index, [r, g, b]) => [*r, *g, *b, depth],
    (PngColorType::RGBA, [r, g, b, a]) => [*r, *g, *b, *a],
    _ => return Err(()),
  })
}

/// Background color.
///
/// RGB and Greyscale colors are always given as `u16` values. The actual color
/// selected should stay within the bit depth range of the rest of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(missing_docs)]
pub enum bKGD {
  Greyscale { y: u16 },
  RGB { r: u16, g: u16, b: u16 },
  Index { i: u8 },
}
impl TryFrom<&[u8]> for bKGD {
  type Error = ();
  #[inline]
  fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
    Ok(match slice {
      [y0, y1] => bKGD::Greyscale { y: u16::from_be_bytes([*y0, *y1]) },
      [r0, r1, g0, g1, b0, b1] => bKGD::RGB {
        r: u16::from_be_bytes([*r0, *r1]),
        g: u16::from_be_bytes([*g0, *g1]),
        b: u16::from_be_bytes([*b0, *b1]),
      },
      [i] => bKGD::Index { i: *i },
      _ => return Err(()),
    })
  }
}
impl bKGD {
  /// Parses the chunk, checking the form matches the color type.
  pub fn parse(data: &[u8], ihdr: &IHDR, palette_len: usize) -> Result<Self, ()> {
    let bkgd = Self::try_from(data)?;
    match (ihdr.color_type, bkgd) {
      (PngColorType::Y | PngColorType::YA, bKGD::Greyscale { .. })
      | (PngColorType::RGB | PngColorType::RGBA, bKGD::RGB { .. }) => Ok(bkgd),
      (PngColorType::Index, bKGD::Index { i }) if usize::from(i) < palette_len => Ok(bkgd),
      _ => Err(()),
    }
  }

  /// Serializes the chunk payload.
  #[must_use]
  pub fn to_bytes(&self) -> Vec<u8> {
    match *self {
      Self::Greyscale { y } => y.to_be_bytes().to_vec(),
      Self::RGB { r, g, b } => [r, g, b].iter().flat_map(|c| c.to_be_bytes()).collect(),
      Self::Index { i } => alloc::vec![i],
    }
  }
}
