//! The description of a row as it moves through the transform chain.

use core::ops::{BitAnd, BitOr, BitOrAssign, Not};

use crate::ihdr::{PngColorType, IHDR};

/// The channel and layout flags of a row format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RowFormat(pub u16);
impl RowFormat {
  pub const NONE: Self = Self(0);
  /// There's an alpha channel (or a filler in the alpha slot).
  pub const ALPHA: Self = Self(0x01);
  /// Three color channels rather than one gray channel.
  pub const COLOR: Self = Self(0x02);
  /// Samples are palette indexes.
  pub const COLORMAP: Self = Self(0x04);
  /// Color channels are in blue, green, red order.
  pub const BGR: Self = Self(0x08);
  /// The alpha slot comes before the color channels.
  pub const AFIRST: Self = Self(0x10);
  /// The alpha slot holds a filler value rather than alpha.
  pub const AFILLER: Self = Self(0x20);
  /// Little-endian 16 bit samples, or LSB-first packed pixels.
  pub const SWAPPED: Self = Self(0x40);
  /// Sample values aren't scaled to the bit depth.
  pub const RANGE: Self = Self(0x80);

  #[inline]
  #[must_use]
  pub const fn contains(self, other: Self) -> bool {
    self.0 & other.0 == other.0
  }
  #[inline]
  #[must_use]
  pub const fn intersects(self, other: Self) -> bool {
    self.0 & other.0 != 0
  }
  #[inline]
  pub fn insert(&mut self, other: Self) {
    self.0 |= other.0;
  }
  #[inline]
  pub fn remove(&mut self, other: Self) {
    self.0 &= !other.0;
  }
  #[inline]
  pub fn toggle(&mut self, other: Self) {
    self.0 ^= other.0;
  }
  #[inline]
  pub fn set(&mut self, other: Self, on: bool) {
    if on {
      self.insert(other)
    } else {
      self.remove(other)
    }
  }
}
impl BitOr for RowFormat {
  type Output = Self;
  #[inline]
  fn bitor(self, rhs: Self) -> Self {
    Self(self.0 | rhs.0)
  }
}
impl BitOrAssign for RowFormat {
  #[inline]
  fn bitor_assign(&mut self, rhs: Self) {
    self.0 |= rhs.0
  }
}
impl BitAnd for RowFormat {
  type Output = Self;
  #[inline]
  fn bitand(self, rhs: Self) -> Self {
    Self(self.0 & rhs.0)
  }
}
impl Not for RowFormat {
  type Output = Self;
  #[inline]
  fn not(self) -> Self {
    Self(!self.0)
  }
}

/// Image info that no longer matches the row data.
///
/// A transform sets these bits when its output makes a chunk's values stale,
/// for example after tRNS has been turned into an alpha channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct InvalidInfo(pub u8);
impl InvalidInfo {
  pub const NONE: Self = Self(0);
  pub const TRNS: Self = Self(0x01);
  pub const SBIT: Self = Self(0x02);
  pub const HIST: Self = Self(0x04);
  pub const PCAL: Self = Self(0x08);
  pub const PLTE: Self = Self(0x10);
  pub const BKGD: Self = Self(0x20);
  pub const GAMA: Self = Self(0x40);

  #[inline]
  #[must_use]
  pub const fn contains(self, other: Self) -> bool {
    self.0 & other.0 == other.0
  }
  #[inline]
  pub fn insert(&mut self, other: Self) {
    self.0 |= other.0;
  }
}
impl BitOr for InvalidInfo {
  type Output = Self;
  #[inline]
  fn bitor(self, rhs: Self) -> Self {
    Self(self.0 | rhs.0)
  }
}

/// Which initialization pass is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitPhase {
  /// Only the output format is being worked out.
  Format,
  /// Nodes fix their parameters for the run.
  Final,
}

/// One channel slot of a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
  Red,
  Green,
  Blue,
  Gray,
  Alpha,
}
impl Channel {
  /// The `[r, g, b, a]` sBIT slot of the channel.
  #[inline]
  #[must_use]
  pub const fn sbit_index(self) -> usize {
    match self {
      Self::Red => 0,
      Self::Green | Self::Gray => 1,
      Self::Blue => 2,
      Self::Alpha => 3,
    }
  }
}

/// Everything the transforms know about the row data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowDescriptor {
  pub format: RowFormat,
  pub bit_depth: u8,
  /// Encoding gamma of the samples, `FP_1` fixed point; 0 is unknown.
  pub gamma: i32,
  /// Significant bits as `[r, g, b, a]`, gray in the green slot.
  pub sbit: [u8; 4],
  pub invalid: InvalidInfo,
  pub width: u32,
  /// A cache is being captured.
  pub caching: bool,
  /// The palette entries are being transformed rather than the rows.
  pub palette: bool,
  /// Every alpha value is either 0 or the maximum.
  pub transparent_alpha: bool,
  pub expand_trns: bool,
  pub strip_alpha: bool,
  /// `None` while rows are being run.
  pub init: Option<InitPhase>,
}
impl RowDescriptor {
  /// The descriptor of the data as it comes out of the unfilter step.
  ///
  /// `sbit` values are used only when they are below the bit depth; if none
  /// are, the sBIT info is marked invalid.
  #[must_use]
  pub fn for_image(ihdr: &IHDR, sbit: Option<[u8; 4]>, gamma: i32) -> Self {
    let format = match ihdr.color_type {
      PngColorType::Y => RowFormat::NONE,
      PngColorType::YA => RowFormat::ALPHA,
      PngColorType::RGB => RowFormat::COLOR,
      PngColorType::RGBA => RowFormat::COLOR | RowFormat::ALPHA,
      PngColorType::Index => RowFormat::COLORMAP | RowFormat::COLOR,
    };
    let cd = if ihdr.color_type == PngColorType::Index { 8 } else { ihdr.bit_depth };
    let mut out = Self {
      format,
      bit_depth: ihdr.bit_depth,
      gamma,
      sbit: [cd; 4],
      invalid: InvalidInfo::NONE,
      width: ihdr.width,
      caching: false,
      palette: false,
      transparent_alpha: false,
      expand_trns: false,
      strip_alpha: false,
      init: None,
    };
    let mut handled = false;
    if let Some(s) = sbit {
      let colors: &[usize] = if format.contains(RowFormat::COLOR) { &[0, 1, 2] } else { &[1] };
      for &i in colors {
        if s[i] > 0 && s[i] < cd {
          out.sbit[i] = s[i];
          handled = true;
        }
      }
      if !format.contains(RowFormat::COLOR) {
        out.sbit[0] = out.sbit[1];
        out.sbit[2] = out.sbit[1];
      }
      if format.contains(RowFormat::ALPHA) && s[3] > 0 && s[3] < cd {
        out.sbit[3] = s[3];
      }
    }
    if !handled {
      out.invalid.insert(InvalidInfo::SBIT);
    }
    out
  }

  #[inline]
  #[must_use]
  pub const fn channels(&self) -> u32 {
    if self.format.contains(RowFormat::COLORMAP) {
      1
    } else {
      let c = if self.format.contains(RowFormat::COLOR) { 3 } else { 1 };
      if self.format.contains(RowFormat::ALPHA) {
        c + 1
      } else {
        c
      }
    }
  }

  #[inline]
  #[must_use]
  pub const fn pixel_depth(&self) -> u32 {
    self.channels() * self.bit_depth as u32
  }

  /// Bytes in a row of `width` pixels.
  #[inline]
  #[must_use]
  pub const fn row_bytes(&self) -> usize {
    (self.width as usize * self.pixel_depth() as usize + 7) / 8
  }

  /// The channels of one pixel in memory order.
  #[must_use]
  pub fn layout(&self) -> ([Channel; 4], usize) {
    use Channel::*;
    let mut out = [Gray; 4];
    let mut n = 0;
    let alpha = self.format.contains(RowFormat::ALPHA) && !self.format.contains(RowFormat::COLORMAP);
    let afirst = alpha && self.format.contains(RowFormat::AFIRST);
    if afirst {
      out[n] = Alpha;
      n += 1;
    }
    if self.format.contains(RowFormat::COLOR) && !self.format.contains(RowFormat::COLORMAP) {
      let colors = if self.format.contains(RowFormat::BGR) { [Blue, Green, Red] } else { [Red, Green, Blue] };
      out[n..n + 3].copy_from_slice(&colors);
      n += 3;
    } else {
      out[n] = Gray;
      n += 1;
    }
    if alpha && !afirst {
      out[n] = Alpha;
      n += 1;
    }
    (out, n)
  }

  /// The tRNS info applies to the row.
  #[inline]
  #[must_use]
  pub const fn trns_valid(&self) -> bool {
    !self.invalid.contains(InvalidInfo::TRNS)
  }

  /// The largest significant bit count of the color channels, as used to
  /// judge gamma correction; the bit depth when sBIT doesn't apply.
  #[must_use]
  pub fn color_sbit(&self) -> u32 {
    let depth = u32::from(self.bit_depth);
    if self.invalid.contains(InvalidInfo::SBIT) {
      return depth;
    }
    let s = if self.format.contains(RowFormat::COLOR) {
      self.sbit[0].max(self.sbit[1]).max(self.sbit[2])
    } else {
      self.sbit[1]
    };
    u32::from(s).min(depth)
  }

  /// Marks every channel as fully significant at the current depth.
  #[inline]
  pub fn reset_sbit(&mut self) {
    self.sbit = [self.bit_depth; 4];
  }

  /// Copies the values that describe sample meaning, rather than layout.
  #[inline]
  pub(crate) fn keep_channel_data(&mut self, from: &Self) {
    self.gamma = from.gamma;
    self.sbit = from.sbit;
    self.invalid = from.invalid;
  }
}

/// Reads sample `index` of a row of 8 or 16 bit samples.
#[inline]
#[must_use]
pub(crate) fn get_sample(row: &[u8], index: usize, depth: u8, swapped: bool) -> u32 {
  if depth == 16 {
    let b = [row[index * 2], row[index * 2 + 1]];
    u32::from(if swapped { u16::from_le_bytes(b) } else { u16::from_be_bytes(b) })
  } else {
    u32::from(row[index])
  }
}

/// Writes sample `index` of a row of 8 or 16 bit samples.
#[inline]
pub(crate) fn put_sample(row: &mut [u8], index: usize, depth: u8, swapped: bool, value: u32) {
  if depth == 16 {
    let b = if swapped { (value as u16).to_le_bytes() } else { (value as u16).to_be_bytes() };
    row[index * 2..index * 2 + 2].copy_from_slice(&b);
  } else {
    row[index] = value as u8;
  }
}

/// Reads pixel `x` of a row of packed 1, 2 or 4 bit pixels.
#[inline]
#[must_use]
pub(crate) fn get_packed(row: &[u8], x: usize, depth: u8, lsb_first: bool) -> u32 {
  let depth = usize::from(depth);
  let per_byte = 8 / depth;
  let slot = x % per_byte;
  let shift = if lsb_first { slot * depth } else { 8 - depth - slot * depth };
  u32::from(row[x / per_byte] >> shift) & ((1 << depth) - 1)
}

/// Writes pixel `x` of a row of packed 1, 2 or 4 bit pixels.
#[inline]
pub(crate) fn put_packed(row: &mut [u8], x: usize, depth: u8, lsb_first: bool, value: u32) {
  let depth = usize::from(depth);
  let per_byte = 8 / depth;
  let slot = x % per_byte;
  let shift = if lsb_first { slot * depth } else { 8 - depth - slot * depth };
  let mask = (((1_u32 << depth) - 1) as u8) << shift;
  let byte = &mut row[x / per_byte];
  *byte = (*byte & !mask) | (((value as u8) << shift) & mask);
}
