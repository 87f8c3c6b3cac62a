//! Session configuration.

use crate::{chunk::PNG_MAX_CHUNK_LEN, sample::GAMMA_THRESHOLD};

/// What to do when a chunk's CRC doesn't match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrcAction {
  /// Fail the session.
  Error,
  /// Warn, then discard the chunk.
  Warn,
  /// Discard the chunk without a warning.
  Discard,
  /// Use the chunk data anyway, without a warning.
  Use,
}

/// Limits and policies of a [`ReadSession`](crate::push::ReadSession).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecoderConfig {
  /// The largest chunk length accepted for any chunk other than `IDAT`.
  pub max_chunk_len: u32,
  /// The largest image width accepted.
  pub max_width: u32,
  /// The largest image height accepted.
  pub max_height: u32,
  /// How far from 1.0 a gamma correction must be before it's applied.
  pub gamma_threshold: i32,
  /// CRC handling for critical chunks.
  pub crc_critical: CrcAction,
  /// CRC handling for ancillary chunks.
  pub crc_ancillary: CrcAction,
  /// If the zlib stream's adler32 checksum is verified.
  pub check_adler32: bool,
}
impl Default for DecoderConfig {
  #[inline]
  fn default() -> Self {
    Self {
      max_chunk_len: PNG_MAX_CHUNK_LEN,
      max_width: 1_000_000,
      max_height: 1_000_000,
      gamma_threshold: GAMMA_THRESHOLD,
      crc_critical: CrcAction::Error,
      crc_ancillary: CrcAction::Warn,
      check_adler32: true,
    }
  }
}
impl DecoderConfig {
  /// Sets the chunk length limit, capped to the PNG maximum.
  #[inline]
  #[must_use]
  pub const fn with_max_chunk_len(mut self, len: u32) -> Self {
    self.max_chunk_len = if len > PNG_MAX_CHUNK_LEN { PNG_MAX_CHUNK_LEN } else { len };
    self
  }
  #[inline]
  #[must_use]
  pub const fn with_max_dimensions(mut self, width: u32, height: u32) -> Self {
    self.max_width = width;
    self.max_height = height;
    self
  }
  #[inline]
  #[must_use]
  pub const fn with_gamma_threshold(mut self, threshold: i32) -> Self {
    self.gamma_threshold = threshold;
    self
  }
  #[inline]
  #[must_use]
  pub const fn with_crc_actions(mut self, critical: CrcAction, ancillary: CrcAction) -> Self {
    self.crc_critical = critical;
    self.crc_ancillary = ancillary;
    self
  }
  #[inline]
  #[must_use]
  pub const fn with_check_adler32(mut self, check: bool) -> Self {
    self.check_adler32 = check;
    self
  }
}

/// The row filter strategy of a [`PngWriter`](crate::write::PngWriter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterChoice {
  /// The same filter type (0 to 4) on every row.
  Fixed(u8),
  /// Per row, the filter giving the minimum sum of absolute differences.
  Adaptive,
}

/// Settings of a [`PngWriter`](crate::write::PngWriter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncoderConfig {
  /// How rows are filtered.
  pub filter: FilterChoice,
  /// The `miniz_oxide` compression level, `0..=10`.
  pub compression_level: u8,
  /// The largest `IDAT` payload to emit; longer data is split.
  pub idat_chunk_size: u32,
  /// If Adam7 interlaced output is written.
  pub interlace: bool,
}
impl Default for EncoderConfig {
  #[inline]
  fn default() -> Self {
    Self { filter: FilterChoice::Adaptive, compression_level: 6, idat_chunk_size: 8192, interlace: false }
  }
}
impl EncoderConfig {
  #[inline]
  #[must_use]
  pub const fn with_filter(mut self, filter: FilterChoice) -> Self {
    self.filter = filter;
    self
  }
  #[inline]
  #[must_use]
  pub const fn with_compression_level(mut self, level: u8) -> Self {
    self.compression_level = if level > 10 { 10 } else { level };
    self
  }
  /// Sets the `IDAT` split size (at least 1).
  #[inline]
  #[must_use]
  pub const fn with_idat_chunk_size(mut self, size: u32) -> Self {
    self.idat_chunk_size = if size == 0 { 1 } else if size > PNG_MAX_CHUNK_LEN { PNG_MAX_CHUNK_LEN } else { size };
    self
  }
  #[inline]
  #[must_use]
  pub const fn with_interlace(mut self, interlace: bool) -> Self {
    self.interlace = interlace;
    self
  }
}
