use core::fmt;

use crate::chunk::ChunkType;

/// A fatal error from a decode or encode session.
///
/// After one of these is returned the session is poisoned: every later call
/// returns the same error and no more callbacks fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PngError {
  /// The first 4 bytes aren't the PNG signature.
  #[error("Not a PNG file")]
  NotPng,
  /// The signature is mangled in a way line-ending conversion would cause.
  #[error("PNG file corrupted by ASCII conversion")]
  AsciiConversion,
  /// A chunk type contained a byte outside `A-Z` / `a-z`.
  #[error("invalid chunk type")]
  InvalidChunkType,
  /// A chunk declared a length larger than the configured limit.
  #[error("chunk data is too large")]
  ChunkTooLarge,
  /// A chunk's CRC didn't match and the configured action was to fail.
  #[error("{0:?}: CRC error")]
  Crc(ChunkType),
  /// A critical chunk that this decoder doesn't understand.
  #[error("{0:?}: unknown critical chunk")]
  UnknownCritical(ChunkType),
  /// The first chunk was not `IHDR`.
  #[error("missing IHDR")]
  MissingIhdr,
  /// A palette image reached `IDAT` without a `PLTE`.
  #[error("missing PLTE")]
  MissingPlte,
  /// `IEND` was reached with no image data.
  #[error("missing IDAT")]
  MissingIdat,
  /// A critical chunk appeared where it isn't allowed.
  #[error("{0:?}: out of place")]
  OutOfPlace(ChunkType),
  /// A critical chunk appeared twice.
  #[error("{0:?}: duplicate")]
  Duplicate(ChunkType),
  /// The IHDR fields were not a legal combination.
  #[error("invalid IHDR data")]
  InvalidIhdr,
  /// The image is larger than the configured limits.
  #[error("image dimensions exceed the configured limits")]
  DimensionsTooLarge,
  /// The PLTE length was zero, not a multiple of 3, or too long.
  #[error("invalid PLTE length")]
  InvalidPlte,
  /// An rgb-to-gray transform set to error found a colored pixel.
  #[error("RGB to gray found nongray pixel")]
  NonGrayPixel,
  /// A row started with a filter type byte above 4.
  #[error("bad adaptive filter value")]
  BadFilter,
  /// The input ended before any image data.
  #[error("unexpected end of PNG data")]
  UnexpectedEnd,
  /// An allocation failed.
  #[error("out of memory")]
  Alloc,
  /// The encoder was handed a row of the wrong length or too many rows.
  #[error("row data does not match the image header")]
  BadRowData,
}
impl From<alloc::collections::TryReserveError> for PngError {
  #[inline]
  fn from(_: alloc::collections::TryReserveError) -> Self {
    Self::Alloc
  }
}

/// The category of a benign error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
  /// An ancillary chunk failed its CRC and was discarded.
  AncillaryCrc,
  /// The image data ended before the last row; remaining rows are zero.
  TruncatedImageData,
  /// The compressed stream held bytes past the end of the image.
  ExtraImageData,
  /// The zlib stream was damaged; remaining rows are zero.
  Inflate,
  /// An ancillary chunk value was out of range or in the wrong place.
  BadAncillary,
  /// A pixel referenced a palette entry past the end of the palette.
  PaletteIndex,
  /// An rgb-to-gray transform found a colored pixel.
  NonGrayPixel,
}

/// A benign ("recoverable") error.
///
/// These are reported through [`PushHandler::warning`](crate::push::PushHandler::warning)
/// and processing continues with a defined fallback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PngWarning {
  /// What went wrong.
  pub kind: WarningKind,
  /// The human readable message.
  pub message: &'static str,
  /// The chunk being processed, if any.
  pub chunk: Option<ChunkType>,
}
impl PngWarning {
  #[inline]
  #[must_use]
  pub(crate) const fn new(kind: WarningKind, message: &'static str) -> Self {
    Self { kind, message, chunk: None }
  }
  #[inline]
  #[must_use]
  pub(crate) const fn in_chunk(mut self, chunk: ChunkType) -> Self {
    self.chunk = Some(chunk);
    self
  }
}

/// An application (API misuse) error.
///
/// The PNG data isn't at fault. The call is ignored or a fallback is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AppError {
  #[error("read beyond end of stream")]
  ReadBeyondEnd,
  #[error("transform registered after info")]
  LateTransform,
  #[error("invalid screen gamma (too low)")]
  ScreenGammaTooLow,
  #[error("invalid file gamma (too low)")]
  FileGammaTooLow,
  #[error("gamma value out of range")]
  GammaOutOfRange,
  #[error("invalid gamma information")]
  InvalidGammaInfo,
  #[error("missing background color")]
  MissingBackground,
  #[error("background index out of range")]
  BackgroundIndex,
  #[error("rgb_to_gray coefficients too large (ignored)")]
  RgbToGrayCoefficients,
  #[error("skip called inside feed")]
  SkipInsideFeed,
  #[error("skip called with saved data")]
  SkipWithSavedData,
  #[error("invalid shift value (ignored)")]
  InvalidShift,
}

/// Writes a chunk type's letters, or `?` for non-letter bytes.
pub(crate) fn write_chunk_name(f: &mut fmt::Formatter<'_>, name: [u8; 4]) -> fmt::Result {
  use fmt::Write;
  for b in name {
    f.write_char(if b.is_ascii_alphabetic() { b as char } else { '?' })?;
  }
  Ok(())
}
