//! Streaming zlib decompression of the `IDAT` data.

use alloc::{boxed::Box, vec::Vec};

use miniz_oxide::inflate::{
  core::{decompress, inflate_flags, DecompressorOxide},
  TINFLStatus,
};

/// The deflate window; `decompress` needs a power of two.
const WINDOW: usize = 32 * 1024;

/// Why the zlib stream couldn't be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InflateError {
  Checksum,
  Data,
}
impl InflateError {
  #[inline]
  #[must_use]
  pub const fn message(self) -> &'static str {
    match self {
      Self::Checksum => "IDAT: incorrect data check",
      Self::Data => "IDAT: invalid compressed data",
    }
  }
}

/// A zlib decoder that takes its input in pieces of any size.
///
/// Output goes to a circular window. [`read`](Self::read) takes it out, and
/// [`pump`](Self::pump) only decodes more once the window has been emptied.
pub(crate) struct Inflater {
  state: Box<DecompressorOxide>,
  window: Vec<u8>,
  /// Total bytes written to the window.
  written: usize,
  /// Total bytes read out of the window.
  read: usize,
  done: bool,
  flags: u32,
}
impl core::fmt::Debug for Inflater {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Inflater")
      .field("written", &self.written)
      .field("read", &self.read)
      .field("done", &self.done)
      .finish()
  }
}
impl Inflater {
  pub fn new(check_adler32: bool) -> Self {
    let mut flags = inflate_flags::TINFL_FLAG_PARSE_ZLIB_HEADER | inflate_flags::TINFL_FLAG_HAS_MORE_INPUT;
    if !check_adler32 {
      flags |= inflate_flags::TINFL_FLAG_IGNORE_ADLER32;
    }
    Self {
      state: Box::default(),
      window: alloc::vec![0; WINDOW],
      written: 0,
      read: 0,
      done: false,
      flags,
    }
  }

  /// The end of the zlib stream has been decoded.
  #[inline]
  #[must_use]
  pub const fn is_done(&self) -> bool {
    self.done
  }

  /// Decoded bytes not yet read.
  #[inline]
  #[must_use]
  pub const fn available(&self) -> usize {
    self.written - self.read
  }

  /// Decodes from `input` into the (empty) window, giving the number of
  /// input bytes used.
  pub fn pump(&mut self, input: &[u8]) -> Result<usize, InflateError> {
    debug_assert_eq!(self.available(), 0);
    if self.done {
      return Ok(0);
    }
    let pos = self.written & (WINDOW - 1);
    let (status, consumed, produced) = decompress(&mut self.state, input, &mut self.window, pos, self.flags);
    self.written += produced;
    match status {
      TINFLStatus::Done => {
        self.done = true;
        Ok(consumed)
      }
      TINFLStatus::NeedsMoreInput | TINFLStatus::HasMoreOutput => Ok(consumed),
      TINFLStatus::Adler32Mismatch => Err(InflateError::Checksum),
      other => {
        tracing::trace!("inflate stopped: {:?}", other);
        Err(InflateError::Data)
      }
    }
  }

  /// Copies decoded bytes into `out`, giving the count.
  pub fn read(&mut self, out: &mut [u8]) -> usize {
    let mut total = 0;
    while total < out.len() && self.available() > 0 {
      let pos = self.read & (WINDOW - 1);
      let n = (WINDOW - pos).min(self.available()).min(out.len() - total);
      out[total..total + n].copy_from_slice(&self.window[pos..pos + n]);
      self.read += n;
      total += n;
    }
    total
  }
}
