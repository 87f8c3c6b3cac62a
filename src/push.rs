//! The push reader.
//!
//! A [`ReadSession`] is handed the bytes of a PNG in pieces of any size, as
//! they arrive, and calls back into a [`PushHandler`] as the image is read:
//! once with the [`ImageInfo`] when the first image data is reached, once per
//! transformed row, and once at the end. Chunks are checked and parsed as they
//! complete, and the image data is inflated, unfiltered, and sent through the
//! transform chain one row at a time.
//!
//! A callback can [pause](Control::pause) the session. Fatal errors poison
//! it: the failing call and every call after it return the error.

use alloc::vec::Vec;

use crate::{
  chunk::{ChunkHeader, ChunkType, PNG_MAX_CHUNK_LEN, PNG_SIGNATURE},
  chunks::{bKGD, parse_gama, parse_plte, parse_sbit, parse_srgb, tRNS},
  config::{CrcAction, DecoderConfig},
  crc32::Crc32,
  error::{AppError, PngError, PngWarning, WarningKind},
  ihdr::{PngColorType, IHDR},
  inflate::Inflater,
  info::ImageInfo,
  interlace::{expand_pass_row, pass_pos_to_full_pos, reduced_image_dimensions},
  sample::{translate_gamma, FP_1, GAMMA_SRGB_INVERSE},
  transform::{
    order, AlphaMode, BackgroundColor, BackgroundGamma, ByteOps, Chain, CheckPalette, Compose, ErrorAction,
    Expand, Gamma, InitAlpha, InitContext, Invert, Pack, PackSwap, RgbToGray, RunLog, Scale16, Shift, Transform,
    TrueBits, BYTE_OPS_BGR, BYTE_OPS_CHOP_16, BYTE_OPS_EXPAND_16, BYTE_OPS_GRAY_TO_RGB, BYTE_OPS_SWAP_16,
    BYTE_OPS_SWAP_ALPHA, EXPAND_LBD_GRAY, EXPAND_PALETTE, INIT_ALPHA_EXPAND_TRNS, INIT_ALPHA_STRIP, INVERT_ALPHA,
    INVERT_MONO,
  },
  unfilter::{unfilter_row, FilterType},
};

/// The callbacks of a [`ReadSession`].
///
/// Only [`row`](Self::row) is required.
pub trait PushHandler {
  /// The header and the ancillary chunks before the image data have been
  /// read, and the transform chain is ready. `info.output` describes the rows
  /// that follow.
  #[allow(unused_variables)]
  fn info(&mut self, info: &ImageInfo, control: &mut Control) {}

  /// One transformed row.
  ///
  /// For a non-interlaced image `row_number` is the image row and `pass` is
  /// 0. For an interlaced image `pass` is the Adam7 pass (0 to 6); the row is
  /// a full width display row and `row_number` the image row when interlace
  /// handling is on, otherwise the row is the compact pass row and
  /// `row_number` counts rows within the pass.
  fn row(&mut self, row: &[u8], row_number: u32, pass: u8, control: &mut Control);

  /// `IEND` was read (or [`ReadSession::finish`] was called after the image
  /// data).
  #[allow(unused_variables)]
  fn end(&mut self, info: &ImageInfo, control: &mut Control) {}

  #[allow(unused_variables)]
  fn warning(&mut self, warning: &PngWarning) {}

  #[allow(unused_variables)]
  fn app_error(&mut self, error: &AppError) {}

  /// An unknown ancillary chunk, when
  /// [`keep_unknown_chunks`](ReadSession::keep_unknown_chunks) is on.
  #[allow(unused_variables)]
  fn unknown_chunk(&mut self, chunk_type: ChunkType, data: &[u8], control: &mut Control) {}
}

/// Lets a callback pause the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Control {
  pause: Option<bool>,
}
impl Control {
  /// Stops [`feed`](ReadSession::feed) once the callback returns.
  ///
  /// With `save` the unread bytes of that `feed` are kept by the session and
  /// read first by the next call. Without it `feed` returns how many bytes it
  /// didn't read, and the caller must pass them again.
  #[inline]
  pub fn pause(&mut self, save: bool) {
    self.pause = Some(save);
  }

  #[inline]
  #[must_use]
  pub const fn is_paused(&self) -> bool {
    self.pause.is_some()
  }
}

/// Where to put a filler channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FillerPosition {
  /// `XRGB` / `XG`.
  Before,
  /// `RGBX` / `GX`.
  #[default]
  After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
  Signature,
  Header,
  /// Gathering a whole chunk and its CRC.
  Chunk,
  /// Streaming `IDAT` data.
  Idat { remaining: u32 },
  /// Dropping chunk data.
  Skip { remaining: u32 },
  /// The CRC after streamed or dropped data.
  Crc,
  Done,
}

/// The chunks seen so far.
#[derive(Debug, Clone, Copy, Default)]
struct Seen {
  plte: bool,
  idat: bool,
  idat_ended: bool,
  srgb: bool,
  gama: bool,
  sbit: bool,
}

/// Row assembly state, from the first `IDAT` on.
#[derive(Debug)]
struct Rows {
  inflater: Inflater,
  inflate_failed: bool,
  extra_warned: bool,
  /// The pass being read, `None` once every row is in.
  pass: Option<usize>,
  row: u32,
  pass_width: u32,
  pass_height: u32,
  /// Filter byte and data of the row being read.
  filtered: Vec<u8>,
  filled: usize,
  /// The previous unfiltered row of this pass.
  prev: Vec<u8>,
  first_row: bool,
  /// The row handed to the transforms, wide enough for any of them.
  work: Vec<u8>,
}
impl Rows {
  fn new(ihdr: &IHDR, max_pixel_depth: u32, check_adler32: bool) -> Result<Self, PngError> {
    let stored = ihdr.bytes_per_scanline(ihdr.width);
    let wide = (ihdr.width as usize * max_pixel_depth.max(ihdr.bits_per_pixel() as u32) as usize + 7) / 8;
    let mut filtered = Vec::new();
    filtered.try_reserve(stored + 1)?;
    filtered.resize(stored + 1, 0);
    let mut prev = Vec::new();
    prev.try_reserve(stored)?;
    prev.resize(stored, 0);
    let mut work = Vec::new();
    work.try_reserve(wide)?;
    work.resize(wide, 0);
    let mut rows = Self {
      inflater: Inflater::new(check_adler32),
      inflate_failed: false,
      extra_warned: false,
      pass: None,
      row: 0,
      pass_width: 0,
      pass_height: 0,
      filtered,
      filled: 0,
      prev,
      first_row: true,
      work,
    };
    rows.start_pass(ihdr, 0);
    Ok(rows)
  }

  /// Moves to the first pass from `from` on that has pixels.
  fn start_pass(&mut self, ihdr: &IHDR, from: usize) {
    let dims = reduced_image_dimensions(ihdr.width, ihdr.height);
    let passes = if ihdr.is_interlaced { 7 } else { 1 };
    self.pass = None;
    for pass in from..passes {
      let (w, h) = if ihdr.is_interlaced { dims[pass + 1] } else { dims[0] };
      if w > 0 && h > 0 {
        self.pass = Some(pass);
        self.row = 0;
        self.pass_width = w;
        self.pass_height = h;
        self.filled = 0;
        self.first_row = true;
        tracing::trace!("pass {pass}: {w}x{h}");
        return;
      }
    }
  }
}

/// A push-mode PNG decoder.
pub struct ReadSession<H: PushHandler> {
  handler: H,
  config: DecoderConfig,
  control: Control,
  state: State,
  /// Part of a fixed size piece: the signature, a header, a whole chunk, or
  /// a CRC.
  carry: Vec<u8>,
  /// Input kept by a saving pause.
  saved: Vec<u8>,
  chunk: ChunkHeader,
  crc: Crc32,
  seen: Seen,
  info: Option<ImageInfo>,
  chain: Chain,
  rows: Option<Rows>,
  /// The gamma assumed for files without gAMA or sRGB.
  default_file_gamma: i32,
  /// Replaces whatever gamma the file records.
  file_gamma: i32,
  /// A background requested from the file's bKGD.
  file_background: Option<BackgroundGamma>,
  interlace_handling: bool,
  keep_unknown: bool,
  rgb_to_gray_found: bool,
  in_feed: bool,
  poisoned: Option<PngError>,
}
impl<H: PushHandler> core::fmt::Debug for ReadSession<H> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("ReadSession")
      .field("state", &self.state)
      .field("chunk", &self.chunk)
      .field("info", &self.info)
      .field("chain", &self.chain)
      .field("poisoned", &self.poisoned)
      .finish_non_exhaustive()
  }
}

impl<H: PushHandler> ReadSession<H> {
  #[inline]
  #[must_use]
  pub fn new(handler: H) -> Self {
    Self::with_config(handler, DecoderConfig::default())
  }

  #[must_use]
  pub fn with_config(handler: H, config: DecoderConfig) -> Self {
    Self {
      handler,
      config,
      control: Control::default(),
      state: State::Signature,
      carry: Vec::new(),
      saved: Vec::new(),
      chunk: ChunkHeader { length: 0, chunk_type: ChunkType([0; 4]) },
      crc: Crc32::new(),
      seen: Seen::default(),
      info: None,
      chain: Chain::new(),
      rows: None,
      default_file_gamma: 0,
      file_gamma: 0,
      file_background: None,
      interlace_handling: false,
      keep_unknown: false,
      rgb_to_gray_found: false,
      in_feed: false,
      poisoned: None,
    }
  }

  #[inline]
  #[must_use]
  pub fn handler(&self) -> &H {
    &self.handler
  }
  #[inline]
  #[must_use]
  pub fn handler_mut(&mut self) -> &mut H {
    &mut self.handler
  }
  #[inline]
  #[must_use]
  pub fn into_handler(self) -> H {
    self.handler
  }

  /// The image info, once `IHDR` has been read.
  #[inline]
  #[must_use]
  pub fn info(&self) -> Option<&ImageInfo> {
    self.info.as_ref()
  }

  /// If an rgb to gray transform has seen a pixel that wasn't gray.
  #[inline]
  #[must_use]
  pub const fn rgb_to_gray_status(&self) -> bool {
    self.rgb_to_gray_found
  }

  /// The `IEND` chunk has been read.
  #[inline]
  #[must_use]
  pub fn is_done(&self) -> bool {
    self.state == State::Done
  }

  /// Hands unknown ancillary chunks to
  /// [`PushHandler::unknown_chunk`] instead of dropping them.
  #[inline]
  pub fn keep_unknown_chunks(&mut self, keep: bool) {
    self.keep_unknown = keep;
  }

  /// Reads the next piece of the PNG.
  ///
  /// Gives the number of bytes of `bytes` that were not read. This is only
  /// ever non-zero when a callback paused without saving.
  pub fn feed(&mut self, bytes: &[u8]) -> Result<usize, PngError> {
    if let Some(e) = self.poisoned {
      return Err(e);
    }
    self.in_feed = true;
    let result = self.feed_inner(bytes);
    self.in_feed = false;
    if let Err(e) = result {
      tracing::error!("{:?}: {e}", self.chunk.chunk_type);
      self.poisoned = Some(e);
    }
    result
  }

  fn feed_inner(&mut self, bytes: &[u8]) -> Result<usize, PngError> {
    self.control = Control::default();
    if !self.saved.is_empty() {
      let saved = core::mem::take(&mut self.saved);
      let used = self.run(&saved)?;
      if self.control.is_paused() {
        // still inside the saved bytes: keep all of it
        self.saved.try_reserve(saved.len() - used + bytes.len())?;
        self.saved.extend_from_slice(&saved[used..]);
        self.saved.extend_from_slice(bytes);
        return Ok(0);
      }
    }
    let used = self.run(bytes)?;
    match self.control.pause {
      Some(true) => {
        self.saved.try_reserve(bytes.len() - used)?;
        self.saved.extend_from_slice(&bytes[used..]);
        Ok(0)
      }
      Some(false) => Ok(bytes.len() - used),
      None => Ok(0),
    }
  }

  /// Skips the rest of the chunk being dropped.
  ///
  /// Gives the number of input bytes the caller should skip (the chunk data
  /// left plus its CRC), or 0 when the session isn't dropping a chunk. The
  /// CRC of a skipped chunk isn't checked.
  pub fn skip(&mut self) -> u32 {
    if self.in_feed {
      self.app_error(AppError::SkipInsideFeed);
      return 0;
    }
    let State::Skip { remaining } = self.state else { return 0 };
    if !self.saved.is_empty() || !self.carry.is_empty() {
      self.app_error(AppError::SkipWithSavedData);
      return 0;
    }
    tracing::debug!("{:?}: caller skips {} bytes", self.chunk.chunk_type, remaining + 4);
    self.state = State::Header;
    remaining + 4
  }

  /// Tells the session the input has ended.
  ///
  /// Bytes kept by a saving pause are read first, and pauses are ignored
  /// from here on. Once the image data has started, missing rows are
  /// delivered as zero rows with a warning, and the end callback fires.
  pub fn finish(&mut self) -> Result<(), PngError> {
    if let Some(e) = self.poisoned {
      return Err(e);
    }
    self.in_feed = true;
    let result = self.finish_inner();
    self.in_feed = false;
    self.control = Control::default();
    if let Err(e) = result {
      tracing::error!("{:?}: {e}", self.chunk.chunk_type);
      self.poisoned = Some(e);
    }
    result
  }

  fn finish_inner(&mut self) -> Result<(), PngError> {
    let saved = core::mem::take(&mut self.saved);
    let mut pos = 0;
    while pos < saved.len() {
      self.control = Control::default();
      let used = self.run(&saved[pos..])?;
      if used == 0 && !self.control.is_paused() {
        break;
      }
      pos += used;
    }
    if self.state == State::Done {
      return Ok(());
    }
    if !self.seen.idat {
      return Err(PngError::UnexpectedEnd);
    }
    tracing::debug!("input ended before IEND");
    self.end_image_data()?;
    self.state = State::Done;
    self.fire_end();
    Ok(())
  }

  /// Reads from `input` until it runs out or a callback pauses, giving the
  /// number of bytes read.
  fn run(&mut self, input: &[u8]) -> Result<usize, PngError> {
    let mut pos = 0;
    while !self.control.is_paused() {
      let rest = &input[pos..];
      if rest.is_empty() && self.state != State::Done {
        break;
      }
      match self.state {
        State::Done => {
          if !rest.is_empty() {
            self.app_error(AppError::ReadBeyondEnd);
          }
          return Ok(input.len());
        }
        State::Signature => {
          let old = self.carry.len();
          pos += self.gather(rest, 8)?;
          for (i, &b) in self.carry.iter().enumerate().skip(old) {
            if b != PNG_SIGNATURE[i] {
              return Err(if i < 4 { PngError::NotPng } else { PngError::AsciiConversion });
            }
          }
          if self.carry.len() == 8 {
            self.carry.clear();
            self.state = State::Header;
          }
        }
        State::Header => {
          pos += self.gather(rest, 8)?;
          if self.carry.len() == 8 {
            let mut b = [0; 8];
            b.copy_from_slice(&self.carry);
            self.carry.clear();
            self.header(ChunkHeader::from(b))?;
          }
        }
        State::Chunk => {
          pos += self.gather(rest, self.chunk.length as usize + 4)?;
          if self.carry.len() == self.chunk.length as usize + 4 {
            let mut carry = core::mem::take(&mut self.carry);
            let result = self.whole_chunk(&carry);
            carry.clear();
            self.carry = carry;
            result?;
          }
        }
        State::Idat { remaining } => {
          let take = rest.len().min(remaining as usize);
          let used = self.idat_data(&rest[..take])?;
          self.crc.update(&rest[..used]);
          pos += used;
          let remaining = remaining - used as u32;
          self.state = if remaining == 0 { State::Crc } else { State::Idat { remaining } };
        }
        State::Skip { remaining } => {
          let take = rest.len().min(remaining as usize);
          self.crc.update(&rest[..take]);
          pos += take;
          let remaining = remaining - take as u32;
          self.state = if remaining == 0 { State::Crc } else { State::Skip { remaining } };
        }
        State::Crc => {
          pos += self.gather(rest, 4)?;
          if self.carry.len() == 4 {
            let expected = u32::from_be_bytes([self.carry[0], self.carry[1], self.carry[2], self.carry[3]]);
            self.carry.clear();
            self.state = State::Header;
            if self.crc.finish() != expected {
              // streamed data has been used already
              self.crc_mismatch(self.chunk.chunk_type)?;
            }
          }
        }
      }
    }
    Ok(pos)
  }

  /// Copies bytes into `carry` until it holds `want`, giving the number
  /// taken.
  fn gather(&mut self, input: &[u8], want: usize) -> Result<usize, PngError> {
    let n = (want - self.carry.len()).min(input.len());
    self.carry.try_reserve(n)?;
    self.carry.extend_from_slice(&input[..n]);
    Ok(n)
  }

  fn warn(&mut self, warning: PngWarning) {
    tracing::warn!("{:?}: {}", warning.chunk, warning.message);
    self.handler.warning(&warning);
  }

  fn app_error(&mut self, error: AppError) {
    tracing::warn!("{error}");
    self.handler.app_error(&error);
  }

  fn fire_end(&mut self) {
    if let Some(info) = &self.info {
      tracing::debug!("end of image");
      self.handler.end(info, &mut self.control);
    }
  }

  /// Decides what a CRC mismatch means, giving `false` when the chunk should
  /// be dropped.
  fn crc_mismatch(&mut self, chunk_type: ChunkType) -> Result<bool, PngError> {
    let critical = chunk_type.is_critical();
    let action = if critical { self.config.crc_critical } else { self.config.crc_ancillary };
    match action {
      CrcAction::Error => Err(PngError::Crc(chunk_type)),
      CrcAction::Warn => {
        self.warn(PngWarning::new(WarningKind::AncillaryCrc, "CRC error").in_chunk(chunk_type));
        // critical data can't be left out
        Ok(critical)
      }
      CrcAction::Discard => Ok(critical),
      CrcAction::Use => Ok(true),
    }
  }

  /// Checks a chunk header and picks how its data is read.
  fn header(&mut self, header: ChunkHeader) -> Result<(), PngError> {
    let t = header.chunk_type;
    if !t.is_valid() {
      return Err(PngError::InvalidChunkType);
    }
    if header.length > PNG_MAX_CHUNK_LEN || (t != ChunkType::IDAT && header.length > self.config.max_chunk_len) {
      return Err(PngError::ChunkTooLarge);
    }
    tracing::debug!("{t:?}: {} bytes", header.length);
    self.chunk = header;
    self.crc = Crc32::new();
    self.crc.update(&t.0);

    if self.seen.idat && !self.seen.idat_ended && t != ChunkType::IDAT {
      self.seen.idat_ended = true;
      self.end_image_data()?;
    }

    let length = header.length;
    let skip = State::Skip { remaining: length };
    let Some(info) = &self.info else {
      if t != ChunkType::IHDR {
        return Err(PngError::MissingIhdr);
      }
      if length != 13 {
        return Err(PngError::InvalidIhdr);
      }
      self.state = State::Chunk;
      return Ok(());
    };
    let has_palette = !info.palette.is_empty();
    let indexed = info.ihdr.color_type == PngColorType::Index;
    let (has_trns, has_background) = (info.trns.is_some(), info.background.is_some());
    self.state = match t {
      ChunkType::IHDR => return Err(PngError::Duplicate(t)),
      ChunkType::IDAT => {
        if self.seen.idat_ended {
          return Err(PngError::OutOfPlace(t));
        }
        if !self.seen.idat {
          if indexed && !has_palette {
            return Err(PngError::MissingPlte);
          }
          self.seen.idat = true;
          self.start_image()?;
        }
        State::Idat { remaining: length }
      }
      ChunkType::PLTE if self.seen.idat => return Err(PngError::OutOfPlace(t)),
      ChunkType::PLTE if self.seen.plte => return Err(PngError::Duplicate(t)),
      ChunkType::IEND if !self.seen.idat => return Err(PngError::MissingIdat),
      ChunkType::PLTE if length > 3 * 256 => {
        if indexed {
          return Err(PngError::InvalidPlte);
        }
        self.warn(PngWarning::new(WarningKind::BadAncillary, "invalid length").in_chunk(t));
        skip
      }
      ChunkType::PLTE | ChunkType::IEND => State::Chunk,
      ChunkType::tRNS | ChunkType::bKGD | ChunkType::gAMA | ChunkType::sRGB | ChunkType::sBIT => {
        let out_of_place =
          self.seen.idat || (indexed && !has_palette && (t == ChunkType::tRNS || t == ChunkType::bKGD));
        let duplicate = match t {
          ChunkType::tRNS => has_trns,
          ChunkType::bKGD => has_background,
          ChunkType::gAMA => self.seen.gama,
          ChunkType::sRGB => self.seen.srgb,
          _ => self.seen.sbit,
        };
        if out_of_place {
          self.warn(PngWarning::new(WarningKind::BadAncillary, "out of place").in_chunk(t));
          skip
        } else if duplicate {
          self.warn(PngWarning::new(WarningKind::BadAncillary, "duplicate").in_chunk(t));
          skip
        } else if length > max_ancillary_len(t) {
          self.warn(PngWarning::new(WarningKind::BadAncillary, "invalid length").in_chunk(t));
          skip
        } else {
          State::Chunk
        }
      }
      _ if t.is_critical() => return Err(PngError::UnknownCritical(t)),
      _ if self.keep_unknown => State::Chunk,
      _ => skip,
    };
    self.state = match self.state {
      State::Idat { remaining: 0 } | State::Skip { remaining: 0 } => State::Crc,
      other => other,
    };
    Ok(())
  }

  /// Handles a gathered chunk: its data followed by the CRC.
  fn whole_chunk(&mut self, carry: &[u8]) -> Result<(), PngError> {
    let t = self.chunk.chunk_type;
    let (data, crc) = carry.split_at(carry.len() - 4);
    self.crc.update(data);
    self.state = State::Header;
    if self.crc.finish() != u32::from_be_bytes([crc[0], crc[1], crc[2], crc[3]]) && !self.crc_mismatch(t)? {
      tracing::debug!("{t:?}: dropped");
      return Ok(());
    }
    let bad = |message| PngWarning::new(WarningKind::BadAncillary, message).in_chunk(t);

    if t == ChunkType::IHDR {
      let ihdr = IHDR::try_from(data).map_err(|_| PngError::InvalidIhdr)?;
      if ihdr.width > self.config.max_width || ihdr.height > self.config.max_height {
        return Err(PngError::DimensionsTooLarge);
      }
      tracing::debug!(
        "{}x{} {:?} depth {}{}",
        ihdr.width,
        ihdr.height,
        ihdr.color_type,
        ihdr.bit_depth,
        if ihdr.is_interlaced { " interlaced" } else { "" }
      );
      self.info = Some(ImageInfo::new(ihdr));
      return Ok(());
    }
    let Some(info) = self.info.as_mut() else { return Err(PngError::MissingIhdr) };
    let ihdr = info.ihdr;
    match t {
      ChunkType::PLTE => {
        self.seen.plte = true;
        match (ihdr.color_type, parse_plte(data, &ihdr)) {
          (PngColorType::Y | PngColorType::YA, _) => self.warn(bad("ignored in grayscale PNG")),
          (PngColorType::Index, Err(())) => return Err(PngError::InvalidPlte),
          (_, Err(())) => self.warn(bad("invalid")),
          (_, Ok(entries)) => info.palette = entries.to_vec(),
        }
      }
      ChunkType::tRNS => match tRNS::parse(data, &ihdr, info.palette.len()) {
        Ok(trns) => {
          info.trns = Some(trns);
          info.check_trns_for_alpha();
        }
        Err(()) => self.warn(bad("invalid")),
      },
      ChunkType::bKGD => match bKGD::parse(data, &ihdr, info.palette.len()) {
        Ok(bkgd) => info.background = Some(bkgd),
        Err(()) => self.warn(bad("invalid")),
      },
      ChunkType::gAMA => {
        self.seen.gama = true;
        match parse_gama(data) {
          // sRGB has the last word
          Ok(_) if self.seen.srgb => (),
          Ok(gamma) => info.gamma = gamma,
          Err(()) => self.warn(bad("invalid")),
        }
      }
      ChunkType::sRGB => {
        self.seen.srgb = true;
        match parse_srgb(data) {
          Ok(_) => info.gamma = GAMMA_SRGB_INVERSE,
          Err(()) => self.warn(bad("invalid")),
        }
      }
      ChunkType::sBIT => {
        self.seen.sbit = true;
        match parse_sbit(data, &ihdr) {
          Ok(sbit) => info.sbit = Some(sbit),
          Err(()) => self.warn(bad("invalid")),
        }
      }
      ChunkType::IEND => {
        if !data.is_empty() {
          self.warn(bad("invalid"));
        }
        self.state = State::Done;
        self.fire_end();
      }
      _ => {
        tracing::trace!("{t:?}: to the handler");
        self.handler.unknown_chunk(t, data, &mut self.control);
      }
    }
    Ok(())
  }

  /// Prepares the transform chain and the row buffers, then fires the info
  /// callback.
  fn start_image(&mut self) -> Result<(), PngError> {
    let Some(info) = self.info.as_mut() else { return Err(PngError::MissingIhdr) };
    if self.file_gamma > 0 {
      info.gamma = self.file_gamma;
    } else if info.gamma == 0 {
      info.gamma = self.default_file_gamma;
    }
    let mut errors = Vec::new();
    if let Some(gamma) = self.file_background {
      match background_from_file(info) {
        Some(color) => {
          let compose = self.chain.entry(order::COMPOSE, || Transform::Compose(Compose::default()));
          if let Transform::Compose(c) = compose {
            c.set_background(color, gamma, true);
          }
        }
        None => errors.push(AppError::MissingBackground),
      }
    }
    if info.ihdr.color_type == PngColorType::Index {
      self.chain.add(order::CHECK_PALETTE, Transform::CheckPalette(CheckPalette::default()));
    }

    let mut cx = InitContext::new(info, self.config.gamma_threshold);
    self.chain.prepare(&mut cx)?;
    errors.append(&mut cx.app_errors);
    let warnings = core::mem::take(&mut cx.log.warnings);
    let ihdr = info.ihdr;
    let max_pixel_depth = info.max_pixel_depth;
    tracing::debug!(
      "output {:?} depth {}, {} row bytes",
      info.output.format,
      info.output.bit_depth,
      info.output_row_bytes()
    );

    for e in errors {
      self.app_error(e);
    }
    for w in warnings {
      self.warn(w);
    }
    self.rows = Some(Rows::new(&ihdr, max_pixel_depth, self.config.check_adler32)?);
    if let Some(info) = &self.info {
      self.handler.info(info, &mut self.control);
    }
    Ok(())
  }

  /// Inflates `IDAT` data and delivers the rows it completes, giving the
  /// number of bytes read.
  fn idat_data(&mut self, input: &[u8]) -> Result<usize, PngError> {
    let Some(mut rows) = self.rows.take() else { return Ok(input.len()) };
    let result = self.idat_rows(&mut rows, input);
    self.rows = Some(rows);
    result
  }

  fn idat_rows(&mut self, rows: &mut Rows, input: &[u8]) -> Result<usize, PngError> {
    let mut used = 0;
    loop {
      self.drain(rows, true)?;
      if self.control.is_paused() {
        return Ok(used);
      }
      if rows.inflate_failed {
        return Ok(input.len());
      }
      if rows.inflater.is_done() {
        if used < input.len() {
          self.too_much(rows);
        }
        return Ok(input.len());
      }
      match rows.inflater.pump(&input[used..]) {
        Ok(n) => {
          used += n;
          if n == 0 && rows.inflater.available() == 0 {
            return Ok(used);
          }
        }
        Err(e) => {
          self.warn(PngWarning::new(WarningKind::Inflate, e.message()).in_chunk(ChunkType::IDAT));
          rows.inflate_failed = true;
          self.zero_fill(rows)?;
          return Ok(input.len());
        }
      }
    }
  }

  fn too_much(&mut self, rows: &mut Rows) {
    if !rows.extra_warned {
      rows.extra_warned = true;
      self.warn(PngWarning::new(WarningKind::ExtraImageData, "Too much IDAT data").in_chunk(ChunkType::IDAT));
    }
  }

  /// Moves inflated bytes into rows, delivering each row as it completes.
  fn drain(&mut self, rows: &mut Rows, pausable: bool) -> Result<(), PngError> {
    let Some(ihdr) = self.info.as_ref().map(|i| i.ihdr) else { return Ok(()) };
    loop {
      if rows.inflate_failed || (pausable && self.control.is_paused()) {
        return Ok(());
      }
      if rows.pass.is_none() {
        let mut scratch = [0; 64];
        let mut extra = false;
        while rows.inflater.read(&mut scratch) > 0 {
          extra = true;
        }
        if extra {
          self.too_much(rows);
        }
        return Ok(());
      }
      let len = ihdr.bytes_per_scanline(rows.pass_width) + 1;
      rows.filled += rows.inflater.read(&mut rows.filtered[rows.filled..len]);
      if rows.filled < len {
        return Ok(());
      }
      self.finish_row(rows)?;
    }
  }

  /// Delivers every row not yet read as zeros.
  fn zero_fill(&mut self, rows: &mut Rows) -> Result<(), PngError> {
    let Some(ihdr) = self.info.as_ref().map(|i| i.ihdr) else { return Ok(()) };
    while rows.pass.is_some() {
      let len = ihdr.bytes_per_scanline(rows.pass_width) + 1;
      rows.filtered[..len].fill(0);
      rows.filled = len;
      self.finish_row(rows)?;
    }
    Ok(())
  }

  /// Called when the image data ends: flushes what is left and makes up
  /// any missing rows.
  fn end_image_data(&mut self) -> Result<(), PngError> {
    let Some(mut rows) = self.rows.take() else { return Ok(()) };
    let mut result = self.drain(&mut rows, false);
    if result.is_ok() && rows.pass.is_some() {
      if !rows.inflate_failed {
        self.warn(PngWarning::new(WarningKind::TruncatedImageData, "Not enough image data"));
      }
      result = self.zero_fill(&mut rows);
    }
    self.rows = Some(rows);
    result
  }

  /// Unfilters the completed row in `rows.filtered`, transforms it, and
  /// hands it to the handler.
  fn finish_row(&mut self, rows: &mut Rows) -> Result<(), PngError> {
    let Some(pass) = rows.pass else { return Ok(()) };
    let Some(info) = self.info.as_ref() else { return Err(PngError::MissingIhdr) };
    let ihdr = info.ihdr;
    let bytes = ihdr.bytes_per_scanline(rows.pass_width);
    rows.filled = 0;

    let filter = FilterType::try_from(rows.filtered[0]).map_err(|_| PngError::BadFilter)?;
    let prev: &[u8] = if rows.first_row { &[] } else { &rows.prev[..bytes] };
    unfilter_row(filter, &mut rows.filtered[1..=bytes], prev, ihdr.filter_chunk_size());
    rows.prev[..bytes].copy_from_slice(&rows.filtered[1..=bytes]);
    rows.first_row = false;

    let stored = &rows.filtered[1..=bytes];
    let mut tc = info.image_descriptor();
    let row_number = if ihdr.is_interlaced && self.interlace_handling {
      expand_pass_row(stored, &mut rows.work, pass, ihdr.width, ihdr.bits_per_pixel());
      pass_pos_to_full_pos(pass, 0, rows.row).1
    } else {
      rows.work[..bytes].copy_from_slice(stored);
      tc.width = rows.pass_width;
      rows.row
    };

    let mut log = RunLog::default();
    let result = self.chain.run_forwards(&mut rows.work, &mut tc, &mut log);
    if log.rgb_to_gray_found {
      self.rgb_to_gray_found = true;
    }
    for w in log.warnings {
      self.warn(w);
    }
    result?;
    self.handler.row(&rows.work[..tc.row_bytes()], row_number, pass as u8, &mut self.control);

    rows.row += 1;
    if rows.row == rows.pass_height {
      rows.start_pass(&ihdr, pass + 1);
    }
    Ok(())
  }

  /// Checks that transforms may still be added.
  fn register(&mut self, what: &str) -> bool {
    if self.seen.idat {
      tracing::debug!("{what} requested after the image data started");
      self.app_error(AppError::LateTransform);
      false
    } else {
      tracing::trace!("{what} requested");
      true
    }
  }

  fn add(&mut self, what: &str, order: u32, transform: Transform) {
    if self.register(what) {
      self.chain.add(order, transform);
    }
  }

  /// Expands palette images to RGB, low bit depth gray to 8 bits, and a
  /// tRNS color key to an alpha channel.
  pub fn set_expand(&mut self) {
    self.add("expand", order::EXPAND, Transform::Expand(Expand::new(EXPAND_PALETTE | EXPAND_LBD_GRAY)));
    self.add("expand", order::INIT_ALPHA, Transform::InitAlpha(InitAlpha::new(INIT_ALPHA_EXPAND_TRNS)));
  }

  /// Expands palette images to RGB, or RGBA when there is a tRNS chunk.
  pub fn set_palette_to_rgb(&mut self) {
    self.add("palette to rgb", order::EXPAND, Transform::Expand(Expand::new(EXPAND_PALETTE)));
  }

  pub fn set_expand_gray_1_2_4_to_8(&mut self) {
    self.add("expand gray", order::EXPAND, Transform::Expand(Expand::new(EXPAND_LBD_GRAY)));
  }

  /// Turns a tRNS chunk into a full alpha channel.
  pub fn set_trns_to_alpha(&mut self) {
    self.add("tRNS to alpha", order::INIT_ALPHA, Transform::InitAlpha(InitAlpha::new(INIT_ALPHA_EXPAND_TRNS)));
  }

  /// Like [`set_expand`](Self::set_expand), then widens 8 bit samples to 16.
  pub fn set_expand_16(&mut self) {
    self.set_expand();
    self.add("expand 16", order::CHANNEL_PREQ, Transform::ByteOps(ByteOps::new(BYTE_OPS_EXPAND_16)));
  }

  pub fn set_strip_alpha(&mut self) {
    self.add("strip alpha", order::INIT_ALPHA, Transform::InitAlpha(InitAlpha::new(INIT_ALPHA_STRIP)));
  }

  /// Reduces 16 bit samples to 8 by dropping the low byte.
  pub fn set_strip_16(&mut self) {
    self.add("strip 16", order::CHANNEL_PREQ, Transform::ByteOps(ByteOps::new(BYTE_OPS_CHOP_16)));
  }

  /// Reduces 16 bit samples to 8 with rounding.
  pub fn set_scale_16(&mut self) {
    self.add("scale 16", order::SCALE_16_TO_8, Transform::Scale16(Scale16::default()));
  }

  pub fn set_gray_to_rgb(&mut self) {
    self.add("gray to rgb", order::EXPAND, Transform::Expand(Expand::new(EXPAND_LBD_GRAY)));
    self.add("gray to rgb", order::CHANNEL_PREQ, Transform::ByteOps(ByteOps::new(BYTE_OPS_GRAY_TO_RGB)));
  }

  /// Delivers color as BGR.
  pub fn set_bgr(&mut self) {
    self.add("bgr", order::CHANNEL_POSTQ, Transform::ByteOps(ByteOps::new(BYTE_OPS_BGR)));
  }

  /// Moves alpha in front of the color channels.
  pub fn set_swap_alpha(&mut self) {
    self.add("swap alpha", order::CHANNEL_POSTQ, Transform::ByteOps(ByteOps::new(BYTE_OPS_SWAP_ALPHA)));
  }

  /// Delivers 16 bit samples little endian.
  pub fn set_swap(&mut self) {
    self.add("swap", order::CHANNEL_POSTQ, Transform::ByteOps(ByteOps::new(BYTE_OPS_SWAP_16)));
  }

  /// Adds a filler channel of `value` to images without alpha.
  pub fn set_filler(&mut self, value: u16, position: FillerPosition) {
    let first = position == FillerPosition::Before;
    self.add("filler", order::CHANNEL_POSTQ, Transform::ByteOps(ByteOps::filler(value, first, false)));
  }

  /// Like [`set_filler`](Self::set_filler), but the channel counts as alpha.
  pub fn set_add_alpha(&mut self, value: u16, position: FillerPosition) {
    let first = position == FillerPosition::Before;
    self.add("add alpha", order::CHANNEL_POSTQ, Transform::ByteOps(ByteOps::filler(value, first, true)));
  }

  /// Inverts gray samples.
  pub fn set_invert_mono(&mut self) {
    self.add("invert mono", order::INVERT, Transform::Invert(Invert::new(INVERT_MONO)));
  }

  /// Delivers transparency instead of opacity.
  pub fn set_invert_alpha(&mut self) {
    self.add("invert alpha", order::INVERT, Transform::Invert(Invert::new(INVERT_ALPHA)));
  }

  /// Shifts each channel down to its significant bits.
  pub fn set_shift(&mut self, bits: TrueBits) {
    let all = [bits.red, bits.green, bits.blue, bits.gray, bits.alpha];
    if all.iter().any(|&b| b > 16) {
      self.app_error(AppError::InvalidShift);
      return;
    }
    self.add("shift", order::SHIFT, Transform::Shift(Shift::new(bits)));
  }

  /// Delivers 1, 2, and 4 bit pixels one per byte.
  pub fn set_packing(&mut self) {
    self.add("packing", order::PACK, Transform::Pack(Pack::default()));
  }

  /// Delivers packed pixels with the first pixel in the low bits.
  pub fn set_packswap(&mut self) {
    self.add("packswap", order::PIXEL_SWAP, Transform::PackSwap(PackSwap::default()));
  }

  /// Delivers interlaced images as full width rows, each pass row filling
  /// the columns up to the next pixel of the pass.
  ///
  /// Gives the number of passes, 7 unless the image is known to not be
  /// interlaced.
  pub fn set_interlace_handling(&mut self) -> u8 {
    if self.register("interlace handling") {
      self.interlace_handling = true;
    }
    match &self.info {
      Some(info) if !info.ihdr.is_interlaced => 1,
      _ => 7,
    }
  }

  /// Converts color to gray.
  ///
  /// `weights` are the red and green weights, `FP_1` fixed point; blue gets
  /// the rest. `None` uses the sRGB weights.
  pub fn set_rgb_to_gray(&mut self, action: ErrorAction, weights: Option<(i32, i32)>) {
    let weights = match weights {
      Some((r, g)) if r < 0 || g < 0 || r + g > FP_1 => {
        self.app_error(AppError::RgbToGrayCoefficients);
        None
      }
      w => w,
    };
    self.add("rgb to gray", order::RGB_TO_GRAY, Transform::RgbToGray(RgbToGray::new(action, weights)));
  }

  /// Sets the display gamma, and the gamma of the file's data.
  ///
  /// Both are `FP_1` fixed point and may be
  /// [`GAMMA_FLAG_SRGB`](crate::sample::GAMMA_FLAG_SRGB) or
  /// [`GAMMA_FLAG_MAC`](crate::sample::GAMMA_FLAG_MAC). A valid
  /// `file_gamma` replaces the file's gAMA; an invalid one is reported and
  /// ignored, the screen gamma still applies.
  pub fn set_gamma(&mut self, screen_gamma: i32, file_gamma: i32) {
    if !self.register("gamma") {
      return;
    }
    match translate_gamma(file_gamma, false) {
      Ok(g) => self.file_gamma = g,
      Err(e) => self.app_error(e),
    }
    match translate_gamma(screen_gamma, true) {
      Ok(screen) => {
        self.chain.add(order::GAMMA_ENCODE, Transform::Gamma(Gamma::forced(screen, 0)));
      }
      Err(e) => self.app_error(e),
    }
  }

  /// Sets how alpha is delivered and the gamma of the output.
  pub fn set_alpha_mode(&mut self, mode: AlphaMode, output_gamma: i32) {
    let gamma = match translate_gamma(output_gamma, true) {
      Ok(g) => g,
      Err(e) => return self.app_error(e),
    };
    if !self.register("alpha mode") {
      return;
    }
    if self.default_file_gamma == 0 {
      self.default_file_gamma = gamma;
    }
    let associated = mode == AlphaMode::Associated;
    if let Transform::Compose(c) = self.chain.entry(order::COMPOSE, || Transform::Compose(Compose::default())) {
      c.set_associate(associated);
    }
    let to_gamma = if associated { FP_1 } else { gamma };
    self.chain.add(order::GAMMA_ENCODE, Transform::Gamma(Gamma::forced(to_gamma, 0)));
  }

  /// Composes transparent pixels onto `color`.
  ///
  /// With `need_expand` the color is in the image's stored format (an index
  /// for a palette image), otherwise in the output format.
  pub fn set_background(&mut self, color: BackgroundColor, gamma: BackgroundGamma, need_expand: bool) {
    let gamma = match gamma {
      BackgroundGamma::Unique(g) if !(16..=625_000_000).contains(&g) => {
        self.app_error(AppError::GammaOutOfRange);
        self.app_error(AppError::InvalidGammaInfo);
        if need_expand {
          BackgroundGamma::File
        } else {
          BackgroundGamma::Screen
        }
      }
      g => g,
    };
    if !self.register("background") {
      return;
    }
    if let Transform::Compose(c) = self.chain.entry(order::COMPOSE, || Transform::Compose(Compose::default())) {
      c.set_background(color, gamma, need_expand);
    }
  }

  /// Composes onto the file's bKGD color. Without a bKGD chunk nothing is
  /// composed and an app error is reported.
  pub fn set_background_from_file(&mut self) {
    if self.register("file background") {
      self.file_background = Some(BackgroundGamma::File);
    }
  }
}

/// The bKGD color as a stored format background.
fn background_from_file(info: &ImageInfo) -> Option<BackgroundColor> {
  Some(match info.background? {
    bKGD::Greyscale { y } => BackgroundColor::Gray(y),
    bKGD::RGB { r, g, b } => BackgroundColor::Rgb(r, g, b),
    bKGD::Index { i } => BackgroundColor::Index(i),
  })
}

/// The longest legal data of the small ancillary chunks, checked before
/// the data is gathered.
const fn max_ancillary_len(t: ChunkType) -> u32 {
  match t {
    ChunkType::gAMA => 4,
    ChunkType::sRGB => 1,
    ChunkType::sBIT => 4,
    ChunkType::bKGD => 6,
    ChunkType::tRNS => 256,
    _ => u32::MAX,
  }
}
