//! The encoder.
//!
//! A [`PngWriter`] takes rows in the format the same transforms would
//! produce when decoding, runs its transform chain backwards over each one to
//! get the stored format, and at [`finish`](PngWriter::finish) filters,
//! compresses, and wraps the image data in chunks.

use alloc::vec::Vec;

use crate::{
  chunk::{write_chunk, ChunkType, PNG_SIGNATURE},
  chunks::{bKGD, tRNS, RGB8},
  config::{EncoderConfig, FilterChoice},
  error::{AppError, PngError},
  ihdr::{PngColorType, IHDR},
  info::ImageInfo,
  interlace::{gather_pass_row, pass_pos_to_full_pos, reduced_image_dimensions},
  row::RowDescriptor,
  transform::{
    order, ByteOps, Chain, InitContext, Invert, Pack, PackSwap, Shift, Transform, TrueBits, BYTE_OPS_BGR,
    BYTE_OPS_SWAP_16, BYTE_OPS_SWAP_ALPHA, INVERT_ALPHA, INVERT_MONO,
  },
  push::FillerPosition,
  sample::GAMMA_THRESHOLD,
  unfilter::{filter_row, FilterType},
};

/// Builds a PNG file in memory.
#[derive(Debug)]
pub struct PngWriter {
  ihdr: IHDR,
  config: EncoderConfig,
  palette: Vec<RGB8>,
  trns: Option<tRNS>,
  gamma: Option<i32>,
  sbit: Option<TrueBits>,
  background: Option<bKGD>,
  chain: Chain,
  /// The caller's row format, once the chain is ready.
  user: Option<RowDescriptor>,
  max_pixel_depth: u32,
  /// The stored rows written so far.
  image: Vec<u8>,
  rows_written: u32,
  work: Vec<u8>,
  app_errors: Vec<AppError>,
}

impl PngWriter {
  /// A writer for an image with this header.
  ///
  /// The interlace flag of `ihdr` is replaced by the one in `config`.
  pub fn new(ihdr: IHDR, config: EncoderConfig) -> Result<Self, PngError> {
    let ihdr = IHDR { is_interlaced: config.interlace, ..ihdr };
    // the parser is the one place the header rules live
    let ihdr = IHDR::try_from(&ihdr.to_bytes()[..]).map_err(|_| PngError::InvalidIhdr)?;
    Ok(Self {
      ihdr,
      config,
      palette: Vec::new(),
      trns: None,
      gamma: None,
      sbit: None,
      background: None,
      chain: Chain::without_cache(),
      user: None,
      max_pixel_depth: ihdr.bits_per_pixel() as u32,
      image: Vec::new(),
      rows_written: 0,
      work: Vec::new(),
      app_errors: Vec::new(),
    })
  }

  #[inline]
  #[must_use]
  pub const fn ihdr(&self) -> &IHDR {
    &self.ihdr
  }

  /// The application errors seen so far. Each call that caused one was
  /// ignored.
  #[inline]
  #[must_use]
  pub fn app_errors(&self) -> &[AppError] {
    &self.app_errors
  }

  fn app_error(&mut self, error: AppError) {
    tracing::warn!("{error}");
    self.app_errors.push(error);
  }

  pub fn set_palette(&mut self, palette: &[RGB8]) {
    self.palette = palette.to_vec();
  }
  pub fn set_trns(&mut self, trns: tRNS) {
    self.trns = Some(trns);
  }
  /// Records the image gamma (`FP_1` fixed point) in a gAMA chunk.
  pub fn set_gamma(&mut self, gamma: i32) {
    if gamma <= 0 {
      self.app_error(AppError::FileGammaTooLow);
    } else {
      self.gamma = Some(gamma);
    }
  }
  /// Records the significant bits in an sBIT chunk.
  pub fn set_sbit(&mut self, bits: TrueBits) {
    self.sbit = Some(bits);
  }
  pub fn set_background(&mut self, background: bKGD) {
    self.background = Some(background);
  }

  fn add(&mut self, what: &str, order: u32, transform: Transform) {
    if self.user.is_some() {
      tracing::debug!("{what} requested after the first row");
      self.app_error(AppError::LateTransform);
    } else {
      self.chain.add(order, transform);
    }
  }

  /// Rows hold 1, 2, and 4 bit pixels one per byte.
  pub fn set_packing(&mut self) {
    self.add("packing", order::PACK, Transform::Pack(Pack::default()));
  }
  /// Packed rows have the first pixel in the low bits.
  pub fn set_packswap(&mut self) {
    self.add("packswap", order::PIXEL_SWAP, Transform::PackSwap(PackSwap::default()));
  }
  /// Rows hold values of `bits` significant bits, which are scaled up to the
  /// full bit depth.
  pub fn set_shift(&mut self, bits: TrueBits) {
    let all = [bits.red, bits.green, bits.blue, bits.gray, bits.alpha];
    if all.iter().any(|&b| b > self.ihdr.bit_depth) {
      self.app_error(AppError::InvalidShift);
      return;
    }
    self.add("shift", order::SHIFT, Transform::Shift(Shift::new(bits)));
  }
  /// Rows are BGR.
  pub fn set_bgr(&mut self) {
    self.add("bgr", order::CHANNEL_POSTQ, Transform::ByteOps(ByteOps::new(BYTE_OPS_BGR)));
  }
  /// Rows have alpha before the color channels.
  pub fn set_swap_alpha(&mut self) {
    self.add("swap alpha", order::CHANNEL_POSTQ, Transform::ByteOps(ByteOps::new(BYTE_OPS_SWAP_ALPHA)));
  }
  /// Rows are inverted gray.
  pub fn set_invert_mono(&mut self) {
    self.add("invert mono", order::INVERT, Transform::Invert(Invert::new(INVERT_MONO)));
  }
  /// Rows hold transparency instead of opacity.
  pub fn set_invert_alpha(&mut self) {
    self.add("invert alpha", order::INVERT, Transform::Invert(Invert::new(INVERT_ALPHA)));
  }
  /// Rows carry a filler channel, which is dropped.
  pub fn set_filler(&mut self, position: FillerPosition) {
    let first = position == FillerPosition::Before;
    self.add("filler", order::CHANNEL_POSTQ, Transform::ByteOps(ByteOps::filler(0, first, false)));
  }
  /// Rows hold 16 bit samples little endian.
  pub fn set_swap(&mut self) {
    self.add("swap", order::CHANNEL_POSTQ, Transform::ByteOps(ByteOps::new(BYTE_OPS_SWAP_16)));
  }

  /// The format [`write_row`](Self::write_row) expects. No transforms can
  /// be added after this.
  pub fn row_format(&mut self) -> Result<RowDescriptor, PngError> {
    if let Some(user) = self.user {
      return Ok(user);
    }
    let mut info = ImageInfo::new(self.ihdr);
    info.palette = self.palette.clone();
    info.trns = self.trns.clone();
    let mut cx = InitContext::new(&mut info, GAMMA_THRESHOLD);
    self.chain.prepare(&mut cx)?;
    let errors = core::mem::take(&mut cx.app_errors);
    for e in errors {
      self.app_error(e);
    }
    self.user = Some(info.output);
    self.max_pixel_depth = info.max_pixel_depth;
    let wide = (self.ihdr.width as usize * info.max_pixel_depth as usize + 7) / 8;
    let stored = self.ihdr.bytes_per_scanline(self.ihdr.width);
    self.work.try_reserve(wide.max(stored))?;
    self.work.resize(wide.max(stored), 0);
    self.image.try_reserve(stored * self.ihdr.height as usize)?;
    tracing::debug!(
      "caller rows: {:?} depth {}, {} bytes",
      info.output.format,
      info.output.bit_depth,
      info.output.row_bytes()
    );
    Ok(info.output)
  }

  /// Adds the next image row, top to bottom.
  pub fn write_row(&mut self, row: &[u8]) -> Result<(), PngError> {
    let user = self.row_format()?;
    if row.len() != user.row_bytes() || self.rows_written == self.ihdr.height {
      return Err(PngError::BadRowData);
    }
    self.work[..row.len()].copy_from_slice(row);
    let mut tc = user;
    self.chain.run_backwards(&mut self.work, &mut tc);
    let stored = self.ihdr.bytes_per_scanline(self.ihdr.width);
    self.image.extend_from_slice(&self.work[..stored]);
    self.rows_written += 1;
    tracing::trace!("row {} stored", self.rows_written - 1);
    Ok(())
  }

  /// Adds every row of an image at once.
  pub fn write_image(&mut self, pixels: &[u8]) -> Result<(), PngError> {
    let row_bytes = self.row_format()?.row_bytes();
    if row_bytes == 0 || pixels.len() != row_bytes * self.ihdr.height as usize {
      return Err(PngError::BadRowData);
    }
    for row in pixels.chunks_exact(row_bytes) {
      self.write_row(row)?;
    }
    Ok(())
  }

  /// Builds the file.
  pub fn finish(self) -> Result<Vec<u8>, PngError> {
    let ihdr = self.ihdr;
    if self.rows_written != ihdr.height {
      return Err(PngError::BadRowData);
    }
    if ihdr.color_type == PngColorType::Index && self.palette.is_empty() {
      return Err(PngError::MissingPlte);
    }

    let raw = self.filtered_data()?;
    let zlib = miniz_oxide::deflate::compress_to_vec_zlib(&raw, self.config.compression_level);
    tracing::debug!("{} bytes of filtered data, {} compressed", raw.len(), zlib.len());

    let mut out = Vec::new();
    out.try_reserve(zlib.len() + 1024)?;
    out.extend_from_slice(&PNG_SIGNATURE);
    write_chunk(&mut out, ChunkType::IHDR, &ihdr.to_bytes());
    if let Some(gamma) = self.gamma {
      write_chunk(&mut out, ChunkType::gAMA, &(gamma as u32).to_be_bytes());
    }
    if let Some(bits) = self.sbit {
      let data = match ihdr.color_type {
        PngColorType::Y => &[bits.gray][..],
        PngColorType::YA => &[bits.gray, bits.alpha][..],
        PngColorType::RGB | PngColorType::Index => &[bits.red, bits.green, bits.blue][..],
        PngColorType::RGBA => &[bits.red, bits.green, bits.blue, bits.alpha][..],
      };
      write_chunk(&mut out, ChunkType::sBIT, data);
    }
    if !self.palette.is_empty() && ihdr.color_type.has_color() {
      write_chunk(&mut out, ChunkType::PLTE, bytemuck::cast_slice(&self.palette));
    }
    if let Some(trns) = &self.trns {
      write_chunk(&mut out, ChunkType::tRNS, &trns.to_bytes());
    }
    if let Some(background) = &self.background {
      write_chunk(&mut out, ChunkType::bKGD, &background.to_bytes());
    }
    let mut idat_count = 0;
    for piece in zlib.chunks(self.config.idat_chunk_size as usize) {
      write_chunk(&mut out, ChunkType::IDAT, piece);
      idat_count += 1;
    }
    write_chunk(&mut out, ChunkType::IEND, &[]);
    tracing::debug!("wrote {} bytes in {idat_count} IDAT chunks", out.len());
    Ok(out)
  }

  /// Filters the stored rows, pass by pass when interlaced.
  fn filtered_data(&self) -> Result<Vec<u8>, PngError> {
    let ihdr = &self.ihdr;
    let bits = ihdr.bits_per_pixel();
    let full = ihdr.bytes_per_scanline(ihdr.width);
    let mut raw = Vec::new();
    raw.try_reserve(ihdr.zlib_data_len())?;
    let mut prev = Vec::new();
    let mut pass_row = Vec::new();
    pass_row.try_reserve(full)?;
    pass_row.resize(full, 0);
    let mut out = pass_row.clone();

    let image_row = |y: u32| &self.image[y as usize * full..(y as usize + 1) * full];
    if ihdr.is_interlaced {
      let dims = reduced_image_dimensions(ihdr.width, ihdr.height);
      for (pass, &(w, h)) in dims[1..].iter().enumerate() {
        if w == 0 || h == 0 {
          continue;
        }
        let len = ihdr.bytes_per_scanline(w);
        prev.clear();
        for r in 0..h {
          let (_, y) = pass_pos_to_full_pos(pass, 0, r);
          pass_row[..len].fill(0);
          gather_pass_row(&mut pass_row[..len], image_row(y), pass, w, bits);
          self.filter_into(&mut raw, &pass_row[..len], &prev, &mut out[..len]);
          prev.clear();
          prev.extend_from_slice(&pass_row[..len]);
        }
      }
    } else {
      for y in 0..ihdr.height {
        let row = image_row(y);
        self.filter_into(&mut raw, row, &prev, &mut out);
        prev.clear();
        prev.extend_from_slice(row);
      }
    }
    Ok(raw)
  }

  /// Appends the filter byte and the filtered row to `raw`.
  fn filter_into(&self, raw: &mut Vec<u8>, row: &[u8], prev: &[u8], out: &mut [u8]) {
    let bpp = self.ihdr.filter_chunk_size();
    let filter = match self.config.filter {
      FilterChoice::Fixed(t) => FilterType::try_from(t).unwrap_or(FilterType::None),
      // palette and low bit depth data rarely gains from filtering
      FilterChoice::Adaptive if self.ihdr.color_type == PngColorType::Index || self.ihdr.bit_depth < 8 => {
        FilterType::None
      }
      FilterChoice::Adaptive => {
        let mut best = (u64::MAX, FilterType::None);
        for filter in FilterType::ALL {
          filter_row(filter, row, prev, bpp, out);
          let sum: u64 = out.iter().map(|&b| u64::from((b as i8).unsigned_abs())).sum();
          if sum < best.0 {
            best = (sum, filter);
          }
        }
        best.1
      }
    };
    filter_row(filter, row, prev, bpp, out);
    raw.push(filter as u8);
    raw.extend_from_slice(out);
  }
}
