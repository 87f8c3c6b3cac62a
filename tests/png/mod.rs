use pngflow::{
  chunk::{write_chunk, ChunkType, PNG_SIGNATURE},
  ihdr::{PngColorType, IHDR},
  AppError, Control, ImageInfo, PngError, PngWarning, PushHandler, ReadSession,
};

mod chunking;
mod fuzz;
mod gamma;
mod round_trip;
mod scenarios;
mod transforms;

/// Records every callback.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Collect {
  pub info: Option<ImageInfo>,
  pub rows: Vec<(u32, u8, Vec<u8>)>,
  pub warnings: Vec<PngWarning>,
  pub app_errors: Vec<AppError>,
  pub ended: bool,
}
impl PushHandler for Collect {
  fn info(&mut self, info: &ImageInfo, _: &mut Control) {
    self.info = Some(info.clone());
  }
  fn row(&mut self, row: &[u8], row_number: u32, pass: u8, _: &mut Control) {
    self.rows.push((row_number, pass, row.to_vec()));
  }
  fn end(&mut self, _: &ImageInfo, _: &mut Control) {
    self.ended = true;
  }
  fn warning(&mut self, warning: &PngWarning) {
    self.warnings.push(warning.clone());
  }
  fn app_error(&mut self, error: &AppError) {
    self.app_errors.push(*error);
  }
}

pub fn ihdr(color_type: PngColorType, bit_depth: u8, width: u32, height: u32) -> IHDR {
  IHDR { width, height, bit_depth, color_type, is_interlaced: false }
}

/// A PNG with the given chunks before the image data, and `raw` (filter
/// bytes included) compressed into one IDAT.
pub fn png_from_raw(ihdr: &IHDR, before_idat: &[(ChunkType, &[u8])], raw: &[u8], level: u8) -> Vec<u8> {
  let mut png = PNG_SIGNATURE.to_vec();
  write_chunk(&mut png, ChunkType::IHDR, &ihdr.to_bytes());
  for (t, data) in before_idat {
    write_chunk(&mut png, *t, data);
  }
  write_chunk(&mut png, ChunkType::IDAT, &miniz_oxide::deflate::compress_to_vec_zlib(raw, level));
  write_chunk(&mut png, ChunkType::IEND, &[]);
  png
}

/// Feeds `png` in pieces of `size` bytes, after `setup`.
pub fn feed_in_pieces(
  png: &[u8], size: usize, setup: impl FnOnce(&mut ReadSession<Collect>),
) -> Result<Collect, PngError> {
  let mut session = ReadSession::new(Collect::default());
  setup(&mut session);
  for piece in png.chunks(size) {
    assert_eq!(session.feed(piece)?, 0);
  }
  Ok(session.into_handler())
}
