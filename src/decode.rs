//! Whole-image decoding on top of the push reader.

use alloc::vec::Vec;

use crate::{
  error::{AppError, PngError, PngWarning},
  info::ImageInfo,
  interlace::combine_row,
  push::{Control, PushHandler, ReadSession},
};

/// A decoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
  /// `info.output` describes the rows of `pixels`.
  pub info: ImageInfo,
  /// Every output row, top to bottom, without padding between rows.
  pub pixels: Vec<u8>,
  pub warnings: Vec<PngWarning>,
  pub app_errors: Vec<AppError>,
}

/// Collects the rows of a [`ReadSession`] into one buffer.
#[derive(Debug, Default)]
pub struct ImageCollector {
  info: Option<ImageInfo>,
  pixels: Vec<u8>,
  warnings: Vec<PngWarning>,
  app_errors: Vec<AppError>,
  alloc_failed: bool,
}
impl PushHandler for ImageCollector {
  fn info(&mut self, info: &ImageInfo, _: &mut Control) {
    let len = info.output_row_bytes() * info.ihdr.height as usize;
    if self.pixels.try_reserve(len).is_err() {
      self.alloc_failed = true;
    } else {
      self.pixels.resize(len, 0);
    }
    self.info = Some(info.clone());
  }

  fn row(&mut self, row: &[u8], row_number: u32, pass: u8, _: &mut Control) {
    let Some(info) = &self.info else { return };
    if self.alloc_failed {
      return;
    }
    let row_bytes = info.output_row_bytes();
    let start = row_number as usize * row_bytes;
    let Some(image_row) = self.pixels.get_mut(start..start + row_bytes) else { return };
    if info.ihdr.is_interlaced {
      let bits = info.output.pixel_depth() as usize;
      combine_row(image_row, row, usize::from(pass), info.ihdr.width, bits);
    } else {
      image_row.copy_from_slice(row);
    }
  }

  fn warning(&mut self, warning: &PngWarning) {
    self.warnings.push(warning.clone());
  }

  fn app_error(&mut self, error: &AppError) {
    self.app_errors.push(*error);
  }
}

/// Decodes a whole PNG held in memory.
///
/// `setup` registers transforms on the session before any data is read.
/// Interlaced images are always delivered as whole rows.
///
/// ```
/// # use pngflow::decode::decode_to_vec;
/// let result = decode_to_vec(b"not a png", |_| ());
/// assert!(result.is_err());
/// ```
pub fn decode_to_vec(
  png: &[u8], setup: impl FnOnce(&mut ReadSession<ImageCollector>),
) -> Result<DecodedImage, PngError> {
  let mut session = ReadSession::new(ImageCollector::default());
  session.set_interlace_handling();
  setup(&mut session);
  session.feed(png)?;
  session.finish()?;
  let collector = session.into_handler();
  if collector.alloc_failed {
    return Err(PngError::Alloc);
  }
  let info = collector.info.ok_or(PngError::UnexpectedEnd)?;
  Ok(DecodedImage { info, pixels: collector.pixels, warnings: collector.warnings, app_errors: collector.app_errors })
}
