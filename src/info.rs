//! The image information a session hands to its handler.

use alloc::vec::Vec;

use crate::{
  chunks::{bKGD, tRNS, RGB8},
  ihdr::{PngColorType, IHDR},
  row::RowDescriptor,
};

/// The header, the chunk values the transforms use, and the output format.
///
/// Before the transform chain is initialized `output` describes the stored
/// data. Afterwards it describes the rows the handler receives, and `palette`
/// and `trns` hold the transformed palette when the chain rewrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
  pub ihdr: IHDR,
  pub palette: Vec<RGB8>,
  pub trns: Option<tRNS>,
  pub background: Option<bKGD>,
  /// `[r, g, b, a]` significant bits from sBIT.
  pub sbit: Option<[u8; 4]>,
  /// The file's encoding gamma, 0 if unknown.
  pub gamma: i32,
  /// The format of the rows handed to the handler.
  pub output: RowDescriptor,
  /// The palette was rewritten by the transform chain.
  pub palette_updated: bool,
  /// The palette's tRNS holds only fully opaque and fully transparent entries,
  /// and at least one transparent one.
  pub transparent_palette: bool,
  /// The widest pixel, in bits, at any point of the transform chain.
  pub max_pixel_depth: u32,
}
impl ImageInfo {
  /// Info for an image with no ancillary chunks yet.
  #[must_use]
  pub fn new(ihdr: IHDR) -> Self {
    Self {
      ihdr,
      palette: Vec::new(),
      trns: None,
      background: None,
      sbit: None,
      gamma: 0,
      output: RowDescriptor::for_image(&ihdr, None, 0),
      palette_updated: false,
      transparent_palette: false,
      max_pixel_depth: ihdr.bits_per_pixel() as u32,
    }
  }

  /// The number of tRNS entries: palette alphas, or 1 for a single gray or
  /// RGB value.
  #[inline]
  #[must_use]
  pub fn num_trans(&self) -> usize {
    match &self.trns {
      Some(tRNS::Index(alphas)) => alphas.len(),
      Some(_) => 1,
      None => 0,
    }
  }

  /// Bytes in one output row of the full image width.
  #[inline]
  #[must_use]
  pub fn output_row_bytes(&self) -> usize {
    self.output.row_bytes()
  }

  /// The descriptor of the stored rows with this info's sBIT and gamma.
  #[inline]
  #[must_use]
  pub fn image_descriptor(&self) -> RowDescriptor {
    RowDescriptor::for_image(&self.ihdr, self.sbit, self.gamma)
  }

  /// Works out [`transparent_palette`](Self::transparent_palette).
  pub(crate) fn check_trns_for_alpha(&mut self) {
    self.transparent_palette = match (&self.trns, self.ihdr.color_type) {
      (Some(tRNS::Index(alphas)), PngColorType::Index) => {
        alphas.iter().all(|&a| a == 0 || a == 255) && alphas.iter().any(|&a| a == 0)
      }
      _ => false,
    };
  }

  /// Palette alpha of entry `i`; entries past the tRNS data are opaque.
  #[inline]
  #[must_use]
  pub(crate) fn palette_alpha(&self, i: usize) -> u8 {
    match &self.trns {
      Some(tRNS::Index(alphas)) => alphas.get(i).copied().unwrap_or(255),
      _ => 255,
    }
  }
}
