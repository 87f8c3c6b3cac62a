use crate::interlace::reduced_image_dimensions;

/// The types of color that PNG supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PngColorType {
  /// Greyscale
  Y = 0,
  /// Red, Green, Blue
  RGB = 2,
  /// Index into a palette.
  ///
  /// The palette will have RGB8 data. There may optionally be a transparency
  /// chunk.
  Index = 3,
  /// Greyscale + Alpha
  YA = 4,
  /// Red, Green, Blue, Alpha
  RGBA = 6,
}
impl PngColorType {
  /// The number of channels in this type of color.
  #[inline]
  #[must_use]
  pub const fn channel_count(self) -> usize {
    match self {
      Self::Y => 1,
      Self::RGB => 3,
      Self::Index => 1,
      Self::YA => 2,
      Self::RGBA => 4,
    }
  }
  #[inline]
  #[must_use]
  pub const fn has_color(self) -> bool {
    matches!(self, Self::RGB | Self::Index | Self::RGBA)
  }
  #[inline]
  #[must_use]
  pub const fn has_alpha(self) -> bool {
    matches!(self, Self::YA | Self::RGBA)
  }
}
impl TryFrom<u8> for PngColorType {
  type Error = ();
  #[inline]
  fn try_from(value: u8) -> Result<Self, Self::Error> {
    Ok(match value {
      0 => PngColorType::Y,
      2 => PngColorType::RGB,
      3 => PngColorType::Index,
      4 => PngColorType::YA,
      6 => PngColorType::RGBA,
      _ => return Err(()),
    })
  }
}

/// Image Header
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IHDR {
  /// width in pixels
  pub width: u32,
  /// height in pixels
  pub height: u32,
  /// bits per channel
  pub bit_depth: u8,
  /// pixel color type
  pub color_type: PngColorType,
  /// if the image data is stored interlaced.
  pub is_interlaced: bool,
}
impl IHDR {
  /// Bits per pixel of the stored data.
  #[inline]
  #[must_use]
  pub const fn bits_per_pixel(&self) -> usize {
    (self.bit_depth as usize) * self.color_type.channel_count()
  }

  /// Bytes of pixel data in one stored row of `width` pixels (no filter byte).
  #[inline]
  #[must_use]
  pub const fn bytes_per_scanline(&self, width: u32) -> usize {
    // When pixels are less than 8 bits it's possible to end up with partial
    // bytes on the end, so we must round up.
    ((self.bits_per_pixel() * (width as usize)) + 7) / 8
  }

  /// The filter operates on whole pixels for 8 bits and over, and on whole
  /// bytes below that.
  #[inline]
  #[must_use]
  pub const fn filter_chunk_size(&self) -> usize {
    let bpp = self.bits_per_pixel();
    if bpp < 8 {
      1
    } else {
      bpp / 8
    }
  }

  /// The total filtered (decompressed) byte count of the image.
  #[must_use]
  pub fn zlib_data_len(&self) -> usize {
    let per_image = |w: u32, h: u32| -> usize {
      if w == 0 || h == 0 {
        0
      } else {
        (self.bytes_per_scanline(w) + 1).saturating_mul(h as usize)
      }
    };
    if self.is_interlaced {
      reduced_image_dimensions(self.width, self.height)[1..]
        .iter()
        .fold(0_usize, |total, &(w, h)| total.saturating_add(per_image(w, h)))
    } else {
      per_image(self.width, self.height)
    }
  }

  /// Serializes the 13 byte chunk payload.
  #[inline]
  #[must_use]
  pub fn to_bytes(&self) -> [u8; 13] {
    let [w0, w1, w2, w3] = self.width.to_be_bytes();
    let [h0, h1, h2, h3] = self.height.to_be_bytes();
    [
      w0,
      w1,
      w2,
      w3,
      h0,
      h1,
      h2,
      h3,
      self.bit_depth,
      self.color_type as u8,
      0,
      0,
      self.is_interlaced as u8,
    ]
  }
}
impl TryFrom<&[u8]> for IHDR {
  type Error = ();
  fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
    match value {
      [w0, w1, w2, w3, h0, h1, h2, h3, bit_depth, color_type, compression_method, filter_method, interlace_method] =>
      {
        if *compression_method != 0 || *filter_method != 0 {
          return Err(());
        }
        let width = u32::from_be_bytes([*w0, *w1, *w2, *w3]);
        let height = u32::from_be_bytes([*h0, *h1, *h2, *h3]);
        if width == 0 || height == 0 || width > 0x7FFF_FFFF || height > 0x7FFF_FFFF {
          return Err(());
        }
        Ok(Self {
          width,
          height,
          bit_depth: match *color_type {
            0 if [1, 2, 4, 8, 16].contains(bit_depth) => *bit_depth,
            2 if [8, 16].contains(bit_depth) => *bit_depth,
            3 if [1, 2, 4, 8].contains(bit_depth) => *bit_depth,
            4 if [8, 16].contains(bit_depth) => *bit_depth,
            6 if [8, 16].contains(bit_depth) => *bit_depth,
            _ => return Err(()),
          },
          color_type: PngColorType::try_from(*color_type)?,
          is_interlaced: match interlace_method {
            0 => false,
            1 => true,
            _ => return Err(()),
          },
        })
      }
      _ => Err(()),
    }
  }
}

#[test]
fn test_ihdr_parse() {
  let ok = [0, 0, 0, 3, 0, 0, 0, 2, 4, 3, 0, 0, 1];
  let ihdr = IHDR::try_from(&ok[..]).unwrap();
  assert_eq!(ihdr.width, 3);
  assert_eq!(ihdr.height, 2);
  assert_eq!(ihdr.color_type, PngColorType::Index);
  assert!(ihdr.is_interlaced);
  assert_eq!(ihdr.to_bytes(), ok);
  // 4-bit RGB is not a legal pairing
  let bad = [0, 0, 0, 3, 0, 0, 0, 2, 4, 2, 0, 0, 0];
  assert!(IHDR::try_from(&bad[..]).is_err());
  // zero width
  let bad = [0, 0, 0, 0, 0, 0, 0, 2, 8, 0, 0, 0, 0];
  assert!(IHDR::try_from(&bad[..]).is_err());
  assert!(IHDR::try_from(&ok[..12]).is_err());
}

#[test]
fn test_zlib_data_len() {
  let ihdr = IHDR { width: 3, height: 2, bit_depth: 1, color_type: PngColorType::Y, is_interlaced: false };
  assert_eq!(ihdr.zlib_data_len(), 4);
  let ihdr = IHDR { width: 8, height: 8, bit_depth: 8, color_type: PngColorType::RGB, is_interlaced: true };
  // passes: 1x1, 1x1, 2x1, 2x2, 4x2, 4x4, 8x4
  let expected = (1 + 3) + (1 + 3) + (1 + 6) + 2 * (1 + 6) + 2 * (1 + 12) + 4 * (1 + 12) + 4 * (1 + 24);
  assert_eq!(ihdr.zlib_data_len(), expected);
}
