use pngflow::{
  chunks::RGB8,
  config::{EncoderConfig, FilterChoice},
  decode::{decode_to_vec, ImageCollector},
  ihdr::{PngColorType, IHDR},
  DecodedImage, FillerPosition, PngWriter, ReadSession, TrueBits,
};

fn encode(ihdr: IHDR, config: EncoderConfig, pixels: &[u8], setup: impl FnOnce(&mut PngWriter)) -> Vec<u8> {
  let mut w = PngWriter::new(ihdr, config).unwrap();
  if ihdr.color_type == PngColorType::Index {
    let palette: Vec<RGB8> = (0..1_u32 << ihdr.bit_depth).map(|i| RGB8::new(i as u8, !i as u8, 7)).collect();
    w.set_palette(&palette);
  }
  setup(&mut w);
  w.write_image(pixels).unwrap();
  assert!(w.app_errors().is_empty());
  w.finish().unwrap()
}

fn decode(png: &[u8], setup: impl FnOnce(&mut ReadSession<ImageCollector>)) -> DecodedImage {
  let image = decode_to_vec(png, setup).unwrap();
  assert_eq!(image.warnings, vec![]);
  assert_eq!(image.app_errors, vec![]);
  image
}

fn check_plain(color_type: PngColorType, bit_depth: u8, width: u32, height: u32) {
  let ihdr = IHDR { width, height, bit_depth, color_type, is_interlaced: false };
  let pixels = crate::rand_bytes(ihdr.bytes_per_scanline(width) * height as usize);
  for interlace in [false, true] {
    for filter in [FilterChoice::Adaptive, FilterChoice::Fixed(0), FilterChoice::Fixed(4)] {
      let config = EncoderConfig::default().with_interlace(interlace).with_filter(filter);
      let png = encode(ihdr, config, &pixels, |_| ());
      let image = decode(&png, |_| ());
      assert_eq!(image.info.ihdr.is_interlaced, interlace);
      assert_eq!(image.pixels, pixels, "{color_type:?} {bit_depth} interlace {interlace} {filter:?}");
    }
  }
}

#[test]
fn round_trip_every_format() {
  for depth in [1, 2, 4, 8, 16] {
    check_plain(PngColorType::Y, depth, 16, 11);
  }
  for depth in [8, 16] {
    check_plain(PngColorType::YA, depth, 9, 7);
    check_plain(PngColorType::RGB, depth, 9, 7);
    check_plain(PngColorType::RGBA, depth, 9, 7);
  }
  for depth in [1, 2, 4, 8] {
    check_plain(PngColorType::Index, depth, 16, 5);
  }
}

#[test]
fn round_trip_tiny_interlaced() {
  // images smaller than the first pass block leave passes empty
  for (w, h) in [(1, 1), (1, 5), (3, 2), (5, 1)] {
    check_plain(PngColorType::RGB, 8, w, h);
  }
}

#[test]
fn round_trip_packing() {
  let ihdr = IHDR { width: 10, height: 3, bit_depth: 2, color_type: PngColorType::Y, is_interlaced: false };
  let pixels: Vec<u8> = (0..30).map(|i| i % 4).collect();
  let png = encode(ihdr, EncoderConfig::default(), &pixels, |w| w.set_packing());
  let image = decode(&png, |s| s.set_packing());
  assert_eq!(image.pixels, pixels);

  // packswap with packing only changes the stored order
  let png = encode(ihdr, EncoderConfig::default(), &pixels, |w| {
    w.set_packing();
    w.set_packswap();
  });
  let image = decode(&png, |s| s.set_packing());
  assert_eq!(image.pixels, pixels);
}

#[test]
fn round_trip_channel_order() {
  let ihdr = IHDR { width: 5, height: 4, bit_depth: 8, color_type: PngColorType::RGBA, is_interlaced: false };
  let pixels = crate::rand_bytes(5 * 4 * 4);
  let png = encode(ihdr, EncoderConfig::default(), &pixels, |w| {
    w.set_bgr();
    w.set_swap_alpha();
  });
  let image = decode(&png, |s| {
    s.set_bgr();
    s.set_swap_alpha();
  });
  assert_eq!(image.pixels, pixels);

  // read without the transforms: ARGB/BGR -> RGBA
  let plain = decode(&png, |_| ());
  for (argb, rgba) in pixels.chunks(4).zip(plain.pixels.chunks(4)) {
    assert_eq!(rgba, &[argb[3], argb[2], argb[1], argb[0]]);
  }
}

#[test]
fn round_trip_swap_16() {
  let ihdr = IHDR { width: 6, height: 2, bit_depth: 16, color_type: PngColorType::RGB, is_interlaced: true };
  let pixels = crate::rand_bytes(6 * 2 * 6);
  let config = EncoderConfig::default().with_interlace(true);
  let png = encode(ihdr, config, &pixels, |w| w.set_swap());
  let image = decode(&png, |s| s.set_swap());
  assert_eq!(image.pixels, pixels);
  let plain = decode(&png, |_| ());
  assert_eq!(plain.pixels[0], pixels[1]);
  assert_eq!(plain.pixels[1], pixels[0]);
}

#[test]
fn round_trip_inversion() {
  let ihdr = IHDR { width: 4, height: 2, bit_depth: 8, color_type: PngColorType::YA, is_interlaced: false };
  let pixels = crate::rand_bytes(4 * 2 * 2);
  let png = encode(ihdr, EncoderConfig::default(), &pixels, |w| {
    w.set_invert_mono();
    w.set_invert_alpha();
  });
  let image = decode(&png, |s| {
    s.set_invert_mono();
    s.set_invert_alpha();
  });
  assert_eq!(image.pixels, pixels);
  let plain = decode(&png, |_| ());
  let inverted: Vec<u8> = pixels.iter().map(|b| !b).collect();
  assert_eq!(plain.pixels, inverted);
}

#[test]
fn round_trip_filler() {
  let ihdr = IHDR { width: 3, height: 3, bit_depth: 8, color_type: PngColorType::RGB, is_interlaced: false };
  let mut pixels = crate::rand_bytes(3 * 3 * 4);
  let png = encode(ihdr, EncoderConfig::default(), &pixels, |w| w.set_filler(FillerPosition::After));
  let image = decode(&png, |s| s.set_filler(0xFF, FillerPosition::After));
  for p in pixels.chunks_mut(4) {
    p[3] = 0xFF;
  }
  assert_eq!(image.pixels, pixels);
  assert_eq!(decode(&png, |_| ()).pixels.len(), 3 * 3 * 3);
}

#[test]
fn round_trip_shift() {
  let ihdr = IHDR { width: 4, height: 4, bit_depth: 8, color_type: PngColorType::RGB, is_interlaced: false };
  let bits = TrueBits { red: 5, green: 6, blue: 5, ..TrueBits::default() };
  let pixels: Vec<u8> = crate::rand_bytes(4 * 4 * 3)
    .iter()
    .enumerate()
    .map(|(i, b)| if i % 3 == 1 { b & 63 } else { b & 31 })
    .collect();
  let png = encode(ihdr, EncoderConfig::default(), &pixels, |w| {
    w.set_sbit(bits);
    w.set_shift(bits);
  });
  let image = decode(&png, |s| s.set_shift(bits));
  assert_eq!(image.pixels, pixels);

  // stored values are scaled up to the full range
  let plain = decode(&png, |_| ());
  assert_eq!(plain.pixels[0] >> 3, pixels[0]);
}

#[test]
fn writer_refuses_late_transforms() {
  let ihdr = IHDR { width: 1, height: 2, bit_depth: 8, color_type: PngColorType::Y, is_interlaced: false };
  let mut w = PngWriter::new(ihdr, EncoderConfig::default()).unwrap();
  w.write_row(&[1]).unwrap();
  w.set_invert_mono();
  assert_eq!(w.app_errors(), &[pngflow::AppError::LateTransform]);
  w.write_row(&[2]).unwrap();
  let image = decode(&w.finish().unwrap(), |_| ());
  assert_eq!(image.pixels, vec![1, 2]);
}
