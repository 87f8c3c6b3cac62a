use pngflow::{
  chunk::ChunkType,
  config::{CrcAction, DecoderConfig},
  ihdr::PngColorType,
  row::RowFormat,
  sample::GAMMA_FLAG_SRGB,
  AlphaMode, AppError, ErrorAction, FillerPosition, PngError, ReadSession, WarningKind,
};

use super::{feed_in_pieces, ihdr, png_from_raw, Collect};

fn row_of(png: &[u8], setup: impl FnOnce(&mut ReadSession<Collect>)) -> Vec<u8> {
  feed_in_pieces(png, 9, setup).unwrap().rows.remove(0).2
}

#[test]
fn test_alpha_channel_setters() {
  let ya = png_from_raw(&ihdr(PngColorType::YA, 8, 2, 1), &[], &[0, 10, 255, 99, 0], 6);
  assert_eq!(row_of(&ya, |s| s.set_strip_alpha()), vec![10, 99]);
  assert_eq!(row_of(&ya, |s| s.set_swap_alpha()), vec![255, 10, 0, 99]);
  assert_eq!(row_of(&ya, |s| s.set_invert_alpha()), vec![10, 0, 99, 255]);

  let gray = png_from_raw(&ihdr(PngColorType::Y, 8, 2, 1), &[(ChunkType::tRNS, &[0, 5])], &[0, 5, 7], 6);
  assert_eq!(row_of(&gray, |s| s.set_trns_to_alpha()), vec![5, 0, 7, 255]);

  let rgb = png_from_raw(&ihdr(PngColorType::RGB, 8, 1, 1), &[], &[0, 1, 2, 3], 6);
  let got = feed_in_pieces(&rgb, 4, |s| s.set_add_alpha(0xFF, FillerPosition::Before)).unwrap();
  assert_eq!(got.rows[0].2, vec![0xFF, 1, 2, 3]);
  let output = got.info.unwrap().output;
  assert!(output.format.contains(RowFormat::ALPHA | RowFormat::AFIRST));
  assert!(!output.format.contains(RowFormat::AFILLER));
  let got = feed_in_pieces(&rgb, 4, |s| s.set_filler(0x77, FillerPosition::After)).unwrap();
  assert_eq!(got.rows[0].2, vec![1, 2, 3, 0x77]);
  assert!(got.info.unwrap().output.format.contains(RowFormat::AFILLER));
}

#[test]
fn test_expansion_setters() {
  let plte = [10, 20, 30, 40, 50, 60];
  let index = png_from_raw(&ihdr(PngColorType::Index, 8, 2, 1), &[(ChunkType::PLTE, &plte)], &[0, 1, 0], 6);
  assert_eq!(row_of(&index, |s| s.set_palette_to_rgb()), vec![40, 50, 60, 10, 20, 30]);

  let gray = png_from_raw(&ihdr(PngColorType::Y, 2, 4, 1), &[], &[0, 0b00_01_10_11], 6);
  assert_eq!(row_of(&gray, |s| s.set_expand_gray_1_2_4_to_8()), vec![0, 85, 170, 255]);
  assert_eq!(row_of(&gray, |s| s.set_gray_to_rgb())[3..6], [85, 85, 85]);

  let gray = png_from_raw(&ihdr(PngColorType::Y, 8, 1, 1), &[], &[0, 0x12], 6);
  assert_eq!(row_of(&gray, |s| s.set_expand_16()), vec![0x12, 0x12]);
}

#[test]
fn test_16_bit_reduction() {
  let png = png_from_raw(&ihdr(PngColorType::Y, 16, 1, 1), &[], &[0, 0x00, 0xFF], 6);
  assert_eq!(row_of(&png, |s| s.set_scale_16()), vec![1]);
  assert_eq!(row_of(&png, |s| s.set_strip_16()), vec![0]);
  assert_eq!(row_of(&png, |s| s.set_swap()), vec![0xFF, 0x00]);
}

#[test]
fn test_rgb_to_gray() {
  let png = png_from_raw(&ihdr(PngColorType::RGB, 8, 2, 1), &[], &[0, 50, 50, 50, 90, 90, 90], 6);
  let mut s = ReadSession::new(Collect::default());
  s.set_rgb_to_gray(ErrorAction::Warn, None);
  s.feed(&png).unwrap();
  assert!(!s.rgb_to_gray_status());
  let got = s.into_handler();
  let row = &got.rows[0].2;
  assert_eq!(row.len(), 2);
  assert!(row[0].abs_diff(50) <= 1 && row[1].abs_diff(90) <= 1, "{row:?}");
  assert!(got.warnings.is_empty());

  let colored = png_from_raw(&ihdr(PngColorType::RGB, 8, 1, 1), &[], &[0, 200, 10, 10], 6);
  let mut s = ReadSession::new(Collect::default());
  s.set_rgb_to_gray(ErrorAction::Warn, Some((30_000, 59_000)));
  s.feed(&colored).unwrap();
  assert!(s.rgb_to_gray_status());
  let kinds: Vec<_> = s.handler().warnings.iter().map(|w| w.kind).collect();
  assert_eq!(kinds, vec![WarningKind::NonGrayPixel]);

  let got = feed_in_pieces(&colored, 100, |s| s.set_rgb_to_gray(ErrorAction::Error, None));
  assert_eq!(got.err(), Some(PngError::NonGrayPixel));

  let got = feed_in_pieces(&colored, 100, |s| s.set_rgb_to_gray(ErrorAction::None, Some((80_000, 30_000)))).unwrap();
  assert_eq!(got.app_errors, vec![AppError::RgbToGrayCoefficients]);
  assert!(got.warnings.is_empty());
  assert_eq!(got.rows[0].2.len(), 1);
}

#[test]
fn test_associated_alpha() {
  let png = png_from_raw(&ihdr(PngColorType::YA, 8, 2, 1), &[], &[0, 255, 255, 200, 0], 6);
  let got = feed_in_pieces(&png, 3, |s| s.set_alpha_mode(AlphaMode::Associated, GAMMA_FLAG_SRGB)).unwrap();
  assert_eq!(got.rows[0].2, vec![255, 255, 0, 0]);
  assert!(got.info.unwrap().output.format.contains(RowFormat::ALPHA));
}

#[test]
fn test_decoder_limits() {
  let png = png_from_raw(&ihdr(PngColorType::Y, 8, 4, 4), &[(ChunkType(*b"tEXt"), b"Title\0hello")], &[0; 20], 6);
  let run = |config: DecoderConfig| {
    let mut s = ReadSession::with_config(Collect::default(), config);
    s.feed(&png).map(|_| s.into_handler())
  };
  assert_eq!(run(DecoderConfig::default().with_max_dimensions(3, 100)).err(), Some(PngError::DimensionsTooLarge));
  assert_eq!(run(DecoderConfig::default().with_max_chunk_len(8)).err(), Some(PngError::ChunkTooLarge));
  // the image data isn't held to the chunk limit
  assert!(run(DecoderConfig::default().with_max_chunk_len(13)).is_ok());

  // damage the adler32 checksum at the end of the zlib stream, and patch
  // the IDAT CRC to match
  let mut damaged = png.clone();
  let idat_type = 8 + 25 + 23 + 4;
  let idat_crc = damaged.len() - 12 - 4;
  damaged[idat_crc - 1] ^= 1;
  let crc = crc_of(&damaged[idat_type..idat_crc]);
  damaged[idat_crc..idat_crc + 4].copy_from_slice(&crc.to_be_bytes());

  let config = DecoderConfig::default().with_crc_actions(CrcAction::Error, CrcAction::Error);
  let mut s = ReadSession::with_config(Collect::default(), config.with_check_adler32(false));
  s.feed(&damaged).unwrap();
  assert!(s.handler().warnings.is_empty());
  let mut s = ReadSession::with_config(Collect::default(), config);
  s.feed(&damaged).unwrap();
  assert_eq!(s.handler().warnings.len(), 1);
  assert_eq!(s.handler().warnings[0].kind, WarningKind::Inflate);
}

#[test]
fn test_gamma_threshold() {
  // 1/2.2 against a 1/2.0 screen is a 10% change
  let gama = 45_455_u32.to_be_bytes();
  let png = png_from_raw(&ihdr(PngColorType::Y, 8, 1, 1), &[(ChunkType::gAMA, &gama)], &[0, 100], 6);
  let run = |threshold: i32| {
    let mut s = ReadSession::with_config(Collect::default(), DecoderConfig::default().with_gamma_threshold(threshold));
    s.set_gamma(200_000, 0);
    s.feed(&png).unwrap();
    s.into_handler().rows.remove(0).2
  };
  assert_ne!(run(5_000), vec![100]);
  assert_eq!(run(20_000), vec![100]);
}

/// The CRC of a chunk's type and data.
fn crc_of(type_and_data: &[u8]) -> u32 {
  let mut png = Vec::new();
  pngflow::chunk::write_chunk(&mut png, ChunkType(type_and_data[..4].try_into().unwrap()), &type_and_data[4..]);
  u32::from_be_bytes(png[png.len() - 4..].try_into().unwrap())
}
