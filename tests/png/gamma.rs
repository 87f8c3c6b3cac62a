use pngflow::{
  chunk::ChunkType,
  ihdr::PngColorType,
  sample::{gamma_16bit_correct, gamma_8bit_correct, gamma_correction, FP_1, GAMMA_THRESHOLD},
};

use super::{feed_in_pieces, ihdr, png_from_raw};

const GAMMAS: [i32; 6] = [30_000, 45_455, 50_000, 150_000, 220_000, 300_000];

fn exact(value: f64, max: f64, gamma: i32) -> f64 {
  (value / max).powf(f64::from(gamma) / f64::from(FP_1)) * max
}

#[test]
fn gamma_8bit_correct_is_close_to_powf() {
  for g in GAMMAS {
    for v in 0..=255_u8 {
      let want = exact(f64::from(v), 255.0, g);
      let got = f64::from(gamma_8bit_correct(v, g));
      assert!((got - want).abs() <= 1.0, "{v}^{g}: got {got}, want {want}");
    }
  }
}

#[test]
fn gamma_16bit_correct_is_close_to_powf() {
  for g in GAMMAS {
    for v in (0..=u16::MAX).step_by(97).chain([1, 2, u16::MAX - 1, u16::MAX]) {
      let want = exact(f64::from(v), 65535.0, g);
      let got = f64::from(gamma_16bit_correct(v, g));
      assert!((got - want).abs() <= 2.0 + want / 2048.0, "{v}^{g}: got {got}, want {want}");
    }
  }
}

#[test]
fn gamma_end_points_are_fixed() {
  for g in GAMMAS {
    assert_eq!(gamma_8bit_correct(0, g), 0);
    assert_eq!(gamma_8bit_correct(255, g), 255);
    assert_eq!(gamma_16bit_correct(0, g), 0);
    assert_eq!(gamma_16bit_correct(u16::MAX, g), u16::MAX);
  }
}

#[test]
fn gray_rows_are_gamma_corrected_to_the_screen() {
  let ihdr = ihdr(PngColorType::Y, 8, 256, 1);
  let mut raw = vec![0];
  raw.extend(0..=255_u8);
  let gama = 45_455_u32.to_be_bytes();
  let png = png_from_raw(&ihdr, &[(ChunkType(*b"gAMA"), &gama)], &raw, 6);

  // a linear screen
  let c = gamma_correction(45_455, FP_1, 8, GAMMA_THRESHOLD).unwrap();
  let out = feed_in_pieces(&png, 100, |s| s.set_gamma(FP_1, 0)).unwrap();
  let row = &out.rows[0].2;
  for v in 0..=255_u8 {
    assert_eq!(row[usize::from(v)], gamma_8bit_correct(v, c), "sample {v}");
  }
  // mid gray darkens when linearized
  assert!(row[128] < 64);

  // a screen matching the file changes nothing
  let out = feed_in_pieces(&png, 100, |s| s.set_gamma(220_000, 0)).unwrap();
  assert_eq!(&out.rows[0].2, &raw[1..]);
}

#[test]
fn file_gamma_argument_sets_the_file_gamma() {
  let ihdr = ihdr(PngColorType::Y, 8, 3, 1);
  let png = png_from_raw(&ihdr, &[], &[0, 0, 100, 255], 6);
  let c = gamma_correction(45_455, FP_1, 8, GAMMA_THRESHOLD).unwrap();
  let out = feed_in_pieces(&png, 7, |s| s.set_gamma(FP_1, 45_455)).unwrap();
  assert_eq!(out.rows[0].2, vec![0, gamma_8bit_correct(100, c), 255]);

  // it replaces the gAMA the file has
  let gama = 100_000_u32.to_be_bytes();
  let png = png_from_raw(&ihdr, &[(ChunkType(*b"gAMA"), &gama)], &[0, 0, 100, 255], 6);
  let out = feed_in_pieces(&png, 7, |s| s.set_gamma(FP_1, 45_455)).unwrap();
  assert_eq!(out.info.unwrap().gamma, 45_455);
  assert_eq!(out.rows[0].2, vec![0, gamma_8bit_correct(100, c), 255]);
}

#[test]
fn bad_file_gamma_still_sets_the_screen() {
  // 1/2.2 data on a 2.0 screen
  let gama = 45_455_u32.to_be_bytes();
  let c = gamma_correction(45_455, 50_000, 8, GAMMA_THRESHOLD).unwrap();
  let png = png_from_raw(&ihdr(PngColorType::Y, 8, 1, 1), &[(ChunkType(*b"gAMA"), &gama)], &[0, 100], 6);
  let out = feed_in_pieces(&png, 7, |s| s.set_gamma(200_000, 0)).unwrap();
  assert_eq!(out.app_errors, vec![pngflow::AppError::FileGammaTooLow]);
  assert_eq!(out.info.as_ref().unwrap().gamma, 45_455);
  assert_eq!(out.rows[0].2, vec![gamma_8bit_correct(100, c)]);
  assert_ne!(out.rows[0].2, vec![100]);

  let png = png_from_raw(&ihdr(PngColorType::Y, 16, 1, 1), &[(ChunkType(*b"gAMA"), &gama)], &[0, 100, 0], 6);
  let out = feed_in_pieces(&png, 7, |s| s.set_gamma(200_000, 0)).unwrap();
  assert_eq!(out.app_errors, vec![pngflow::AppError::FileGammaTooLow]);
  assert_eq!(out.rows[0].2, gamma_16bit_correct(100 << 8, c).to_be_bytes().to_vec());

  // without any file gamma there is nothing to correct from
  let png = png_from_raw(&ihdr(PngColorType::Y, 8, 1, 1), &[], &[0, 100], 6);
  let out = feed_in_pieces(&png, 7, |s| s.set_gamma(200_000, 0)).unwrap();
  assert_eq!(out.rows[0].2, vec![100]);
}
