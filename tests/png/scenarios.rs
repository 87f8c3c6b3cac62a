use pngflow::{chunk::ChunkType, ihdr::PngColorType, row::RowFormat, PngError, WarningKind};

use super::{feed_in_pieces, ihdr, png_from_raw};

#[test]
fn test_one_gray_pixel_one_call_or_bytewise() {
  let png = png_from_raw(&ihdr(PngColorType::Y, 8, 1, 1), &[], &[0x00, 0x00], 6);
  let whole = feed_in_pieces(&png, png.len(), |_| ()).unwrap();
  let bytewise = feed_in_pieces(&png, 1, |_| ()).unwrap();
  assert_eq!(whole.rows, vec![(0, 0, vec![0x00])]);
  assert_eq!(bytewise, whole);
  assert!(whole.ended);
  assert!(whole.warnings.is_empty());
}

#[test]
fn test_palette_with_trns_to_rgba() {
  let plte = [10, 20, 30, 40, 50, 60];
  for depth in [1, 2, 4, 8] {
    // row 0 is indexes 0 1, row 1 is 1 0
    let raw: Vec<u8> = if depth == 8 {
      vec![0, 0, 1, 0, 1, 0]
    } else {
      vec![0, 1 << (8 - 2 * depth), 0, 1 << (8 - depth)]
    };
    let png = png_from_raw(
      &ihdr(PngColorType::Index, depth, 2, 2),
      &[(ChunkType::PLTE, &plte), (ChunkType::tRNS, &[0])],
      &raw,
      6,
    );
    let got = feed_in_pieces(&png, 7, |s| s.set_expand()).unwrap();
    let info = got.info.unwrap();
    assert_eq!(info.output.bit_depth, 8);
    assert!(info.output.format.contains(RowFormat::COLOR | RowFormat::ALPHA));
    assert!(!info.output.format.contains(RowFormat::COLORMAP));
    assert_eq!(
      got.rows,
      vec![
        (0, 0, vec![10, 20, 30, 0, 40, 50, 60, 255]),
        (1, 0, vec![40, 50, 60, 255, 10, 20, 30, 0]),
      ],
      "depth {depth}"
    );
  }
}

#[test]
fn test_matching_gamma_is_a_no_op() {
  // gAMA of 1/2.2, and a 2.2 display
  let gama = 45455_u32.to_be_bytes();
  let png = png_from_raw(&ihdr(PngColorType::Y, 16, 1, 1), &[(ChunkType::gAMA, &gama)], &[0, 0x12, 0x34], 6);

  let plain = feed_in_pieces(&png, 64, |_| ()).unwrap();
  let gamma = feed_in_pieces(&png, 64, |s| s.set_gamma(220_000, 45455)).unwrap();
  assert_eq!(gamma.rows, plain.rows);
  assert_eq!(gamma.rows[0].2, vec![0x12, 0x34]);

  let plain = feed_in_pieces(&png, 64, |s| s.set_strip_16()).unwrap();
  let gamma = feed_in_pieces(&png, 64, |s| {
    s.set_gamma(220_000, 45455);
    s.set_strip_16();
  })
  .unwrap();
  assert_eq!(gamma.rows, plain.rows);
  assert_eq!(gamma.rows[0].2, vec![0x12]);
  assert_eq!(gamma.info.unwrap().output.bit_depth, 8);
}

#[test]
fn test_truncated_image_data_is_zero_filled() {
  let (width, height) = (16, 8);
  let mut raw = Vec::new();
  for y in 0..height {
    raw.push(0);
    raw.extend(std::iter::repeat(0x80 + y as u8).take(width));
  }
  // stored deflate blocks, so the first half of the data is the first rows
  let png = png_from_raw(&ihdr(PngColorType::Y, 8, width as u32, height as u32), &[], &raw, 0);
  let idat_start = 8 + 25 + 8;
  let cut = idat_start + raw.len() / 2;

  let mut s = pngflow::ReadSession::new(super::Collect::default());
  assert_eq!(s.feed(&png[..cut]), Ok(0));
  assert_eq!(s.finish(), Ok(()));
  let got = s.into_handler();
  assert!(got.ended);
  assert_eq!(got.rows.len(), height);
  assert_eq!(got.rows[0].2, vec![0x80; width]);
  assert_eq!(got.rows[height - 1].2, vec![0; width]);
  assert!(got.warnings.iter().any(|w| w.kind == WarningKind::TruncatedImageData));

  // a short but complete zlib stream followed by IEND
  let png = png_from_raw(&ihdr(PngColorType::Y, 8, width as u32, height as u32), &[], &raw[..raw.len() / 2], 6);
  let got = feed_in_pieces(&png, 5, |_| ()).unwrap();
  assert_eq!(got.rows.len(), height);
  assert_eq!(got.rows[height - 1].2, vec![0; width]);
  assert_eq!(got.warnings[0].message, "Not enough image data");
}

#[test]
fn test_corrupt_critical_crc_is_fatal() {
  let plte = [1, 2, 3, 4, 5, 6];
  let mut png = png_from_raw(&ihdr(PngColorType::Index, 8, 2, 1), &[(ChunkType::PLTE, &plte)], &[0, 0, 1], 6);
  // the last byte of the PLTE CRC
  let at = 8 + 25 + 8 + plte.len() + 3;
  png[at] ^= 0x55;

  let mut s = pngflow::ReadSession::new(super::Collect::default());
  assert_eq!(s.feed(&png), Err(PngError::Crc(ChunkType::PLTE)));
  assert_eq!(s.feed(&png), Err(PngError::Crc(ChunkType::PLTE)));
  let got = s.into_handler();
  assert!(got.info.is_none());
  assert!(got.rows.is_empty());
  assert!(!got.ended);
}

#[test]
fn test_chunk_order_errors() {
  let y = ihdr(PngColorType::Y, 8, 1, 1);
  let mut png = png_from_raw(&y, &[], &[0, 0], 6);
  // drop IHDR
  png.drain(8..8 + 25);
  assert_eq!(feed_in_pieces(&png, 3, |_| ()).err(), Some(PngError::MissingIhdr));

  let ihdr_bytes = y.to_bytes();
  let png = png_from_raw(&y, &[(ChunkType::IHDR, &ihdr_bytes)], &[0, 0], 6);
  assert_eq!(feed_in_pieces(&png, 3, |_| ()).err(), Some(PngError::Duplicate(ChunkType::IHDR)));

  let png = png_from_raw(&ihdr(PngColorType::Index, 8, 1, 1), &[], &[0, 0], 6);
  assert_eq!(feed_in_pieces(&png, 3, |_| ()).err(), Some(PngError::MissingPlte));
}

#[test]
fn test_palette_index_warning() {
  let png = png_from_raw(
    &ihdr(PngColorType::Index, 2, 4, 2),
    &[(ChunkType::PLTE, &[9, 9, 9])],
    &[0, 0b00_00_00_11, 0, 0b11_00_00_00],
    6,
  );
  let got = feed_in_pieces(&png, 100, |_| ()).unwrap();
  let messages: Vec<_> = got.warnings.iter().map(|w| w.message).collect();
  assert_eq!(messages, vec!["palette index too large"]);
  assert_eq!(got.rows.len(), 2);
}

#[test]
fn test_background_from_file() {
  // gray + alpha over a bKGD gray of 200
  let png = png_from_raw(
    &ihdr(PngColorType::YA, 8, 2, 1),
    &[(ChunkType::bKGD, &[0, 200])],
    &[0, 10, 255, 99, 0],
    6,
  );
  let got = feed_in_pieces(&png, 100, |s| s.set_background_from_file()).unwrap();
  assert_eq!(got.rows[0].2, vec![10, 200]);
  assert!(got.app_errors.is_empty());

  let png = png_from_raw(&ihdr(PngColorType::YA, 8, 1, 1), &[], &[0, 10, 255], 6);
  let got = feed_in_pieces(&png, 100, |s| s.set_background_from_file()).unwrap();
  assert_eq!(got.app_errors, vec![pngflow::AppError::MissingBackground]);
  assert_eq!(got.rows[0].2, vec![10, 255]);
}
