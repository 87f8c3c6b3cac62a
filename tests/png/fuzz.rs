use pngflow::{
  chunk::PNG_SIGNATURE,
  config::EncoderConfig,
  decode::decode_to_vec,
  ihdr::{PngColorType, IHDR},
  PngWriter,
};
use walkdir::WalkDir;

fn all_transforms(s: &mut pngflow::ReadSession<pngflow::decode::ImageCollector>) {
  s.set_expand();
  s.set_expand_16();
  s.set_gray_to_rgb();
  s.set_swap_alpha();
  s.set_gamma(220_000, 45_455);
}

#[test]
fn test_decode_no_panics() {
  // iter ALL files in the test folder, even non-png files shouldn't panic it.
  for entry in WalkDir::new("tests/").into_iter().filter_map(|e| e.ok()) {
    println!("{}", entry.path().display());
    let v = match std::fs::read(entry.path()) {
      Ok(v) => v,
      Err(e) => {
        println!("Error reading file: {e:?}");
        continue;
      }
    };
    let _ = decode_to_vec(&v, |_| ());
    let _ = decode_to_vec(&v, all_transforms);
  }
  // even totally random data should never panic the decoder!
  for _ in 0..10 {
    let v = crate::rand_bytes(1024);
    let _ = decode_to_vec(&v, |_| ());
    let mut v2 = PNG_SIGNATURE.to_vec();
    v2.extend_from_slice(&v);
    let _ = decode_to_vec(&v2, all_transforms);
  }
}

#[test]
fn test_damaged_png_no_panics() {
  let ihdr = IHDR { width: 20, height: 9, bit_depth: 4, color_type: PngColorType::Index, is_interlaced: true };
  let mut w = PngWriter::new(ihdr, EncoderConfig::default().with_interlace(true).with_idat_chunk_size(64)).unwrap();
  let palette: Vec<_> = (0..16).map(|i| pngflow::chunks::RGB8::new(i, i, i)).collect();
  w.set_palette(&palette);
  w.write_image(&crate::rand_bytes(ihdr.bytes_per_scanline(20) * 9)).unwrap();
  let png = w.finish().unwrap();
  assert!(decode_to_vec(&png, all_transforms).is_ok());

  for _ in 0..200 {
    let noise = crate::rand_bytes(8);
    let mut damaged = png.clone();
    let at = usize::from(u16::from_le_bytes([noise[0], noise[1]])) % damaged.len();
    damaged[at] ^= noise[2] | 1;
    let cut = usize::from(u16::from_le_bytes([noise[3], noise[4]])) % (damaged.len() + 1);
    let _ = decode_to_vec(&damaged, all_transforms);
    let _ = decode_to_vec(&damaged[..cut], |_| ());
  }
}
