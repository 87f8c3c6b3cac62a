use proptest::prelude::*;

use pngflow::{
  chunk::ChunkType,
  config::EncoderConfig,
  ihdr::{PngColorType, IHDR},
  PngWriter, ReadSession,
};

use super::{feed_in_pieces, Collect};

/// An interlaced palette image and an RGBA image, both with a tRNS or alpha.
fn sample_pngs() -> Vec<Vec<u8>> {
  let mut out = Vec::new();

  let ihdr = IHDR { width: 13, height: 9, bit_depth: 4, color_type: PngColorType::Index, is_interlaced: true };
  let mut w = PngWriter::new(ihdr, EncoderConfig::default().with_interlace(true).with_idat_chunk_size(40)).unwrap();
  let palette: Vec<_> = (0..16).map(|i| pngflow::chunks::RGB8::new(i * 16, 255 - i * 16, i)).collect();
  w.set_palette(&palette);
  w.set_trns(pngflow::chunks::tRNS::Index(vec![0, 128, 255, 7]));
  w.set_packing();
  let pixels: Vec<u8> = (0..13 * 9).map(|i| (i * 7 % 16) as u8).collect();
  w.write_image(&pixels).unwrap();
  out.push(w.finish().unwrap());

  let ihdr = IHDR { width: 7, height: 5, bit_depth: 16, color_type: PngColorType::RGBA, is_interlaced: false };
  let mut w = PngWriter::new(ihdr, EncoderConfig::default().with_idat_chunk_size(33)).unwrap();
  let pixels: Vec<u8> = (0..7 * 5 * 8).map(|i| (i * 31 % 251) as u8).collect();
  w.write_image(&pixels).unwrap();
  out.push(w.finish().unwrap());
  out
}

/// Feeds `png` split at the given points.
fn feed_split(png: &[u8], cuts: &[usize], setup: impl Fn(&mut ReadSession<Collect>)) -> Collect {
  let mut cuts: Vec<usize> = cuts.iter().map(|c| c % (png.len() + 1)).collect();
  cuts.sort_unstable();
  let mut s = ReadSession::new(Collect::default());
  setup(&mut s);
  let mut at = 0;
  for cut in cuts.into_iter().chain([png.len()]) {
    assert_eq!(s.feed(&png[at..cut]), Ok(0));
    at = cut;
  }
  s.into_handler()
}

fn transforms(s: &mut ReadSession<Collect>) {
  s.set_expand();
  s.set_strip_16();
  s.set_bgr();
  s.set_interlace_handling();
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(64))]

  #[test]
  fn test_any_split_gives_the_same_callbacks(cuts in proptest::collection::vec(0_usize..4096, 0..24)) {
    for png in sample_pngs() {
      let whole = feed_in_pieces(&png, png.len(), transforms).unwrap();
      let split = feed_split(&png, &cuts, transforms);
      prop_assert_eq!(&split, &whole);
      prop_assert!(split.ended);
    }
  }
}

#[test]
fn test_unknown_chunk_delivery() {
  let ihdr = super::ihdr(PngColorType::Y, 8, 1, 1);
  let png = super::png_from_raw(&ihdr, &[(ChunkType(*b"prVt"), b"private data")], &[0, 1], 6);

  #[derive(Default)]
  struct Keep(Vec<(ChunkType, Vec<u8>)>);
  impl pngflow::PushHandler for Keep {
    fn row(&mut self, _: &[u8], _: u32, _: u8, _: &mut pngflow::Control) {}
    fn unknown_chunk(&mut self, t: ChunkType, data: &[u8], _: &mut pngflow::Control) {
      self.0.push((t, data.to_vec()));
    }
  }
  let mut s = ReadSession::new(Keep::default());
  s.keep_unknown_chunks(true);
  for b in &png {
    s.feed(std::slice::from_ref(b)).unwrap();
  }
  assert_eq!(s.into_handler().0, vec![(ChunkType(*b"prVt"), b"private data".to_vec())]);
}

#[test]
fn test_pause_without_save_hands_bytes_back() {
  #[derive(Default)]
  struct PauseEachRow(usize);
  impl pngflow::PushHandler for PauseEachRow {
    fn row(&mut self, _: &[u8], _: u32, _: u8, control: &mut pngflow::Control) {
      self.0 += 1;
      control.pause(false);
    }
  }
  let png = &sample_pngs()[1];
  let mut s = ReadSession::new(PauseEachRow::default());
  let mut at = 0;
  let mut calls = 0;
  while !s.is_done() {
    let left = s.feed(&png[at..]).unwrap();
    at = png.len() - left;
    calls += 1;
    assert!(calls < 100);
  }
  assert_eq!(s.handler().0, 5);
}
