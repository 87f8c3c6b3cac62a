//! Applies palette-safe transforms to the palette entries instead of to every
//! pixel.

use alloc::vec::Vec;

use crate::{
  chunks::{tRNS, RGB8},
  error::PngError,
  row::{get_packed, get_sample, Channel, RowFormat},
  sample::replicate,
};

use super::{cache::palette_input, cache::CACHE_BUFFER, init_caching, CacheStart, Chain, InitContext};

impl Chain {
  /// Runs nodes `cp.start..end` over the palette, publishes the result in
  /// the image info, and removes the nodes. Gives the index of the node that
  /// followed them.
  pub(super) fn update_palette(
    &mut self, cp: &mut CacheStart, end: usize, cx: &mut InitContext<'_>,
  ) -> Result<usize, PngError> {
    let mut buf = [0_u8; CACHE_BUFFER];
    let mut tc = cp.tstart;
    init_caching(&mut tc, cx.info);
    tc.init = None;
    tc.width = palette_input(cx.info, &tc, &mut buf);
    self.run_range(cp.start, end, &mut buf, &mut tc, &mut cx.log)?;
    self.nodes.drain(cp.start..end);

    let (layout, n) = tc.layout();
    let depth = tc.bit_depth;
    let swapped = tc.format.contains(RowFormat::SWAPPED);
    let sample = |i: usize| -> u8 {
      match depth {
        16 => (get_sample(&buf, i, 16, swapped) >> 8) as u8,
        8 => buf[i],
        _ => replicate(get_packed(&buf, i, depth, swapped), u32::from(depth), 8) as u8,
      }
    };
    let has_alpha = tc.format.contains(RowFormat::ALPHA) && !tc.format.contains(RowFormat::AFILLER);
    let mut palette = Vec::new();
    palette.try_reserve_exact(tc.width as usize)?;
    let mut alphas = Vec::new();
    for x in 0..tc.width as usize {
      // red, green, blue, alpha
      let mut value = [0, 0, 0, 255];
      for (c, channel) in layout[..n].iter().enumerate() {
        let v = sample(x * n + c);
        match channel {
          Channel::Gray => value[..3].fill(v),
          other => value[other.sbit_index()] = v,
        }
      }
      palette.push(RGB8::new(value[0], value[1], value[2]));
      if has_alpha {
        alphas.push(value[3]);
      }
    }
    while alphas.last() == Some(&255) {
      alphas.pop();
    }
    tracing::debug!("palette rewritten: {} entries, {} alphas", palette.len(), alphas.len());
    cx.info.palette = palette;
    cx.info.trns = if alphas.is_empty() { None } else { Some(tRNS::Index(alphas)) };
    cx.info.palette_updated = true;
    Ok(cp.start)
  }
}
