//! Replaces a run of nodes working on small pixels with one table lookup.
//!
//! Any pixel of 8 bits or fewer (or a palette index) has at most 256 values,
//! so the effect of the run can be found by running every possible value
//! through it once, when the chain is initialized.

use alloc::vec::Vec;

use crate::{
  error::PngError,
  info::ImageInfo,
  row::{get_packed, put_packed, RowDescriptor, RowFormat},
};

use super::{init_caching, CacheStart, Chain, InitContext, Node, Transform};

/// Room for 256 pixels of up to 64 bits.
pub(crate) const CACHE_BUFFER: usize = 256 * 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
  /// The output pixel is the same size as the input pixel: one byte maps
  /// to one byte.
  Bytes,
  /// Each input value selects `out_bytes` bytes.
  Pixels { out_bytes: usize },
}

/// A lookup table standing in for the nodes it was compiled from.
#[derive(Debug, Clone)]
pub(crate) struct Cache {
  lookup: Lookup,
  table: Vec<u8>,
  input: RowDescriptor,
  output: RowDescriptor,
}
impl Cache {
  pub fn run(&self, row: &mut [u8], tc: &mut RowDescriptor) {
    match self.lookup {
      Lookup::Bytes => {
        for b in &mut row[..tc.row_bytes()] {
          *b = self.table[usize::from(*b)];
        }
      }
      Lookup::Pixels { out_bytes } => {
        let depth = self.input.bit_depth;
        let lsb = self.input.format.contains(RowFormat::SWAPPED);
        // the output is wider, so work back from the end of the row
        for x in (0..tc.width as usize).rev() {
          let q = if depth == 8 { usize::from(row[x]) } else { get_packed(row, x, depth, lsb) as usize };
          let entry = &self.table[q * out_bytes..(q + 1) * out_bytes];
          row[x * out_bytes..(x + 1) * out_bytes].copy_from_slice(entry);
        }
      }
    }
    let width = tc.width;
    *tc = self.output;
    tc.width = width;
    tc.init = None;
  }
}

/// Writes one pixel per palette entry in the format `tc` describes (8 bit
/// RGB, plus alpha if it has it), giving the number of entries.
pub(crate) fn palette_input(info: &ImageInfo, tc: &RowDescriptor, buf: &mut [u8]) -> u32 {
  let alpha = tc.format.contains(RowFormat::ALPHA);
  let n = if alpha { 4 } else { 3 };
  for (i, (entry, out)) in info.palette.iter().zip(buf.chunks_exact_mut(n)).enumerate() {
    out[..3].copy_from_slice(&[entry.r, entry.g, entry.b]);
    if alpha {
      out[3] = info.palette_alpha(i);
    }
  }
  info.palette.len() as u32
}

/// Writes every value of an `input` pixel once, giving the pixel count.
fn synthetic_input(input: &RowDescriptor, info: &ImageInfo, tc: &RowDescriptor, buf: &mut [u8]) -> u32 {
  if input.format.contains(RowFormat::COLORMAP) {
    return palette_input(info, tc, buf);
  }
  match input.pixel_depth() {
    1 => {
      buf[0] = 0x40;
      2
    }
    2 => {
      buf[0] = 0x1B;
      4
    }
    4 => {
      buf[..8].copy_from_slice(&[0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF]);
      16
    }
    _ => {
      for (i, b) in buf[..256].iter_mut().enumerate() {
        *b = i as u8;
      }
      256
    }
  }
}

impl Chain {
  /// Compiles nodes `cp.start..end` into a [`Cache`], giving the index of the
  /// node after it.
  ///
  /// The nodes are left alone when the output can't be expressed as a table.
  pub(super) fn make_cache(
    &mut self, cp: &mut CacheStart, end: usize, tend: &RowDescriptor, cx: &mut InitContext<'_>,
  ) -> Result<usize, PngError> {
    let input = cp.tstart;
    let ipd = input.pixel_depth();
    let opd = tend.pixel_depth();
    if ipd > 8 || (opd < 8 && opd != ipd) || opd > 64 {
      tracing::debug!("no cache for {} to {} bit pixels", ipd, opd);
      return Ok(end);
    }

    let mut buf = [0_u8; CACHE_BUFFER];
    let mut tc = input;
    init_caching(&mut tc, cx.info);
    tc.init = None;
    let width = synthetic_input(&input, cx.info, &tc, &mut buf);
    tc.width = width;
    self.run_range(cp.start, end, &mut buf, &mut tc, &mut cx.log)?;
    if tc.pixel_depth() != opd {
      tracing::debug!("cache run gave {} bit pixels, expected {}", tc.pixel_depth(), opd);
      return Ok(end);
    }

    let width = width as usize;
    let (lookup, table) = if ipd == opd {
      let mut table = Vec::new();
      table.try_reserve_exact(256)?;
      if ipd == 8 {
        table.extend_from_slice(&buf[..256]);
        table[width..].fill(0);
      } else {
        let depth = ipd as u8;
        let lsb = tc.format.contains(RowFormat::SWAPPED);
        let per_byte = 8 / ipd as usize;
        table.extend((0..=255_u8).map(|b| {
          let mut out = [0];
          for slot in 0..per_byte {
            let q = get_packed(&[b], slot, depth, false) as usize;
            if q < width {
              put_packed(&mut out, slot, depth, lsb, get_packed(&buf, q, depth, lsb));
            }
          }
          out[0]
        }));
      }
      (Lookup::Bytes, table)
    } else {
      let out_bytes = (opd / 8) as usize;
      let mut table = Vec::new();
      table.try_reserve_exact(out_bytes << ipd)?;
      table.resize(out_bytes << ipd, 0);
      let used = width.min(1 << ipd) * out_bytes;
      table[..used].copy_from_slice(&buf[..used]);
      (Lookup::Pixels { out_bytes }, table)
    };

    let order = self.nodes[cp.start].order;
    let names: Vec<&str> = self.nodes[cp.start..end].iter().map(|n| n.transform.name()).collect();
    tracing::debug!("cached {:?} as {:?} from {} to {} bits", names, lookup, ipd, opd);
    self.nodes.drain(cp.start..end);
    let mut output = *tend;
    output.init = None;
    let cache = Cache { lookup, table, input, output };
    self.nodes.insert(cp.start, Node { order, transform: Transform::Cache(cache), input: Some(input) });
    Ok(cp.start + 1)
  }
}
