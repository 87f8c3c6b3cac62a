//! The row transform chain.
//!
//! A chain is a list of [`Transform`] nodes kept sorted by their order
//! number. Before any rows are processed the chain is initialized twice. The
//! [`InitPhase::Format`] pass only works out what the output rows will look
//! like. The [`InitPhase::Final`] pass fixes each node's parameters, removes
//! nodes that turned out to do nothing, and replaces runs of nodes on small
//! pixels with a lookup [`Cache`] (or, for palette images, rewrites the
//! palette). After that every row is passed through the remaining nodes in
//! order.
//!
//! During initialization a node may need another node to run first (for
//! example gamma correction of 2 bit gray needs the gray expanded to 8 bits).
//! It asks for that with [`InitStep::PushBefore`]: the new node takes the
//! current node's order, the current node and any nodes right after it with
//! contiguous orders are bumped up by one, the new node is initialized, and
//! then the original node is initialized again.

use alloc::vec::Vec;

use crate::{
  error::{AppError, PngError, PngWarning},
  info::ImageInfo,
  row::{InitPhase, RowDescriptor, RowFormat},
};

mod alpha;
mod byte_ops;
mod cache;
mod check_palette;
mod compose;
mod expand;
mod gamma;
mod invert;
mod pack;
mod palette;
mod rgb_to_gray;
mod scale16;
mod shift;

pub(crate) use self::{
  alpha::{InitAlpha, INIT_ALPHA_EXPAND_TRNS, INIT_ALPHA_STRIP},
  byte_ops::{
    ByteOps, BYTE_OPS_BGR, BYTE_OPS_CHOP_16, BYTE_OPS_EXPAND_16, BYTE_OPS_GRAY_TO_RGB, BYTE_OPS_SWAP_16,
    BYTE_OPS_SWAP_ALPHA,
  },
  cache::Cache,
  check_palette::CheckPalette,
  compose::Compose,
  expand::{Expand, EXPAND_LBD_GRAY, EXPAND_PALETTE},
  gamma::Gamma,
  invert::{Invert, INVERT_ALPHA, INVERT_MONO},
  pack::{Pack, PackSwap},
  rgb_to_gray::{ChannelSelect, RgbToGray, RgbToGrayMix},
  scale16::Scale16,
  shift::Shift,
};
pub use self::{
  compose::{AlphaMode, BackgroundColor, BackgroundGamma},
  rgb_to_gray::ErrorAction,
  shift::TrueBits,
};

/// Node order numbers.
pub(crate) mod order {
  pub const START: u32 = 0x0000;
  pub const CHECK_PALETTE: u32 = START + 0x200;
  pub const START_CACHE: u32 = START + 0x300;
  pub const INIT_ALPHA: u32 = START + 0x400;

  pub const ARITHMETIC: u32 = 0x2000;
  pub const COMPOSE: u32 = ARITHMETIC + 0x100;
  pub const RGB_TO_GRAY: u32 = ARITHMETIC + 0x200;
  pub const COMPOSE_ALPHA: u32 = ARITHMETIC + 0x300;
  pub const GAMMA_ENCODE: u32 = ARITHMETIC + 0x1F00;
  pub const REPLACE_TRANSPARENT: u32 = GAMMA_ENCODE + 0xF0;

  pub const CHANNEL: u32 = 0x4000;
  pub const EXPAND: u32 = CHANNEL + 0x100;
  pub const SCALE_16_TO_8: u32 = CHANNEL + 0x200;
  pub const CHANNEL_PREQ: u32 = CHANNEL + 0x1F00;

  pub const QUANTIZE: u32 = 0x6000;
  pub const CHANNEL_POSTQ: u32 = QUANTIZE + 0x100;
  pub const INVERT: u32 = QUANTIZE + 0x200;
  pub const SHIFT: u32 = QUANTIZE + 0x300;

  pub const ENCODING: u32 = 0x8000;
  pub const PACK: u32 = ENCODING + 0x200;
  pub const PIXEL_SWAP: u32 = ENCODING + 0x300;
}

/// What a node's init asks of the chain.
#[derive(Debug)]
pub(crate) enum InitStep {
  /// The node stays in the chain.
  Keep,
  /// The node does nothing for this image and is removed.
  Inert,
  /// Run this node first, then initialize the current node again.
  PushBefore(Transform),
}

/// What a node's run asks of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunStep {
  Continue,
  /// The node has done all it will do and is removed.
  Remove,
}

/// Shared state for one init pass.
pub(crate) struct InitContext<'a> {
  pub info: &'a mut ImageInfo,
  pub gamma_threshold: i32,
  /// The order of the node after the one being initialized.
  pub next_order: Option<u32>,
  pub app_errors: Vec<AppError>,
  /// Events from nodes run over palettes and cache inputs.
  pub log: RunLog,
  added: Vec<(u32, Transform)>,
}
impl<'a> InitContext<'a> {
  #[inline]
  #[must_use]
  pub fn new(info: &'a mut ImageInfo, gamma_threshold: i32) -> Self {
    Self {
      info,
      gamma_threshold,
      next_order: None,
      app_errors: Vec::new(),
      log: RunLog::default(),
      added: Vec::new(),
    }
  }

  /// Queues a node to be added (or merged) once the current init returns.
  #[inline]
  pub fn add(&mut self, order: u32, transform: Transform) {
    self.added.push((order, transform));
  }

  #[inline]
  pub fn app_error(&mut self, error: AppError) {
    self.app_errors.push(error);
  }
}

/// Events produced while rows run.
#[derive(Debug, Default)]
pub(crate) struct RunLog {
  pub warnings: Vec<PngWarning>,
  /// An rgb to gray check saw a pixel that wasn't gray.
  pub rgb_to_gray_found: bool,
}

/// A row transform.
#[derive(Debug, Clone)]
pub(crate) enum Transform {
  CheckPalette(CheckPalette),
  InitAlpha(InitAlpha),
  Compose(Compose),
  RgbToGray(RgbToGray),
  RgbToGrayMix(RgbToGrayMix),
  ChannelSelect(ChannelSelect),
  Gamma(Gamma),
  Expand(Expand),
  Scale16(Scale16),
  ByteOps(ByteOps),
  Invert(Invert),
  Shift(Shift),
  Pack(Pack),
  PackSwap(PackSwap),
  Cache(Cache),
}
impl Transform {
  #[must_use]
  pub fn name(&self) -> &'static str {
    match self {
      Self::CheckPalette(_) => "check_palette",
      Self::InitAlpha(_) => "init_alpha",
      Self::Compose(_) => "compose",
      Self::RgbToGray(_) => "rgb_to_gray",
      Self::RgbToGrayMix(_) => "rgb_to_gray_mix",
      Self::ChannelSelect(_) => "channel_select",
      Self::Gamma(_) => "gamma",
      Self::Expand(_) => "expand",
      Self::Scale16(_) => "scale_16_to_8",
      Self::ByteOps(_) => "byte_ops",
      Self::Invert(_) => "invert",
      Self::Shift(_) => "shift",
      Self::Pack(_) => "pack",
      Self::PackSwap(_) => "pack_swap",
      Self::Cache(_) => "cache",
    }
  }

  #[inline]
  fn same_kind(&self, other: &Self) -> bool {
    core::mem::discriminant(self) == core::mem::discriminant(other)
  }

  fn init(&mut self, order: u32, tc: &mut RowDescriptor, cx: &mut InitContext<'_>) -> InitStep {
    match self {
      Self::CheckPalette(t) => t.init(tc, cx),
      Self::InitAlpha(t) => t.init(tc, cx),
      Self::Compose(t) => t.init(tc, cx),
      Self::RgbToGray(t) => t.init(order, tc, cx),
      Self::RgbToGrayMix(t) => t.init(tc),
      Self::ChannelSelect(t) => t.init(tc),
      Self::Gamma(t) => t.init(order, tc, cx),
      Self::Expand(t) => t.init(tc, cx),
      Self::Scale16(t) => t.init(tc),
      Self::ByteOps(t) => t.init(order, tc, cx),
      Self::Invert(t) => t.init(tc),
      Self::Shift(t) => t.init(tc),
      Self::Pack(t) => t.init(tc),
      Self::PackSwap(t) => t.init(tc),
      // caches are only made after the nodes they replace were initialized
      Self::Cache(_) => InitStep::Keep,
    }
  }

  fn run(&mut self, row: &mut [u8], tc: &mut RowDescriptor, log: &mut RunLog) -> Result<RunStep, PngError> {
    match self {
      Self::CheckPalette(t) => return Ok(t.run(row, tc, log)),
      Self::InitAlpha(_) => (),
      Self::Compose(t) => t.run(row, tc),
      Self::RgbToGray(t) => return t.run(row, tc, log),
      Self::RgbToGrayMix(t) => t.run(row, tc),
      Self::ChannelSelect(t) => t.run(row, tc),
      Self::Gamma(t) => t.run(row, tc),
      Self::Expand(t) => t.run(row, tc),
      Self::Scale16(t) => t.run(row, tc),
      Self::ByteOps(t) => t.run(row, tc),
      Self::Invert(t) => t.run(row, tc),
      Self::Shift(t) => t.run(row, tc),
      Self::Pack(t) => t.run(row, tc),
      Self::PackSwap(t) => t.run(row, tc),
      Self::Cache(t) => t.run(row, tc),
    }
    Ok(RunStep::Continue)
  }

  /// The encode direction: turns a row in this node's output format back
  /// into its input format.
  fn run_backwards(&self, row: &mut [u8], tc: &RowDescriptor, input: &RowDescriptor) {
    match self {
      Self::ByteOps(t) => t.run_backwards(row, tc, input),
      Self::Invert(t) => t.run_backwards(row, tc),
      Self::Shift(t) => t.run_backwards(row, tc),
      Self::Pack(t) => t.run_backwards(row, tc, input),
      Self::PackSwap(t) => t.run_backwards(row, tc),
      // not offered on the encode side
      _ => (),
    }
  }

  /// Combines a node added at the same order into this one.
  fn merge(&mut self, other: Self) {
    match (self, other) {
      (Self::Expand(a), Self::Expand(b)) => a.merge(&b),
      (Self::ByteOps(a), Self::ByteOps(b)) => a.merge(&b),
      (Self::Gamma(a), Self::Gamma(b)) => a.merge(&b),
      (Self::InitAlpha(a), Self::InitAlpha(b)) => a.merge(&b),
      (Self::Invert(a), Self::Invert(b)) => a.merge(&b),
      (a, b) => {
        if a.same_kind(&b) {
          *a = b;
        } else {
          tracing::debug!("order clash between {} and {}; keeping {}", a.name(), b.name(), a.name());
        }
      }
    }
  }
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
  pub order: u32,
  pub transform: Transform,
  /// The descriptor the node saw at its last init.
  pub input: Option<RowDescriptor>,
}

/// Where a cache run begins.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CacheStart {
  pub start: usize,
  pub tstart: RowDescriptor,
}

/// The ordered transform list.
#[derive(Debug, Clone, Default)]
pub(crate) struct Chain {
  nodes: Vec<Node>,
  no_cache: bool,
}
impl Chain {
  #[inline]
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// A chain that never builds caches (for the encode direction).
  #[inline]
  #[must_use]
  pub fn without_cache() -> Self {
    Self { nodes: Vec::new(), no_cache: true }
  }

  #[cfg(test)]
  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// The `(order, name)` of each node.
  pub fn describe(&self) -> impl Iterator<Item = (u32, &'static str)> + '_ {
    self.nodes.iter().map(|n| (n.order, n.transform.name()))
  }

  /// The node at `order`, made with `make` if there isn't one.
  pub fn entry(&mut self, order: u32, make: impl FnOnce() -> Transform) -> &mut Transform {
    let i = match self.nodes.binary_search_by_key(&order, |n| n.order) {
      Ok(i) => i,
      Err(i) => {
        self.nodes.insert(i, Node { order, transform: make(), input: None });
        i
      }
    };
    &mut self.nodes[i].transform
  }

  /// Adds a node, merging it into any node already at `order`.
  ///
  /// Gives the index the node ended up at.
  pub fn add(&mut self, order: u32, transform: Transform) -> usize {
    match self.nodes.binary_search_by_key(&order, |n| n.order) {
      Ok(i) => {
        self.nodes[i].transform.merge(transform);
        i
      }
      Err(i) => {
        self.nodes.insert(i, Node { order, transform, input: None });
        i
      }
    }
  }

  /// Inserts `transform` at the order of node `i`, bumping node `i` and the
  /// contiguous nodes after it.
  fn push_before(&mut self, i: usize, transform: Transform) {
    let order = self.nodes[i].order;
    let mut next = order;
    for node in self.nodes[i..].iter_mut() {
      if node.order != next {
        break;
      }
      next += 1;
      node.order = next;
    }
    self.nodes.insert(i, Node { order, transform, input: None });
  }

  /// Applies the adds queued by the init of node `i`, giving the node's new
  /// index.
  fn apply_added(&mut self, i: usize, cx: &mut InitContext<'_>) -> usize {
    if cx.added.is_empty() {
      return i;
    }
    let current = self.nodes[i].order;
    for (order, transform) in core::mem::take(&mut cx.added) {
      self.add(order, transform);
    }
    self.nodes.binary_search_by_key(&current, |n| n.order).unwrap_or(i)
  }

  /// Runs one init phase over the whole chain.
  ///
  /// Gives the output descriptor and the widest pixel depth seen.
  pub fn init(&mut self, phase: InitPhase, cx: &mut InitContext<'_>) -> Result<(RowDescriptor, u32), PngError> {
    if phase == InitPhase::Format && cx.info.ihdr.color_type == crate::ihdr::PngColorType::Index {
      cx.info.check_trns_for_alpha();
    }
    let mut tend = cx.info.image_descriptor();
    tend.init = Some(phase);
    let mut cp = CacheStart { start: 0, tstart: tend };
    let mut max_depth = tend.pixel_depth();
    let mut i = 0;
    while i < self.nodes.len() {
      let order = self.nodes[i].order;
      if !self.no_cache && order > order::START_CACHE && !tend.caching {
        cp = CacheStart { start: i, tstart: tend };
        init_caching(&mut tend, cx.info);
      }
      if tend.palette && order >= order::ENCODING {
        i = self.handle_cache(&mut cp, i, &mut tend, cx)?;
      }

      cx.next_order = self.nodes.get(i + 1).map(|n| n.order);
      let before = tend;
      let step = self.nodes[i].transform.init(order, &mut tend, cx);
      i = self.apply_added(i, cx);
      match step {
        InitStep::Keep => {
          self.nodes[i].input = Some(before);
          max_depth = max_depth.max(tend.pixel_depth());
          i += 1;
        }
        InitStep::Inert => {
          tracing::trace!("{} is inert", self.nodes[i].transform.name());
          self.nodes.remove(i);
        }
        InitStep::PushBefore(t) => {
          if t.same_kind(&self.nodes[i].transform) {
            tracing::debug!("{} tried to push itself", t.name());
            self.nodes[i].input = Some(before);
            i += 1;
          } else {
            tracing::trace!("{} pushed before {}", t.name(), self.nodes[i].transform.name());
            self.push_before(i, t);
          }
        }
      }
    }
    if tend.caching {
      let end = self.nodes.len();
      self.handle_cache(&mut cp, end, &mut tend, cx)?;
    }
    tend.init = None;
    tracing::debug!(
      "{:?} init: {:?} depth {} max {}",
      phase,
      tend.format,
      tend.bit_depth,
      max_depth
    );
    for (order, name) in self.describe() {
      tracing::debug!("  {order:#06x} {name}");
    }
    Ok((tend, max_depth))
  }

  /// Runs both init phases, leaving the output format in `info`.
  pub fn prepare(&mut self, cx: &mut InitContext<'_>) -> Result<(), PngError> {
    let (format, _) = self.init(InitPhase::Format, cx)?;
    cx.info.output = format;
    let (out, max_depth) = self.init(InitPhase::Final, cx)?;
    cx.info.output = out;
    cx.info.max_pixel_depth = max_depth.max(cx.info.ihdr.bits_per_pixel() as u32);
    Ok(())
  }

  /// Closes the cache run that ends before node `end`, giving the new index
  /// of that node.
  fn handle_cache(
    &mut self, cp: &mut CacheStart, end: usize, tend: &mut RowDescriptor, cx: &mut InitContext<'_>,
  ) -> Result<usize, PngError> {
    let mut end = end;
    if cp.start != end {
      if tend.palette {
        if tend.init == Some(InitPhase::Final) {
          end = self.update_palette(cp, end, cx)?;
        }
        cp.start = end;
        restore_cp(tend, &cp.tstart);
      } else {
        if tend.init == Some(InitPhase::Final) {
          end = self.make_cache(cp, end, tend, cx)?;
          cp.start = end;
        }
        cp.tstart = *tend;
      }
    } else {
      restore_cp(tend, &cp.tstart);
    }
    Ok(end)
  }

  /// Runs nodes `start..end` over a row.
  fn run_range(
    &mut self, start: usize, end: usize, row: &mut [u8], tc: &mut RowDescriptor, log: &mut RunLog,
  ) -> Result<(), PngError> {
    for node in &mut self.nodes[start..end] {
      node.transform.run(row, tc, log)?;
    }
    Ok(())
  }

  /// Runs every node over one row, front to back.
  ///
  /// `row` must hold `max_pixel_depth` bits per pixel.
  pub fn run_forwards(&mut self, row: &mut [u8], tc: &mut RowDescriptor, log: &mut RunLog) -> Result<(), PngError> {
    let mut i = 0;
    while i < self.nodes.len() {
      match self.nodes[i].transform.run(row, tc, log)? {
        RunStep::Continue => i += 1,
        RunStep::Remove => {
          self.nodes.remove(i);
        }
      }
    }
    Ok(())
  }

  /// Runs every node backwards over one row, back to front, turning a row
  /// in the output format into the stored format.
  pub fn run_backwards(&self, row: &mut [u8], tc: &mut RowDescriptor) {
    for node in self.nodes.iter().rev() {
      if let Some(input) = node.input {
        node.transform.run_backwards(row, tc, &input);
        tc.format = input.format;
        tc.bit_depth = input.bit_depth;
      }
    }
  }
}

/// Turns caching on for the nodes that follow, if the pixels are small
/// enough or are palette indexes.
pub(crate) fn init_caching(tend: &mut RowDescriptor, info: &ImageInfo) {
  if tend.format.contains(RowFormat::COLORMAP) {
    tend.palette = true;
    tend.caching = true;
    tend.transparent_alpha = info.transparent_palette;
    tend.format = RowFormat::COLOR;
    if info.num_trans() > 0 && tend.trns_valid() {
      tend.format.insert(RowFormat::ALPHA);
    }
    tend.bit_depth = 8;
  } else if tend.pixel_depth() <= 8 {
    tend.caching = true;
  }
}

/// Goes back to `tstart`, keeping the channel data of `tend`.
fn restore_cp(tend: &mut RowDescriptor, tstart: &RowDescriptor) {
  let save = *tend;
  *tend = *tstart;
  tend.keep_channel_data(&save);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_add_keeps_order_and_merges() {
    let mut chain = Chain::new();
    chain.add(order::PACK, Transform::Pack(Pack::default()));
    chain.add(order::EXPAND, Transform::Expand(Expand::new(expand::EXPAND_PALETTE)));
    chain.add(order::EXPAND, Transform::Expand(Expand::new(expand::EXPAND_TRNS)));
    let orders: Vec<_> = chain.describe().collect();
    assert_eq!(orders, [(order::EXPAND, "expand"), (order::PACK, "pack")]);
    match &chain.nodes[0].transform {
      Transform::Expand(e) => assert_eq!(e.flags(), expand::EXPAND_PALETTE | expand::EXPAND_TRNS),
      other => panic!("{other:?}"),
    }
  }

  #[test]
  fn test_push_before_bumps_contiguous_orders() {
    let mut chain = Chain::new();
    chain.add(0x100, Transform::Pack(Pack::default()));
    chain.add(0x101, Transform::PackSwap(PackSwap::default()));
    chain.add(0x103, Transform::Scale16(Scale16::default()));
    chain.push_before(0, Transform::Invert(Invert::new(invert::INVERT_MONO)));
    let orders: Vec<_> = chain.describe().map(|(o, _)| o).collect();
    assert_eq!(orders, [0x100, 0x101, 0x102, 0x103]);
    assert_eq!(chain.nodes[0].transform.name(), "invert");
    assert_eq!(chain.nodes[1].transform.name(), "pack");
    assert_eq!(chain.nodes[2].transform.name(), "pack_swap");
  }
}
