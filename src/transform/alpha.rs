use crate::row::{InitPhase, RowDescriptor};

use super::{
  byte_ops::{ByteOps, BYTE_OPS_STRIP_ALPHA},
  expand::{Expand, EXPAND_LBD_GRAY, EXPAND_TRNS},
  order, InitContext, InitStep, Transform,
};

pub(crate) const INIT_ALPHA_STRIP: u8 = 1;
pub(crate) const INIT_ALPHA_EXPAND_TRNS: u8 = 2;

/// Records the alpha requests (strip alpha, tRNS to alpha) in the descriptor
/// so the arithmetic transforms can see them, and adds the nodes that carry
/// them out.
#[derive(Debug, Clone, Default)]
pub(crate) struct InitAlpha {
  flags: u8,
}
impl InitAlpha {
  #[inline]
  #[must_use]
  pub const fn new(flags: u8) -> Self {
    Self { flags }
  }

  #[inline]
  pub fn merge(&mut self, other: &Self) {
    self.flags |= other.flags;
  }

  pub fn init(&mut self, tc: &mut RowDescriptor, cx: &mut InitContext<'_>) -> InitStep {
    let mut required = false;
    if self.flags & INIT_ALPHA_EXPAND_TRNS != 0 {
      // an explicit strip beats the expansion
      if cx.info.num_trans() > 0 && !tc.palette && self.flags & INIT_ALPHA_STRIP == 0 {
        required = true;
        tc.expand_trns = true;
        if tc.init == Some(InitPhase::Format) {
          cx.add(order::EXPAND, Transform::Expand(Expand::new(EXPAND_TRNS | EXPAND_LBD_GRAY)));
        }
      } else {
        self.flags &= !INIT_ALPHA_EXPAND_TRNS;
      }
    }
    if self.flags & INIT_ALPHA_STRIP != 0 {
      required = true;
      tc.strip_alpha = true;
      if tc.init == Some(InitPhase::Format) {
        cx.add(order::CHANNEL_PREQ, Transform::ByteOps(ByteOps::new(BYTE_OPS_STRIP_ALPHA)));
      }
    }
    // the flags only matter to the init of later nodes
    if required && tc.init == Some(InitPhase::Format) {
      InitStep::Keep
    } else {
      InitStep::Inert
    }
  }
}
