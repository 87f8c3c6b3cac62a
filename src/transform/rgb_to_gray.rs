use crate::{
  error::{PngError, PngWarning, WarningKind},
  row::{get_sample, put_sample, InitPhase, InvalidInfo, RowDescriptor, RowFormat},
  sample::{muldiv, FP_1},
};

use super::{
  expand::{Expand, EXPAND_TRNS},
  gamma::Gamma,
  order, InitContext, InitStep, RunLog, RunStep, Transform,
};

/// What to do when rgb to gray conversion sees a pixel that isn't gray.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ErrorAction {
  /// Don't look.
  NoCheck,
  /// Only record it (see `ReadSession::rgb_to_gray_status`).
  #[default]
  None,
  /// Record it and send a warning.
  Warn,
  /// Fail the session. The red channel is used as the gray value.
  Error,
}

/// Reduces color to gray, by weighting the channels or picking one of them.
///
/// At final init this node adds the nodes that do the work. It stays in the
/// chain only to look for non-gray pixels.
#[derive(Debug, Clone)]
pub(crate) struct RgbToGray {
  error_action: ErrorAction,
  /// Red and green weights, `FP_1` fixed point; `None` is the sRGB weights.
  coefficients: Option<(i32, i32)>,
}
impl RgbToGray {
  #[inline]
  #[must_use]
  pub const fn new(error_action: ErrorAction, coefficients: Option<(i32, i32)>) -> Self {
    Self { error_action, coefficients }
  }

  pub fn init(&mut self, at: u32, tc: &mut RowDescriptor, cx: &mut InitContext<'_>) -> InitStep {
    if !tc.format.contains(RowFormat::COLOR) {
      return InitStep::Inert;
    }
    let lone_trns = !tc.format.contains(RowFormat::ALPHA)
      && !tc.palette
      && cx.info.num_trans() == 1
      && tc.trns_valid();
    if tc.init == Some(InitPhase::Format) {
      if lone_trns {
        if tc.expand_trns && !tc.strip_alpha {
          tc.format.insert(RowFormat::ALPHA);
        }
        tc.invalid.insert(InvalidInfo::TRNS);
      }
      tc.format.remove(RowFormat::COLOR);
      return InitStep::Keep;
    }

    // a color key has to become alpha before the channels merge
    if lone_trns {
      if tc.expand_trns && !tc.strip_alpha {
        return InitStep::PushBefore(Transform::Expand(Expand::new(EXPAND_TRNS)));
      }
      tc.invalid.insert(InvalidInfo::TRNS);
    }

    let (red, green) = self.coefficients.unwrap_or((21260, 71520));
    let r = muldiv(red, 65536, FP_1).unwrap_or(0);
    let g = muldiv(green, 65536, FP_1).unwrap_or(0);
    let select = if self.error_action == ErrorAction::Error || r >= 65536 {
      Some(0)
    } else if g >= 65536 {
      Some(1)
    } else if r + g == 0 {
      Some(2)
    } else {
      None
    };
    match select {
      None => {
        cx.add(order::GAMMA_ENCODE, Transform::Gamma(Gamma::new(tc.gamma, 0)));
        cx.add(at + 0x10, Transform::Gamma(Gamma::forced(FP_1, 16)));
        cx.add(at + 0x20, Transform::RgbToGrayMix(RgbToGrayMix { r: r as u32, g: g as u32 }));
      }
      Some(index) => {
        cx.add(at + 0x10, Transform::ChannelSelect(ChannelSelect { index }));
        tc.sbit[1] = tc.sbit[index];
      }
    }
    tracing::trace!("rgb to gray: select {:?}, weights {} {}", select, r, g);
    if self.error_action == ErrorAction::NoCheck {
      InitStep::Inert
    } else {
      InitStep::Keep
    }
  }

  /// Looks for a pixel whose channels differ, skipping transparent ones.
  pub fn run(&self, row: &[u8], tc: &RowDescriptor, log: &mut RunLog) -> Result<RunStep, PngError> {
    if !tc.format.contains(RowFormat::COLOR) || tc.format.contains(RowFormat::COLORMAP) {
      return Ok(RunStep::Continue);
    }
    let depth = tc.bit_depth;
    let n = tc.channels() as usize;
    let alpha = tc.format.contains(RowFormat::ALPHA);
    let found = (0..tc.width as usize).any(|x| {
      let s = |c: usize| get_sample(row, x * n + c, depth, false);
      (s(0) != s(1) || s(2) != s(1)) && !(alpha && s(3) == 0)
    });
    if !found {
      return Ok(RunStep::Continue);
    }
    log.rgb_to_gray_found = true;
    match self.error_action {
      ErrorAction::Warn => {
        log.warnings.push(PngWarning::new(WarningKind::NonGrayPixel, "RGB to gray found nongray pixel"));
      }
      ErrorAction::Error => return Err(PngError::NonGrayPixel),
      _ => (),
    }
    Ok(RunStep::Remove)
  }
}

/// Weighted sum of linear 16 bit color channels.
#[derive(Debug, Clone)]
pub(crate) struct RgbToGrayMix {
  r: u32,
  g: u32,
}
impl RgbToGrayMix {
  pub fn init(&mut self, tc: &mut RowDescriptor) -> InitStep {
    if !tc.format.contains(RowFormat::COLOR) || tc.bit_depth != 16 {
      return InitStep::Inert;
    }
    tc.format.remove(RowFormat::COLOR);
    tc.invalid.insert(InvalidInfo::SBIT);
    tc.reset_sbit();
    InitStep::Keep
  }

  pub fn run(&self, row: &mut [u8], tc: &mut RowDescriptor) {
    let b = 65536 - self.r - self.g;
    let alpha = tc.format.contains(RowFormat::ALPHA);
    let (n_in, n_out) = if alpha { (4, 2) } else { (3, 1) };
    for x in 0..tc.width as usize {
      let s = |c: usize| get_sample(row, x * n_in + c, 16, false);
      let gray = (s(0) * self.r + s(1) * self.g + s(2) * b + 32767) >> 16;
      let a = s(3.min(n_in - 1));
      put_sample(row, x * n_out, 16, false, gray);
      if alpha {
        put_sample(row, x * n_out + 1, 16, false, a);
      }
    }
    tc.format.remove(RowFormat::COLOR);
    tc.invalid.insert(InvalidInfo::SBIT);
    tc.reset_sbit();
  }
}

/// Uses one color channel as the gray value.
#[derive(Debug, Clone)]
pub(crate) struct ChannelSelect {
  index: usize,
}
impl ChannelSelect {
  pub fn init(&mut self, tc: &mut RowDescriptor) -> InitStep {
    if !tc.format.contains(RowFormat::COLOR) || tc.bit_depth < 8 {
      return InitStep::Inert;
    }
    tc.format.remove(RowFormat::COLOR);
    InitStep::Keep
  }

  pub fn run(&self, row: &mut [u8], tc: &mut RowDescriptor) {
    let depth = tc.bit_depth;
    let alpha = tc.format.contains(RowFormat::ALPHA);
    let (n_in, n_out) = if alpha { (4, 2) } else { (3, 1) };
    for x in 0..tc.width as usize {
      let v = get_sample(row, x * n_in + self.index, depth, false);
      let a = if alpha { get_sample(row, x * n_in + 3, depth, false) } else { 0 };
      put_sample(row, x * n_out, depth, false, v);
      if alpha {
        put_sample(row, x * n_out + 1, depth, false, a);
      }
    }
    tc.format.remove(RowFormat::COLOR);
  }
}
