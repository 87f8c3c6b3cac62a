use crate::{
  error::{PngWarning, WarningKind},
  row::{get_packed, InitPhase, RowDescriptor, RowFormat},
};

use super::{InitContext, InitStep, RunLog, RunStep};

/// Warns (once) about palette indexes past the end of the palette.
#[derive(Debug, Clone, Default)]
pub(crate) struct CheckPalette {
  num_palette: u32,
}
impl CheckPalette {
  pub fn init(&mut self, tc: &mut RowDescriptor, cx: &mut InitContext<'_>) -> InitStep {
    if !tc.format.contains(RowFormat::COLORMAP) {
      return InitStep::Inert;
    }
    self.num_palette = cx.info.palette.len() as u32;
    // every index a short palette can't cover is worth checking for
    if self.num_palette >= 1 << tc.bit_depth {
      return InitStep::Inert;
    }
    if tc.init == Some(InitPhase::Final) {
      tracing::trace!("checking indexes against {} palette entries", self.num_palette);
    }
    InitStep::Keep
  }

  pub fn run(&mut self, row: &[u8], tc: &RowDescriptor, log: &mut RunLog) -> RunStep {
    let depth = tc.bit_depth;
    let bad = (0..tc.width as usize).any(|x| {
      let index = if depth == 8 { u32::from(row[x]) } else { get_packed(row, x, depth, false) };
      index >= self.num_palette
    });
    if bad {
      log.warnings.push(PngWarning::new(WarningKind::PaletteIndex, "palette index too large"));
      RunStep::Remove
    } else {
      RunStep::Continue
    }
  }
}
