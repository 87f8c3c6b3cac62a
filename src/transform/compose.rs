use crate::{
  row::{get_packed, get_sample, put_packed, put_sample, InitPhase, InvalidInfo, RowDescriptor, RowFormat},
  sample::{gamma_correction, gamma_equal, gamma_nxmbit_correct, max_value, scale_down, FP_1},
  info::ImageInfo,
};

use super::{
  byte_ops::{ByteOps, BYTE_OPS_GRAY_TO_RGB},
  expand::{fill_transparent_pixel, push_gamma_expand},
  gamma::Gamma,
  order, InitContext, InitStep, Transform,
};

/// The background to compose onto.
///
/// Values are in the bit depth of the image (when the background "needs
/// expand") or of the output rows, and only the low bits are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackgroundColor {
  Gray(u16),
  Rgb(u16, u16, u16),
  /// A palette entry.
  Index(u8),
}

/// The encoding of the background color's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackgroundGamma {
  /// Encoded like the output rows.
  Screen,
  /// Encoded like the image data.
  File,
  /// Encoded with this gamma (`FP_1` fixed point).
  Unique(i32),
}

/// How alpha is delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AlphaMode {
  /// Straight alpha, color channels encoded with the output gamma.
  #[default]
  Png,
  /// Color channels premultiplied by alpha, all linear.
  Associated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Stage {
  /// The node the API adds at `COMPOSE`.
  #[default]
  Start,
  /// The work moved to `COMPOSE_ALPHA`; the start node goes away.
  Moved,
  /// At `COMPOSE_ALPHA`, asking for linear 16 bit data.
  Alpha,
  /// At `COMPOSE_ALPHA` with linear 16 bit data in front of it.
  AlphaLinear,
  /// At `REPLACE_TRANSPARENT`, after the output encoding.
  Transparent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Mode {
  #[default]
  Pending,
  /// Swap the tRNS pixel for the background pixel.
  ReplaceTrns { transparent: [u8; 6], pixel: [u8; 6], len: usize },
  /// Drop alpha, using the background pixel where alpha was 0.
  StripTransparent { pixel: [u8; 6], len: usize },
  /// Linear 16 bit alpha blending.
  Composite,
}

/// The resolved background value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Background {
  gray: bool,
  /// Red, green, blue; all three hold the value when `gray`.
  rgb: [u32; 3],
  bit_depth: u8,
  gamma: i32,
}
impl Background {
  /// Converts the value to `gamma` and `bit_depth`.
  ///
  /// 0 and the maximum are exact at every depth.
  fn correct_to(&mut self, gamma: i32, bit_depth: u8, threshold: i32) {
    let correction = gamma_correction(self.gamma, gamma, 16, threshold);
    let from = u32::from(self.bit_depth);
    let to = u32::from(bit_depth);
    for c in &mut self.rgb {
      *c = if *c > 0 && *c < max_value(from) {
        match correction {
          Some(k) => gamma_nxmbit_correct(*c, k, from, to),
          None => scale_down(*c, from, to),
        }
      } else if *c != 0 {
        max_value(to)
      } else {
        0
      };
    }
    self.gamma = gamma;
    self.bit_depth = bit_depth;
  }

  /// The background as the bytes of one pixel of `tc` without its alpha,
  /// giving the byte count. Low bit depth gray fills the byte.
  fn pixel(&mut self, tc: &RowDescriptor, threshold: i32) -> ([u8; 6], usize) {
    self.correct_to(tc.gamma, tc.bit_depth, threshold);
    let mut out = [0; 6];
    let mut depth = u32::from(tc.bit_depth);
    if self.gray {
      let mut g = self.rgb[1];
      while depth < 8 {
        g &= max_value(depth);
        g |= g << depth;
        depth <<= 1;
      }
      out.fill(g as u8);
      if depth == 16 {
        out[0] = (g >> 8) as u8;
        out[2] = out[0];
        out[4] = out[0];
      }
      let colors = if tc.format.contains(RowFormat::COLOR) { 3 } else { 1 };
      (out, colors << usize::from(depth == 16))
    } else if depth == 16 {
      for (o, c) in out.chunks_exact_mut(2).zip(self.rgb) {
        o.copy_from_slice(&(c as u16).to_be_bytes());
      }
      (out, 6)
    } else {
      for (o, c) in out.iter_mut().zip(self.rgb) {
        *o = c as u8;
      }
      (out, 3)
    }
  }
}

/// Background composition and alpha association.
///
/// The fast cases (only fully transparent pixels, matching gamma) replace
/// transparent pixels with the background directly. Anything else moves to
/// `COMPOSE_ALPHA`, converts the data to linear 16 bit, blends there, and
/// lets a gamma node at `GAMMA_ENCODE` encode the result. Fully transparent
/// pixels are then filled in after the encoding, so the background keeps its
/// exact value.
#[derive(Debug, Clone, Default)]
pub(crate) struct Compose {
  stage: Stage,
  /// `Some` when composing onto a background.
  color: Option<BackgroundColor>,
  background_gamma: Option<BackgroundGamma>,
  need_expand: bool,
  associate: bool,
  /// An rgb to gray node follows.
  rgb_to_gray: bool,
  bg: Background,
  mode: Mode,
}
impl Compose {
  /// Composes onto `color`, replacing any earlier background.
  #[inline]
  pub fn set_background(&mut self, color: BackgroundColor, gamma: BackgroundGamma, need_expand: bool) {
    self.color = Some(color);
    self.background_gamma = Some(gamma);
    self.need_expand = need_expand;
  }

  #[inline]
  pub fn set_associate(&mut self, associate: bool) {
    self.associate = associate;
  }

  #[inline]
  fn composing(&self) -> bool {
    self.color.is_some()
  }

  pub fn init(&mut self, tc: &mut RowDescriptor, cx: &mut InitContext<'_>) -> InitStep {
    match self.stage {
      Stage::Start if tc.init == Some(InitPhase::Format) => self.init_format(tc, cx),
      Stage::Start => self.init_final(tc, cx),
      Stage::Moved => InitStep::Inert,
      Stage::Alpha => {
        cx.add(order::GAMMA_ENCODE, Transform::Gamma(Gamma::new(tc.gamma, 0)));
        self.stage = Stage::AlphaLinear;
        InitStep::PushBefore(Transform::Gamma(Gamma::forced(FP_1, 16)))
      }
      Stage::AlphaLinear => self.init_alpha_linear(tc, cx),
      Stage::Transparent => self.init_transparent(tc, cx.gamma_threshold),
    }
  }

  fn init_format(&mut self, tc: &mut RowDescriptor, cx: &mut InitContext<'_>) -> InitStep {
    if self.composing() {
      self.associate = false;
    } else if !self.associate {
      return InitStep::Inert;
    }
    // nothing has been inserted yet, so an rgb to gray node would be next
    self.rgb_to_gray = cx.next_order == Some(order::RGB_TO_GRAY);
    if tc.format.contains(RowFormat::ALPHA) {
      // association keeps the alpha channel
      if self.composing() {
        tc.format.remove(RowFormat::ALPHA);
      }
    } else if lone_trns(tc, cx.info) {
      tc.invalid.insert(InvalidInfo::TRNS);
      if !self.composing() {
        tc.format.insert(RowFormat::ALPHA);
        tc.bit_depth = tc.bit_depth.max(8);
      }
    } else {
      return InitStep::Inert;
    }
    InitStep::Keep
  }

  fn init_final(&mut self, tc: &mut RowDescriptor, cx: &mut InitContext<'_>) -> InitStep {
    self.bg.gamma = match self.background_gamma {
      Some(BackgroundGamma::File) => tc.gamma,
      Some(BackgroundGamma::Screen) => cx.info.output.gamma,
      Some(BackgroundGamma::Unique(g)) => g,
      None => 0,
    };
    if !self.resolve_color(tc, cx) {
      return InitStep::Inert;
    }
    let lone = lone_trns(tc, cx.info);
    let threshold = cx.gamma_threshold;
    if self.composing()
      && (self.bg.gray || (tc.format.contains(RowFormat::COLOR) && !self.rgb_to_gray))
      && tc.bit_depth >= self.bg.bit_depth
      && (tc.transparent_alpha || lone)
      && gamma_equal(tc.gamma, cx.info.output.gamma, u32::from(tc.bit_depth), threshold)
    {
      // no alpha arithmetic and no gamma change
      if tc.format.contains(RowFormat::ALPHA) {
        return self.init_transparent(tc, threshold);
      }
      if !lone {
        return InitStep::Inert;
      }
      let (pixel, len) = self.bg.pixel(tc, threshold);
      let mut transparent = [0; 6];
      let trns_len = fill_transparent_pixel(cx.info, &mut transparent);
      tc.invalid.insert(InvalidInfo::TRNS | InvalidInfo::SBIT);
      tc.reset_sbit();
      if trns_len == len && transparent[..len] == pixel[..len] {
        return InitStep::Inert;
      }
      self.mode = Mode::ReplaceTrns { transparent, pixel, len };
      return InitStep::Keep;
    }

    // the arithmetic has to follow rgb to gray
    let mut alpha = self.clone();
    alpha.stage = Stage::Alpha;
    cx.add(order::COMPOSE_ALPHA, Transform::Compose(alpha));
    tc.expand_trns = true;
    if self.composing() {
      tc.strip_alpha = false;
    }
    self.stage = Stage::Moved;
    match push_gamma_expand(tc, cx.info, true) {
      Some(expand) => InitStep::PushBefore(expand),
      None => InitStep::Inert,
    }
  }

  /// Works out the background value and its bit depth, giving `false` if
  /// there isn't a usable one.
  fn resolve_color(&mut self, tc: &RowDescriptor, cx: &mut InitContext<'_>) -> bool {
    let color = self.color.unwrap_or(BackgroundColor::Gray(0));
    let info = &*cx.info;
    let (depth, use_rgb) = if let BackgroundColor::Index(_) = color {
      (8, true)
    } else if self.need_expand && tc.palette {
      (8, true)
    } else if self.need_expand {
      (info.ihdr.bit_depth, info.ihdr.color_type.has_color())
    } else if info.output.format.contains(RowFormat::COLORMAP) {
      (8, info.output.format.contains(RowFormat::COLOR))
    } else {
      (info.output.bit_depth, info.output.format.contains(RowFormat::COLOR))
    };
    let raw = match color {
      BackgroundColor::Gray(y) => [u32::from(y); 3],
      BackgroundColor::Rgb(r, g, b) => [u32::from(r), u32::from(g), u32::from(b)],
      BackgroundColor::Index(i) => match info.palette.get(usize::from(i)) {
        Some(p) => [u32::from(p.r), u32::from(p.g), u32::from(p.b)],
        None => {
          cx.app_error(crate::error::AppError::BackgroundIndex);
          return false;
        }
      },
    };
    let mask = max_value(u32::from(depth));
    self.bg.bit_depth = depth;
    if use_rgb {
      self.bg.rgb = raw.map(|c| c & mask);
      self.bg.gray = self.bg.rgb[0] == self.bg.rgb[1] && self.bg.rgb[1] == self.bg.rgb[2];
    } else {
      self.bg.rgb = [raw[1] & mask; 3];
      self.bg.gray = true;
    }
    tracing::trace!("background {:?}", self.bg);
    true
  }

  fn init_alpha_linear(&mut self, tc: &mut RowDescriptor, cx: &mut InitContext<'_>) -> InitStep {
    if tc.bit_depth != 16 || !tc.format.contains(RowFormat::ALPHA) {
      tracing::debug!("compose found no linear alpha data: {:?} depth {}", tc.format, tc.bit_depth);
      return InitStep::Inert;
    }
    if !self.bg.gray && !tc.format.contains(RowFormat::COLOR) {
      // a color background needs the gray to rgb that would otherwise come later
      return InitStep::PushBefore(Transform::ByteOps(ByteOps::new(BYTE_OPS_GRAY_TO_RGB)));
    }
    if self.composing() {
      let mut transparent = self.clone();
      transparent.stage = Stage::Transparent;
      cx.add(order::REPLACE_TRANSPARENT, Transform::Compose(transparent));
    }
    self.bg.correct_to(tc.gamma, 16, cx.gamma_threshold);
    tc.invalid.insert(InvalidInfo::SBIT);
    tc.reset_sbit();
    self.mode = Mode::Composite;
    InitStep::Keep
  }

  fn init_transparent(&mut self, tc: &mut RowDescriptor, threshold: i32) -> InitStep {
    if !tc.format.contains(RowFormat::ALPHA) {
      return InitStep::Inert;
    }
    let (pixel, len) = self.bg.pixel(tc, threshold);
    tc.format.remove(RowFormat::ALPHA);
    tc.invalid.insert(InvalidInfo::SBIT);
    tc.reset_sbit();
    self.mode = Mode::StripTransparent { pixel, len };
    InitStep::Keep
  }

  pub fn run(&self, row: &mut [u8], tc: &mut RowDescriptor) {
    match self.mode {
      Mode::Pending => (),
      Mode::ReplaceTrns { transparent, pixel, len } => {
        replace_trns(row, tc, &transparent[..len], &pixel[..len]);
        tc.invalid.insert(InvalidInfo::TRNS | InvalidInfo::SBIT);
        tc.reset_sbit();
      }
      Mode::StripTransparent { pixel, len } => {
        strip_transparent(row, tc, &pixel[..len]);
        tc.format.remove(RowFormat::ALPHA);
        tc.invalid.insert(InvalidInfo::SBIT);
        tc.reset_sbit();
      }
      Mode::Composite => self.composite(row, tc),
    }
  }

  fn composite(&self, row: &mut [u8], tc: &RowDescriptor) {
    let n = tc.channels() as usize;
    let colors = n - 1;
    let compose = self.composing();
    for x in 0..tc.width as usize {
      let base = x * n;
      let alpha = get_sample(row, base + colors, 16, false);
      match alpha {
        0 => row[base * 2..(base + n) * 2].fill(0),
        0xFFFF => (),
        _ => {
          for c in 0..colors {
            let bg = if colors == 1 { self.bg.rgb[1] } else { self.bg.rgb[c] };
            let mut v = get_sample(row, base + c, 16, false) * alpha + bg * (0xFFFF - alpha);
            v += v >> 16;
            v += v >> 31;
            v += 32768;
            v >>= 16;
            put_sample(row, base + c, 16, false, v);
          }
          if compose {
            put_sample(row, base + colors, 16, false, 0xFFFF);
          }
        }
      }
    }
  }
}

/// There's a single tRNS color that still applies to the rows.
#[inline]
fn lone_trns(tc: &RowDescriptor, info: &ImageInfo) -> bool {
  !tc.palette && info.num_trans() == 1 && tc.trns_valid()
}

fn replace_trns(row: &mut [u8], tc: &RowDescriptor, transparent: &[u8], pixel: &[u8]) {
  let width = tc.width as usize;
  if tc.bit_depth < 8 {
    let mask = max_value(u32::from(tc.bit_depth));
    let t = u32::from(transparent[0]) & mask;
    let p = u32::from(pixel[0]) & mask;
    for x in 0..width {
      if get_packed(row, x, tc.bit_depth, false) == t {
        put_packed(row, x, tc.bit_depth, false, p);
      }
    }
  } else {
    for px in row[..width * transparent.len()].chunks_exact_mut(transparent.len()) {
      if px == transparent {
        px.copy_from_slice(pixel);
      }
    }
  }
}

fn strip_transparent(row: &mut [u8], tc: &RowDescriptor, pixel: &[u8]) {
  let color_bytes = pixel.len();
  let alpha_bytes = usize::from(tc.bit_depth / 8);
  let in_px = color_bytes + alpha_bytes;
  for x in 0..tc.width as usize {
    let src = x * in_px;
    let dst = x * color_bytes;
    if row[src + color_bytes..src + in_px].iter().all(|&b| b == 0) {
      row[dst..dst + color_bytes].copy_from_slice(pixel);
    } else {
      row.copy_within(src..src + color_bytes, dst);
    }
  }
}
