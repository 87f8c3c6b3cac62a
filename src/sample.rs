//! Per-sample conversions: bit depth changes and gamma encoding.
//!
//! Gamma values are fixed point with [`FP_1`] meaning 1.0. A gamma value is
//! an *encoding exponent*: a sample `s` of gamma `g` holds `linear^g`. A value
//! of `0` means "unknown" everywhere in this crate.
//!
//! Gamma correction uses an integer log2/exp2 approximation so that results
//! are identical on every platform.

use crate::error::AppError;

/// The fixed point value of 1.0
pub const FP_1: i32 = 100_000;

/// The default threshold used by [`gamma_significant`].
pub const GAMMA_THRESHOLD: i32 = 5_000;

/// The sRGB encoding exponent (`1/2.2`).
pub const GAMMA_SRGB_INVERSE: i32 = 45_455;

/// The encoding exponent of the old Mac "1.8" displays.
pub const GAMMA_MAC_INVERSE: i32 = 65_909;

/// Flag for [`translate_gamma`]: the sRGB value.
pub const GAMMA_FLAG_SRGB: i32 = -1;

/// Flag for [`translate_gamma`]: the old Mac value.
pub const GAMMA_FLAG_MAC: i32 = -2;

const GAMMA_SRGB: i32 = 220_000;
const GAMMA_MAC_OLD: i32 = 151_724;

/// The largest value of `bits` bits.
#[inline]
#[must_use]
pub const fn max_value(bits: u32) -> u32 {
  (1 << bits) - 1
}

/// Computes `a * times / divisor` rounded to nearest.
///
/// Gives `None` if the divisor is zero or the result doesn't fit in `i32`.
#[inline]
#[must_use]
pub fn muldiv(a: i32, times: i32, divisor: i32) -> Option<i32> {
  if divisor == 0 {
    return None;
  }
  if a == 0 || times == 0 {
    return Some(0);
  }
  let r = i64::from(a) * i64::from(times);
  let d = i64::from(divisor);
  let negative = (r < 0) != (d < 0);
  let (r, d) = (r.unsigned_abs(), d.unsigned_abs());
  let q = i64::try_from((r + d / 2) / d).ok()?;
  i32::try_from(if negative { -q } else { q }).ok()
}

/// `1/a` in fixed point, or 0 on overflow.
#[inline]
#[must_use]
pub fn reciprocal(a: i32) -> i32 {
  muldiv(FP_1, FP_1, a).unwrap_or(0)
}

/// If a correction factor is far enough from 1.0 to be worth applying.
#[inline]
#[must_use]
pub const fn gamma_significant(gamma: i32, threshold: i32) -> bool {
  if gamma < FP_1 {
    gamma < FP_1 - threshold
  } else if gamma > FP_1 {
    gamma > FP_1 + threshold
  } else {
    false
  }
}

/// Compares two gamma values.
///
/// Gives `None` when no correction is needed: either value is unknown, they
/// are the same, or the samples are only 1 bit. Otherwise gives the correction
/// exponent `g2/g1` that converts samples encoded with `g1` to `g2`.
#[must_use]
pub fn gamma_correction(g1: i32, g2: i32, sbits: u32, threshold: i32) -> Option<i32> {
  if sbits == 1 || g1 == 0 || g2 == 0 || g1 == g2 {
    return None;
  }
  // an overflow here means a correction we can't express, so we skip it
  let c = muldiv(g2, FP_1, g1)?;
  if gamma_significant(c, threshold) {
    Some(c)
  } else {
    None
  }
}

/// `gamma_correction(..).is_none()`
#[inline]
#[must_use]
pub fn gamma_equal(g1: i32, g2: i32, sbits: u32, threshold: i32) -> bool {
  gamma_correction(g1, g2, sbits, threshold).is_none()
}

/// Converts a user supplied gamma into an encoding exponent.
///
/// The sRGB and old Mac flag values are recognized. A screen gamma is a
/// decoding exponent, so its reciprocal is returned.
pub fn translate_gamma(gamma: i32, is_screen: bool) -> Result<i32, AppError> {
  match gamma {
    GAMMA_FLAG_SRGB | GAMMA_SRGB => Ok(GAMMA_SRGB_INVERSE),
    GAMMA_FLAG_MAC | GAMMA_MAC_OLD => Ok(GAMMA_MAC_INVERSE),
    g if is_screen => {
      if g < 5 {
        Err(AppError::ScreenGammaTooLow)
      } else if g == FP_1 {
        Ok(FP_1)
      } else {
        Ok(reciprocal(g))
      }
    }
    g if g <= 0 => Err(AppError::FileGammaTooLow),
    g => Ok(g),
  }
}

/// `-log2(x/255) * 2^32` for the top 128 8-bit values.
const L2_8BIT: [u32; 128] = [
  4270715492, 4222494797, 4174646467, 4127164793, 4080044201, 4033279239, 3986864580, 3940795015,
  3895065449, 3849670902, 3804606499, 3759867474, 3715449162, 3671346997, 3627556511, 3584073329,
  3540893168, 3498011834, 3455425220, 3413129301, 3371120137, 3329393864, 3287946700, 3246774933,
  3205874930, 3165243125, 3124876025, 3084770202, 3044922296, 3005329011, 2965987113, 2926893432,
  2888044853, 2849438323, 2811070844, 2772939474, 2735041326, 2697373562, 2659933400, 2622718104,
  2585724991, 2548951424, 2512394810, 2476052606, 2439922311, 2404001468, 2368287663, 2332778523,
  2297471715, 2262364947, 2227455964, 2192742551, 2158222529, 2123893754, 2089754119, 2055801552,
  2022034013, 1988449497, 1955046031, 1921821672, 1888774511, 1855902668, 1823204291, 1790677560,
  1758320682, 1726131893, 1694109454, 1662251657, 1630556815, 1599023271, 1567649391, 1536433567,
  1505374214, 1474469770, 1443718700, 1413119487, 1382670639, 1352370686, 1322218179, 1292211689,
  1262349810, 1232631153, 1203054352, 1173618059, 1144320946, 1115161701, 1086139034, 1057251672,
  1028498358, 999877854, 971388940, 943030410, 914801076, 886699767, 858725327, 830876614,
  803152505, 775551890, 748073672, 720716771, 693480120, 666362667, 639363374, 612481215,
  585715177, 559064263, 532527486, 506103872, 479792461, 453592303, 427502463, 401522014,
  375650043, 349885648, 324227938, 298676034, 273229066, 247886176, 222646516, 197509248,
  172473545, 147538590, 122703574, 97967701, 73330182, 48790236, 24347096, 0,
];

/// `log2(2^n - 1)` as a 4.28 value, per bit count `n` in `1..=16`.
const LOG_FACTORS: [u32; 16] = [
  4294961387, 3869501255, 3541367788, 3246213428, 2965079441, 2690447525, 2418950626, 2148993476,
  1879799410, 1610985205, 1342360514, 1073830475, 805347736, 536888641, 268441365, 0,
];

/// `2^(-i/16) * 2^32` for `i` in `0..16` (the first entry saturated).
const EXP_32BIT: [u32; 16] = [
  4294967295, 4112874773, 3938502376, 3771522796, 3611622603, 3458501653, 3311872529, 3171459999,
  3037000500, 2908241642, 2784941738, 2666869345, 2553802834, 2445529972, 2341847524, 2242560872,
];

/// Per bit count `n`: the `lg2` at or below which the result is the max
/// value, and the one above which the result is 0.
const EXP_LIMITS: [(i32, i32); 16] = [
  (65535, 65535),
  (17238, 169408),
  (7006, 249518),
  (3205, 321577),
  (1537, 390214),
  (753, 457263),
  (372, 523546),
  (185, 589453),
  (92, 655175),
  (46, 720803),
  (23, 786385),
  (11, 851944),
  (5, 917492),
  (2, 983034),
  (1, 1048573),
  (0, 1114110),
];

/// `-log2(x / 65536)` as a 16.16 value, with `factor` (4.28) subtracted.
fn log_with_factor(x: u32, factor: u32) -> i32 {
  let mut x = x & 0xFFFF;
  if x == 0 {
    return -0xF_FFFF;
  }
  let mut lg2: u32 = 0;
  if x & 0xFF00 == 0 {
    lg2 = 8;
    x <<= 8;
  }
  if x & 0xF000 == 0 {
    lg2 += 4;
    x <<= 4;
  }
  if x & 0xC000 == 0 {
    lg2 += 2;
    x <<= 2;
  }
  if x & 0x8000 == 0 {
    lg2 += 1;
    x <<= 1;
  }
  lg2 <<= 28;
  lg2 = lg2.wrapping_add((L2_8BIT[(x >> 8) as usize - 128] + 8) >> 4);

  // interpolate the low 8 bits
  let i = ((x << 16) + (x >> 9)) / (x >> 8);
  let i = i.wrapping_sub(1 << 24);
  if i <= 65536 {
    lg2 = lg2.wrapping_add((23591 * (65536 - i) + (1 << 9)) >> 10);
  } else {
    lg2 = lg2.wrapping_sub((23499 * (i - 65536) + (1 << 9)) >> 10);
  }

  if lg2 >= factor {
    ((lg2 - factor + 2048) >> 12) as i32
  } else {
    -(((factor - lg2 + 2048) >> 12) as i32)
  }
}

/// `-log2(x / (2^n - 1))` as a 16.16 fixed point value.
///
/// `x` must be non-zero and `n` in `1..=16`.
#[inline]
#[must_use]
pub fn log_nbit(x: u32, n: u32) -> i32 {
  log_with_factor(x, LOG_FACTORS[n as usize - 1])
}

/// `2^(-x / 65536)` as a 0.32 fixed point value, for `x` in `0..=0x1F_FFFF`.
fn exp(x: i32) -> u32 {
  let mut e = EXP_32BIT[((x >> 12) & 0xF) as usize];
  let steps: [(i32, u32, u32); 6] = [
    (0x800, 44938, 5),
    (0x400, 45181, 6),
    (0x200, 45303, 7),
    (0x100, 45365, 8),
    (0x080, 45395, 9),
    (0x040, 45410, 10),
  ];
  for (bit, mul, shift) in steps {
    if x & bit != 0 {
      e -= ((e >> 16) * mul + (1 << (shift - 1))) >> shift;
    }
  }
  e -= ((e >> 16) * 355 * (x as u32 & 0x3F) + 256) >> 9;
  e >> (x >> 16)
}

/// Inverse of [`log_nbit`]: `2^(-lg2/65536) * (2^n - 1)` rounded.
#[must_use]
pub fn exp_nbit(lg2: i32, n: u32) -> u32 {
  let (lo, hi) = EXP_LIMITS[n as usize - 1];
  if lg2 <= lo {
    max_value(n)
  } else if lg2 > hi {
    0
  } else {
    let mut x = exp(lg2);
    x -= x >> n;
    (x + ((1 << (31 - n)) - 1)) >> (32 - n)
  }
}

/// Raises an `n` bit sample to the power `gamma` (fixed point), giving an `m`
/// bit sample.
///
/// 0 maps to 0 and the max input maps to the max output.
#[must_use]
pub fn gamma_nxmbit_correct(value: u32, gamma: i32, n: u32, m: u32) -> u32 {
  if value == 0 {
    0
  } else if value >= max_value(n) {
    max_value(m)
  } else {
    let lg2 = log_nbit(value, n);
    match muldiv(gamma, lg2, FP_1) {
      Some(res) => exp_nbit(res, m),
      // an overflow is an underflow of the result
      None => 0,
    }
  }
}

/// [`gamma_nxmbit_correct`] for 8 bit samples.
#[inline]
#[must_use]
pub fn gamma_8bit_correct(value: u8, gamma: i32) -> u8 {
  gamma_nxmbit_correct(u32::from(value), gamma, 8, 8) as u8
}

/// [`gamma_nxmbit_correct`] for 16 bit samples.
#[inline]
#[must_use]
pub fn gamma_16bit_correct(value: u16, gamma: i32) -> u16 {
  gamma_nxmbit_correct(u32::from(value), gamma, 16, 16) as u16
}

/// Exact bit replication from `from` bits up to `to` bits.
///
/// This is the "left bit replication" of the PNG standard: `0b101` at 3 bits
/// becomes `0b1011_0110` at 8 bits. For `1/2/4 -> 8` it's the same as
/// [`bitfrob::u8_replicate_bits`].
#[must_use]
pub fn replicate(value: u32, from: u32, to: u32) -> u32 {
  debug_assert!(from >= 1 && from <= to && to <= 16);
  if from == to {
    return value;
  }
  if to == 8 && matches!(from, 1 | 2 | 4) {
    return u32::from(bitfrob::u8_replicate_bits(from, value as u8));
  }
  let value = value & max_value(from);
  let mut out: u32 = 0;
  let mut filled = 0;
  while filled < to {
    out = (out << from) | value;
    filled += from;
  }
  out >> (filled - to)
}

/// Rescales from `from` bits down to `to` bits, rounding to nearest.
#[inline]
#[must_use]
pub const fn scale_down(value: u32, from: u32, to: u32) -> u32 {
  let max_from = max_value(from);
  (value * max_value(to) + max_from / 2) / max_from
}

/// Keeps the high byte of a 16 bit sample.
#[inline]
#[must_use]
pub const fn chop_16_to_8(value: u16) -> u8 {
  (value >> 8) as u8
}

/// Rescales a 16 bit sample to 8 bits, rounding to nearest.
#[inline]
#[must_use]
pub const fn scale_16_to_8(value: u16) -> u8 {
  ((value as u32 * 255 + 32895) >> 16) as u8
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_muldiv() {
    assert_eq!(muldiv(3, 5, 2), Some(8));
    assert_eq!(muldiv(-3, 5, 2), Some(-8));
    assert_eq!(muldiv(1, 1, 0), None);
    assert_eq!(muldiv(i32::MAX, 4, 1), None);
    assert_eq!(reciprocal(220_000), 45_455);
    assert_eq!(reciprocal(0), 0);
  }

  #[test]
  fn test_gamma_significant() {
    assert!(!gamma_significant(FP_1, GAMMA_THRESHOLD));
    assert!(!gamma_significant(FP_1 + GAMMA_THRESHOLD, GAMMA_THRESHOLD));
    assert!(gamma_significant(FP_1 + GAMMA_THRESHOLD + 1, GAMMA_THRESHOLD));
    assert!(gamma_significant(FP_1 - GAMMA_THRESHOLD - 1, GAMMA_THRESHOLD));
  }

  #[test]
  fn test_gamma_equal() {
    assert!(gamma_equal(0, 45455, 8, GAMMA_THRESHOLD));
    assert!(gamma_equal(45455, 0, 8, GAMMA_THRESHOLD));
    assert!(gamma_equal(45455, 45455, 8, GAMMA_THRESHOLD));
    assert!(gamma_equal(45455, 46000, 8, GAMMA_THRESHOLD));
    assert!(gamma_equal(45455, FP_1, 1, GAMMA_THRESHOLD));
    assert_eq!(gamma_correction(45455, FP_1, 8, GAMMA_THRESHOLD), Some(219_998));
  }

  #[test]
  fn test_translate_gamma() {
    assert_eq!(translate_gamma(GAMMA_FLAG_SRGB, true), Ok(GAMMA_SRGB_INVERSE));
    assert_eq!(translate_gamma(220_000, true), Ok(GAMMA_SRGB_INVERSE));
    assert_eq!(translate_gamma(GAMMA_FLAG_MAC, false), Ok(GAMMA_MAC_INVERSE));
    assert_eq!(translate_gamma(FP_1, true), Ok(FP_1));
    assert_eq!(translate_gamma(200_000, true), Ok(50_000));
    assert_eq!(translate_gamma(4, true), Err(AppError::ScreenGammaTooLow));
    assert_eq!(translate_gamma(0, false), Err(AppError::FileGammaTooLow));
    assert_eq!(translate_gamma(50_000, false), Ok(50_000));
  }

  #[test]
  fn test_gamma_endpoints_saturate() {
    for (n, m) in [(1, 8), (2, 8), (4, 16), (8, 8), (8, 16), (16, 8), (16, 16)] {
      for g in [10_000, 45_455, FP_1, 220_000, 500_000] {
        assert_eq!(gamma_nxmbit_correct(0, g, n, m), 0);
        assert_eq!(gamma_nxmbit_correct(max_value(n), g, n, m), max_value(m));
        for v in [1, max_value(n) / 2, max_value(n) - 1] {
          assert!(gamma_nxmbit_correct(v, g, n, m) <= max_value(m));
        }
      }
    }
  }

  #[test]
  fn test_gamma_identity_exponent() {
    // a correction of 1.0 must be very nearly the identity
    for v in 0..=255_u8 {
      let out = i32::from(gamma_8bit_correct(v, FP_1));
      assert!((out - i32::from(v)).abs() <= 1, "{v} -> {out}");
    }
  }

  #[test]
  fn test_replicate() {
    assert_eq!(replicate(1, 1, 8), 0xFF);
    assert_eq!(replicate(0b10, 2, 8), 0b1010_1010);
    assert_eq!(replicate(0xA, 4, 8), 0xAA);
    assert_eq!(replicate(0b101, 3, 8), 0b1011_0110);
    assert_eq!(replicate(0x12, 8, 16), 0x1212);
    assert_eq!(replicate(1, 1, 16), 0xFFFF);
    for bits in [1, 2, 4, 8] {
      assert_eq!(replicate(0, bits, 16), 0);
      assert_eq!(replicate(max_value(bits), bits, 16), 0xFFFF);
    }
  }

  #[test]
  fn test_scale_down() {
    for from in [2, 4, 8, 16] {
      for to in [1, 2, 4, 8] {
        if to >= from {
          continue;
        }
        assert_eq!(scale_down(0, from, to), 0);
        assert_eq!(scale_down(max_value(from), from, to), max_value(to));
      }
    }
    for v in 0..=u16::MAX {
      assert_eq!(u32::from(scale_16_to_8(v)), scale_down(u32::from(v), 16, 8));
    }
    assert_eq!(chop_16_to_8(0x12FF), 0x12);
  }
}
