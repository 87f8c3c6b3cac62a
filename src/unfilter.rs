//! From the PNG spec:
//!
//! > Filters are applied to **bytes**, not to pixels, regardless of the bit
//! > depth or color type of the image.
//!
//! Each filtered row is undone against the previous row of the same pass. The
//! first row of a pass has an all-zero previous row.

/// The filter types, in the order of their tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FilterType {
  None = 0,
  Sub = 1,
  Up = 2,
  Average = 3,
  Paeth = 4,
}
impl TryFrom<u8> for FilterType {
  type Error = ();
  #[inline]
  fn try_from(value: u8) -> Result<Self, Self::Error> {
    Ok(match value {
      0 => Self::None,
      1 => Self::Sub,
      2 => Self::Up,
      3 => Self::Average,
      4 => Self::Paeth,
      _ => return Err(()),
    })
  }
}
impl FilterType {
  pub const ALL: [Self; 5] = [Self::None, Self::Sub, Self::Up, Self::Average, Self::Paeth];
}

/// Undoes the filter of one row in place.
///
/// * `bpp` is the filter unit: bytes per pixel, rounded up to at least 1.
/// * `prev` is the reconstructed previous row of the pass, or empty for the
///   first row.
pub fn unfilter_row(filter: FilterType, row: &mut [u8], prev: &[u8], bpp: usize) {
  debug_assert!(prev.is_empty() || prev.len() == row.len());
  match filter {
    FilterType::None => (),
    FilterType::Sub => {
      for i in bpp..row.len() {
        row[i] = reconstruct_sub(row[i], row[i - bpp]);
      }
    }
    FilterType::Up => {
      if !prev.is_empty() {
        for (x, b) in row.iter_mut().zip(prev) {
          *x = reconstruct_up(*x, *b);
        }
      }
    }
    FilterType::Average => {
      let up = |i: usize| prev.get(i).copied().unwrap_or(0);
      for i in 0..row.len() {
        let a = if i >= bpp { row[i - bpp] } else { 0 };
        row[i] = reconstruct_average(row[i], a, up(i));
      }
    }
    FilterType::Paeth => {
      let up = |i: usize| prev.get(i).copied().unwrap_or(0);
      for i in 0..row.len() {
        let (a, c) = if i >= bpp { (row[i - bpp], up(i - bpp)) } else { (0, 0) };
        row[i] = reconstruct_paeth(row[i], a, up(i), c);
      }
    }
  }
}

/// Applies `filter` to `row`, writing the filtered bytes to `out`.
pub fn filter_row(filter: FilterType, row: &[u8], prev: &[u8], bpp: usize, out: &mut [u8]) {
  let up = |i: usize| prev.get(i).copied().unwrap_or(0);
  let left = |i: usize| if i >= bpp { row[i - bpp] } else { 0 };
  for (i, (o, &x)) in out.iter_mut().zip(row).enumerate() {
    *o = match filter {
      FilterType::None => x,
      FilterType::Sub => x.wrapping_sub(left(i)),
      FilterType::Up => x.wrapping_sub(up(i)),
      FilterType::Average => x.wrapping_sub(((u16::from(left(i)) + u16::from(up(i))) / 2) as u8),
      FilterType::Paeth => {
        let c = if i >= bpp { up(i - bpp) } else { 0 };
        x.wrapping_sub(paeth_predictor(left(i), up(i), c))
      }
    };
  }
}

/// Reconstruct Filter Type 1
///
/// * `fx` filtered X
/// * `ra` reconstructed `a`: the corresponding byte of the pixel to the left
const fn reconstruct_sub(fx: u8, ra: u8) -> u8 {
  fx.wrapping_add(ra)
}

/// Reconstruct Filter Type 2
///
/// * `fx` filtered X
/// * `rb` reconstructed `b`: the byte corresponding to this byte within the
///   previous scanline.
const fn reconstruct_up(fx: u8, rb: u8) -> u8 {
  fx.wrapping_add(rb)
}

/// Reconstruct Filter Type 3
///
/// The average is taken without overflow.
const fn reconstruct_average(fx: u8, ra: u8, rb: u8) -> u8 {
  fx.wrapping_add(((ra as u16 + rb as u16) / 2) as u8)
}

/// Reconstruct Filter Type 4
///
/// * `rc` reconstructed `c`: the byte above `a`.
const fn reconstruct_paeth(fx: u8, ra: u8, rb: u8, rc: u8) -> u8 {
  fx.wrapping_add(paeth_predictor(ra, rb, rc))
}

/// The Paeth filter function computes a simple linear function of the three
/// neighboring pixels (left `a`, above `b`, upper left `c`).
///
/// The output is the "predictor" of the neighboring pixel closest to the
/// computed value.
#[inline]
#[must_use]
pub(crate) const fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
  // "The calculations within the PaethPredictor function shall be performed
  // exactly, without overflow."
  let a_ = a as i32;
  let b_ = b as i32;
  let c_ = c as i32;
  let p = a_ + b_ - c_;
  let pa = (p - a_).abs();
  let pb = (p - b_).abs();
  let pc = (p - c_).abs();
  // the order of these tests is fixed by the standard
  if pa <= pb && pa <= pc {
    a
  } else if pb <= pc {
    b
  } else {
    c
  }
}
