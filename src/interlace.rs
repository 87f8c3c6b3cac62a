//! Adam7 interlacing.
//!
//! The PNG interlacing scheme converts a full image to 7 reduced images
//! ("passes"), each with potentially separate dimensions:
//!
//! ```txt
//! 1 6 4 6 2 6 4 6
//! 7 7 7 7 7 7 7 7
//! 5 6 5 6 5 6 5 6
//! 7 7 7 7 7 7 7 7
//! 3 6 4 6 3 6 4 6
//! 7 7 7 7 7 7 7 7
//! 5 6 5 6 5 6 5 6
//! 7 7 7 7 7 7 7 7
//! ```
//!
//! Pass indexes in this crate's API are `0..7`.

/// `(x_mul, x_off, y_mul, y_off)` for each of the 7 passes.
pub const ADAM7: [(u32, u32, u32, u32); 7] = [
  (8, 0, 8, 0),
  (8, 4, 8, 0),
  (4, 0, 8, 4),
  (4, 2, 4, 0),
  (2, 0, 4, 2),
  (2, 1, 2, 0),
  (1, 0, 2, 1),
];

/// Given the dimensions of the full PNG image, computes the size of each
/// reduced image.
///
/// The output uses index 0 as the base image size, and indexes 1 through 7 for
/// the size of reduced images 1 through 7.
#[inline]
#[must_use]
pub const fn reduced_image_dimensions(full_width: u32, full_height: u32) -> [(u32, u32); 8] {
  let full_patterns_wide = full_width / 8;
  let full_patterns_high = full_height / 8;
  //
  let partial_pattern_width = full_width % 8;
  let partial_pattern_height = full_height % 8;
  //
  let zero = (full_width, full_height);
  //
  let first = (
    full_patterns_wide + (partial_pattern_width + 7) / 8,
    full_patterns_high + (partial_pattern_height + 7) / 8,
  );
  let second = (
    full_patterns_wide + (partial_pattern_width + 3) / 8,
    full_patterns_high + (partial_pattern_height + 7) / 8,
  );
  let third = (
    full_patterns_wide * 2 + ((partial_pattern_width + 3) / 4),
    full_patterns_high + ((partial_pattern_height + 3) / 8),
  );
  let fourth = (
    full_patterns_wide * 2 + (partial_pattern_width + 1) / 4,
    full_patterns_high * 2 + (partial_pattern_height + 3) / 4,
  );
  let fifth = (
    full_patterns_wide * 4 + ((partial_pattern_width + 1) / 2),
    full_patterns_high * 2 + (partial_pattern_height + 1) / 4,
  );
  let sixth = (
    full_patterns_wide * 4 + partial_pattern_width / 2,
    full_patterns_high * 4 + ((partial_pattern_height + 1) / 2),
  );
  let seventh = (
    full_patterns_wide * 8 + partial_pattern_width,
    full_patterns_high * 4 + (partial_pattern_height / 2),
  );
  //
  [zero, first, second, third, fourth, fifth, sixth, seventh]
}

/// Converts a pass location into the full image location.
///
/// ## Panics
/// * If the pass exceeds 6.
#[inline]
#[must_use]
pub const fn pass_pos_to_full_pos(pass: usize, reduced_x: u32, reduced_y: u32) -> (u32, u32) {
  let (x_mul, x_off, y_mul, y_off) = ADAM7[pass];
  (reduced_x * x_mul + x_off, reduced_y * y_mul + y_off)
}

/// If image row `y` holds any pixels of `pass`.
#[inline]
#[must_use]
pub const fn row_in_pass(y: u32, pass: usize) -> bool {
  let (_, _, y_mul, y_off) = ADAM7[pass];
  y % y_mul == y_off
}

/// If image column `x` holds a pixel of `pass`.
#[inline]
#[must_use]
pub const fn col_in_pass(x: u32, pass: usize) -> bool {
  let (x_mul, x_off, _, _) = ADAM7[pass];
  x % x_mul == x_off
}

#[inline]
fn get_pixel(row: &[u8], x: usize, pixel_bits: usize) -> u32 {
  if pixel_bits >= 8 {
    0
  } else {
    let bit = x * pixel_bits;
    let shift = 8 - pixel_bits - (bit % 8);
    u32::from((row[bit / 8] >> shift) & ((1 << pixel_bits) - 1) as u8)
  }
}

#[inline]
fn put_pixel(row: &mut [u8], x: usize, pixel_bits: usize, value: u32) {
  let bit = x * pixel_bits;
  let shift = 8 - pixel_bits - (bit % 8);
  let mask = (((1_u32 << pixel_bits) - 1) as u8) << shift;
  let byte = &mut row[bit / 8];
  *byte = (*byte & !mask) | (((value as u8) << shift) & mask);
}

/// Expands a compact pass row to a full width display row.
///
/// Every pass pixel is replicated across the columns up to the next pass
/// pixel, so an early pass gives a blocky but complete preview row.
/// `full_row` must be at least the row byte size of `full_width` pixels.
pub fn expand_pass_row(
  pass_row: &[u8], full_row: &mut [u8], pass: usize, full_width: u32, pixel_bits: usize,
) {
  let (x_mul, x_off, _, _) = ADAM7[pass];
  let pixel_bytes = pixel_bits / 8;
  for x in 0..full_width {
    // the column of the pass pixel this column copies; columns left of the
    // first pass pixel copy the first one.
    let px = if x < x_off { 0 } else { (x - x_off) / x_mul } as usize;
    if pixel_bits >= 8 {
      let src = &pass_row[px * pixel_bytes..(px + 1) * pixel_bytes];
      full_row[x as usize * pixel_bytes..(x as usize + 1) * pixel_bytes].copy_from_slice(src);
    } else {
      let v = get_pixel(pass_row, px, pixel_bits);
      put_pixel(full_row, x as usize, pixel_bits, v);
    }
  }
}

/// Copies only the pixels that belong to `pass` from a display row (as made by
/// [`expand_pass_row`]) into an image row.
///
/// Calling this for every delivered pass row rebuilds the exact image.
pub fn combine_row(image_row: &mut [u8], display_row: &[u8], pass: usize, full_width: u32, pixel_bits: usize) {
  let pixel_bytes = pixel_bits / 8;
  for x in (0..full_width).filter(|&x| col_in_pass(x, pass)) {
    if pixel_bits >= 8 {
      let r = x as usize * pixel_bytes..(x as usize + 1) * pixel_bytes;
      image_row[r.clone()].copy_from_slice(&display_row[r]);
    } else {
      let v = get_pixel(display_row, x as usize, pixel_bits);
      put_pixel(image_row, x as usize, pixel_bits, v);
    }
  }
}

/// Gathers the pixels of `pass` out of an image row into a compact pass row.
pub(crate) fn gather_pass_row(pass_row: &mut [u8], image_row: &[u8], pass: usize, pass_width: u32, pixel_bits: usize) {
  let pixel_bytes = pixel_bits / 8;
  for px in 0..pass_width as usize {
    let (x, _) = pass_pos_to_full_pos(pass, px as u32, 0);
    let x = x as usize;
    if pixel_bits >= 8 {
      pass_row[px * pixel_bytes..(px + 1) * pixel_bytes]
        .copy_from_slice(&image_row[x * pixel_bytes..(x + 1) * pixel_bytes]);
    } else {
      let v = get_pixel(image_row, x, pixel_bits);
      put_pixel(pass_row, px, pixel_bits, v);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_reduced_image_dimensions() {
    assert_eq!(reduced_image_dimensions(0, 0), [(0, 0); 8]);
    // one
    for (w, ex) in (1..=8).zip([1, 1, 1, 1, 1, 1, 1, 1]) {
      assert_eq!(reduced_image_dimensions(w, 0)[1].0, ex, "failed w:{}", w);
    }
    // two
    for (w, ex) in (1..=8).zip([0, 0, 0, 0, 1, 1, 1, 1]) {
      assert_eq!(reduced_image_dimensions(w, 0)[2].0, ex, "failed w:{}", w);
    }
    // three
    for (h, ex) in (1..=8).zip([0, 0, 0, 0, 1, 1, 1, 1]) {
      assert_eq!(reduced_image_dimensions(0, h)[3].1, ex, "failed h: {}", h);
    }
    // six
    for (w, ex) in (1..=8).zip([0, 1, 1, 2, 2, 3, 3, 4]) {
      assert_eq!(reduced_image_dimensions(w, 0)[6].0, ex, "failed w: {}", w);
    }
    // seven
    for (h, ex) in (1..=8).zip([0, 1, 1, 2, 2, 3, 3, 4]) {
      assert_eq!(reduced_image_dimensions(0, h)[7].1, ex, "failed h: {}", h);
    }
    assert_eq!(
      reduced_image_dimensions(8, 8),
      [(8, 8), (1, 1), (1, 1), (2, 1), (2, 2), (4, 2), (4, 4), (8, 4)]
    );
  }

  #[test]
  fn test_dimensions_agree_with_membership() {
    for w in 1..20 {
      for h in 1..20 {
        let dims = reduced_image_dimensions(w, h);
        for pass in 0..7 {
          let cols = (0..w).filter(|&x| col_in_pass(x, pass)).count() as u32;
          let rows = (0..h).filter(|&y| row_in_pass(y, pass)).count() as u32;
          assert_eq!(dims[pass + 1], (cols, rows), "w{w} h{h} pass{pass}");
        }
      }
    }
  }

  #[test]
  fn test_expand_then_combine_is_exact() {
    // 2-bit pixels, 11 wide
    let width = 11;
    let mut image = [0_u8; 3];
    let mut expected = [0_u8; 3];
    for x in 0..width {
      put_pixel(&mut expected, x, 2, (x as u32 * 3 + 1) % 4);
    }
    for pass in 0..7 {
      let pass_width = reduced_image_dimensions(width as u32, 1)[pass + 1].0;
      if pass_width == 0 {
        continue;
      }
      let mut pass_row = [0_u8; 3];
      gather_pass_row(&mut pass_row, &expected, pass, pass_width, 2);
      let mut display = [0_u8; 3];
      expand_pass_row(&pass_row, &mut display, pass, width as u32, 2);
      combine_row(&mut image, &display, pass, width as u32, 2);
    }
    assert_eq!(image, expected);
  }
}
