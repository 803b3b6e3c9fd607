//! Per-pixel filters over 2D slices.
//!
//! Every filter returns a new array with the shape of its input and runs its
//! per-pixel loop on the rayon thread pool.

use ndarray::{Array2, ArrayView2, Zip};

/// Red, green, blue, alpha in `[0, 1]`
pub type Rgba = [f32; 4];

/// Cells strictly above this value are colored by [`colorize`]
pub const THRESHOLD: f32 = 0.5;

pub const TRANSPARENT: Rgba = [0.0, 0.0, 0.0, 0.0];

/// Responds to intensity changes along the row (left to right)
pub const VERTICAL_KERNEL: [[f32; 3]; 3] = [[-1.0, 0.0, 1.0], [-1.0, 0.0, 1.0], [-1.0, 0.0, 1.0]];

/// Responds to intensity changes along the column (top to bottom)
pub const HORIZONTAL_KERNEL: [[f32; 3]; 3] =
    [[-1.0, -1.0, -1.0], [0.0, 0.0, 0.0], [1.0, 1.0, 1.0]];

/// Map every cell above [`THRESHOLD`] to `color` and every other cell to
/// fully transparent black.
pub fn colorize(slice: ArrayView2<'_, f32>, color: Rgba) -> Array2<Rgba> {
    Zip::from(&slice).par_map_collect(|&value| if value > THRESHOLD { color } else { TRANSPARENT })
}

/// Binary mask holding 1.0 where `predicate` accepts the cell value and
/// 0.0 elsewhere.
pub fn mask<P>(slice: ArrayView2<'_, f32>, predicate: P) -> Array2<f32>
where
    P: Fn(f32) -> bool + Sync,
{
    Zip::from(&slice).par_map_collect(|&value| if predicate(value) { 1.0 } else { 0.0 })
}

/// Edge map: elementwise maximum of the absolute responses to
/// [`VERTICAL_KERNEL`] and [`HORIZONTAL_KERNEL`]. NaN in either response
/// is kept, like `numpy.maximum`.
pub fn edges(slice: ArrayView2<'_, f32>) -> Array2<f32> {
    let vertical = convolve3x3(slice, &VERTICAL_KERNEL);
    let horizontal = convolve3x3(slice, &HORIZONTAL_KERNEL);
    Zip::from(&vertical)
        .and(&horizontal)
        .par_map_collect(|&v, &h| {
            if v.is_nan() || h.is_nan() {
                f32::NAN
            } else {
                v.abs().max(h.abs())
            }
        })
}

/// 2D convolution with a 3x3 kernel.
///
/// The kernel is flipped (true convolution, not correlation) and borders are
/// extended in `reflect` mode, `(c b a | a b c | c b a)`, which is the
/// default of `scipy.ndimage.convolve`. Sums are accumulated in `f64` and
/// zero weights are skipped, so a NaN under a zero tap does not leak into
/// the output.
pub fn convolve3x3(input: ArrayView2<'_, f32>, kernel: &[[f32; 3]; 3]) -> Array2<f32> {
    let (height, width) = input.dim();
    let mut output = Array2::<f32>::zeros((height, width));

    let taps: Vec<(isize, isize, f64)> = kernel
        .iter()
        .enumerate()
        .flat_map(|(ky, row)| {
            row.iter()
                .enumerate()
                .map(move |(kx, &weight)| (1 - ky as isize, 1 - kx as isize, f64::from(weight)))
        })
        .filter(|&(_, _, weight)| weight.abs() > f64::EPSILON)
        .collect();

    Zip::indexed(&mut output).par_for_each(|(y, x), out| {
        let mut acc = 0.0f64;
        for &(dy, dx, weight) in &taps {
            let sy = reflect_index(y as isize + dy, height);
            let sx = reflect_index(x as isize + dx, width);
            acc += weight * f64::from(input[[sy, sx]]);
        }
        *out = acc as f32;
    });

    output
}

/// Reflect an out-of-bounds index back into `0..size` (half-sample
/// symmetric, the edge sample is repeated).
#[inline]
fn reflect_index(i: isize, size: usize) -> usize {
    let s = size as isize;
    if i < 0 {
        (-i - 1).rem_euclid(s) as usize
    } else if i >= s {
        (2 * s - i - 1).rem_euclid(s) as usize
    } else {
        i as usize
    }
}
