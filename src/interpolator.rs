use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;

use crate::volume::SliceSpacing;

/// Output (height, width) giving square pixels at the finer of the two
/// spacings of a slice. `spacing` is ordered like the slice axes.
pub fn isotropic_dimensions(dim: (usize, usize), spacing: SliceSpacing) -> (usize, usize) {
    let [row_spacing, col_spacing] = spacing;
    let min_spacing = row_spacing.min(col_spacing);
    if !(min_spacing > 0.0) {
        return dim;
    }
    let inv_min_spacing = 1.0 / min_spacing;

    let new_height = (dim.0 as f32 * row_spacing * inv_min_spacing) as usize;
    let new_width = (dim.1 as f32 * col_spacing * inv_min_spacing) as usize;

    (new_height.max(1), new_width.max(1))
}

/// Resample a slice with bilinear interpolation so that its pixels are
/// square in physical space.
pub fn resample_isotropic(slice: ArrayView2<'_, f32>, spacing: SliceSpacing) -> Array2<f32> {
    let (slice_height, slice_width) = slice.dim();
    if slice_height == 0 || slice_width == 0 {
        return slice.to_owned();
    }
    let (height, width) = isotropic_dimensions(slice.dim(), spacing);
    let mut output = Array2::<f32>::zeros((height, width));

    output
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(y, mut row)| {
            for (x, out) in row.iter_mut().enumerate() {
                // normalized coordinates with a half-pixel offset
                let norm_x = (x as f32 + 0.5) / width as f32;
                let norm_y = (y as f32 + 0.5) / height as f32;

                let src_x = norm_x * slice_width as f32 - 0.5;
                let src_y = norm_y * slice_height as f32 - 0.5;

                let src_x = src_x.max(0.0).min((slice_width - 1) as f32);
                let src_y = src_y.max(0.0).min((slice_height - 1) as f32);

                *out = bilinear_interpolate(&slice, src_y, src_x);
            }
        });

    output
}

#[inline]
pub(crate) fn bilinear_interpolate(slice: &ArrayView2<f32>, y: f32, x: f32) -> f32 {
    let (height, width) = slice.dim();

    let y0 = y.floor() as usize;
    let x0 = x.floor() as usize;
    let y1 = (y0 + 1).min(height - 1);
    let x1 = (x0 + 1).min(width - 1);

    let dy = y - y0 as f32;
    let dx = x - x0 as f32;
    let one_minus_dx = 1.0 - dx;
    let one_minus_dy = 1.0 - dy;

    let v00 = slice[[y0, x0]];
    let v01 = slice[[y0, x1]];
    let v10 = slice[[y1, x0]];
    let v11 = slice[[y1, x1]];

    let v0 = v00.mul_add(one_minus_dx, v01 * dx);
    let v1 = v10.mul_add(one_minus_dx, v11 * dx);

    v0.mul_add(one_minus_dy, v1 * dy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn isotropic_dimensions_stretch_coarse_axis() {
        assert_eq!(isotropic_dimensions((10, 20), [2.0, 1.0]), (20, 20));
        assert_eq!(isotropic_dimensions((10, 20), [1.0, 1.0]), (10, 20));
        assert_eq!(isotropic_dimensions((4, 4), [0.5, 1.5]), (4, 12));
        assert_eq!(isotropic_dimensions((4, 4), [0.0, 1.0]), (4, 4));
    }

    #[test]
    fn bilinear_hits_grid_points_and_midpoints() {
        let slice = array![[0.0f32, 2.0], [4.0, 6.0]];
        let view = slice.view();
        assert_eq!(bilinear_interpolate(&view, 0.0, 0.0), 0.0);
        assert_eq!(bilinear_interpolate(&view, 1.0, 1.0), 6.0);
        assert_eq!(bilinear_interpolate(&view, 0.5, 0.5), 3.0);
        assert_eq!(bilinear_interpolate(&view, 0.0, 0.5), 1.0);
    }

    #[test]
    fn resample_keeps_isotropic_slice() {
        let slice = array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let resampled = resample_isotropic(slice.view(), [0.5, 0.5]);
        assert_eq!(resampled.dim(), slice.dim());
        for (a, b) in resampled.iter().zip(slice.iter()) {
            assert!((a - b).abs() < 1e-5, "{a} != {b}");
        }
    }

    #[test]
    fn resample_doubles_rows_for_double_row_spacing() {
        let slice = array![[1.0f32, 1.0], [3.0, 3.0]];
        let resampled = resample_isotropic(slice.view(), [2.0, 1.0]);
        assert_eq!(resampled.dim(), (4, 2));
        // rows are clamped at the borders and blended in between
        assert_eq!(resampled.column(0).to_vec(), vec![1.0, 1.5, 2.5, 3.0]);
    }
}
