use image::{GrayImage, ImageBuffer, Luma, Rgba, RgbaImage};
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

use crate::filters;

#[inline]
fn normalize_to_u8(value: f32, min: f32, range: f32) -> u8 {
    if range > 0.0 {
        (((value - min) / range) * 255.0).round().clamp(0.0, 255.0) as u8
    } else {
        0
    }
}

#[inline]
fn unit_to_u8(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Grayscale image of a slice, stretched so that its minimum maps to 0 and
/// its maximum to 255. A constant slice renders black.
pub fn slice_to_image(slice: ArrayView2<'_, f32>) -> Option<GrayImage> {
    let (height, width) = slice.dim();
    let (min, max) = slice
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;

    // iter() walks in logical row-major order, whatever the memory layout
    let values: Vec<f32> = slice.iter().copied().collect();
    let pixel_data: Vec<u8> = values
        .into_par_iter()
        .map(|v| normalize_to_u8(v, min, range))
        .collect();
    ImageBuffer::<Luma<u8>, _>::from_raw(width as u32, height as u32, pixel_data)
}

/// 8-bit RGBA image from colorized pixels with channels in `[0, 1]`.
pub fn rgba_to_image(rgba: &Array2<filters::Rgba>) -> Option<RgbaImage> {
    let (height, width) = rgba.dim();
    let pixel_data: Vec<u8> = rgba
        .iter()
        .flat_map(|pixel| pixel.map(unit_to_u8))
        .collect();
    ImageBuffer::<Rgba<u8>, _>::from_raw(width as u32, height as u32, pixel_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::colorize;
    use ndarray::array;

    #[test]
    fn slice_is_stretched_to_full_range() {
        let slice = array![[-1.0f32, 0.0], [1.0, 3.0]];
        let image = slice_to_image(slice.view()).unwrap();
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.get_pixel(0, 0).0, [0]);
        assert_eq!(image.get_pixel(0, 1).0, [128]);
        assert_eq!(image.get_pixel(1, 1).0, [255]);
    }

    #[test]
    fn transposed_view_keeps_logical_order() {
        let slice = array![[0.0f32, 1.0, 2.0]];
        let image = slice_to_image(slice.t()).unwrap();
        assert_eq!(image.dimensions(), (1, 3));
        assert_eq!(image.get_pixel(0, 2).0, [255]);
    }

    #[test]
    fn constant_slice_is_black() {
        let slice = Array2::from_elem((3, 2), 7.0f32);
        let image = slice_to_image(slice.view()).unwrap();
        assert!(image.pixels().all(|p| p.0 == [0]));
    }

    #[test]
    fn colorized_slice_renders_as_rgba() {
        let slice = array![[0.9f32, 0.1]];
        let rgba = colorize(slice.view(), [1.0, 0.5, 0.0, 1.0]);
        let image = rgba_to_image(&rgba).unwrap();
        assert_eq!(image.dimensions(), (2, 1));
        assert_eq!(image.get_pixel(0, 0).0, [255, 128, 0, 255]);
        assert_eq!(image.get_pixel(1, 0).0, [0, 0, 0, 0]);
    }
}
