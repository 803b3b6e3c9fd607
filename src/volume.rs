use crate::enums::Plane;

use ndarray::{Array2, Array3, ArrayView3, Axis};
use thiserror::Error;

/// Physical distance per voxel step, in the order the source file reports
/// it (x, y, z).
pub type Spacing = [f32; 3];

/// Spacing of the two in-plane axes of a slice.
pub type SliceSpacing = [f32; 2];

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("Invalid plane identifier {0:?}, expected one of axial, sagittal, coronal")]
    InvalidPlane(String),

    #[error("Slice index {index} out of range for {len} slices")]
    SliceOutOfRange { index: usize, len: usize },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Volume {
    pub data: Array3<f32>,
    pub spacing: Spacing,
}

impl Volume {
    pub fn new(data: Array3<f32>, spacing: Spacing) -> Self {
        Self { data, spacing }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Reorient the volume into `plane`. Axis 0 of the result is the slice
    /// axis.
    pub fn to_plane(&self, plane: Plane) -> Array3<f32> {
        plane.apply(self.data.view())
    }

    /// Spacing along the slice axis of `plane`
    pub fn plane_spacing(&self, plane: Plane) -> f32 {
        self.spacing[plane.spacing_axis()]
    }

    /// Spacing of a slice taken in `plane`
    pub fn slice_spacing(&self, plane: Plane) -> SliceSpacing {
        slice_spacing(self.spacing, plane)
    }

    /// Number of slices available in `plane`
    pub fn slice_count(&self, plane: Plane) -> usize {
        let (depth, height, width) = self.dim();
        match plane {
            Plane::Axial => depth,
            Plane::Sagittal => width,
            Plane::Coronal => height,
        }
    }

    /// Extract slice `index` of `plane` together with its spacing.
    pub fn slice(
        &self,
        plane: Plane,
        index: usize,
    ) -> Result<(Array2<f32>, SliceSpacing), VolumeError> {
        let reoriented = self.to_plane(plane);
        let slice = extract_slice(reoriented.view(), index)?;
        Ok((slice, self.slice_spacing(plane)))
    }
}

/// Drop the spacing entry of the slice axis, keeping the remaining two in
/// their original order.
pub fn slice_spacing(spacing: Spacing, plane: Plane) -> SliceSpacing {
    let [x, y, z] = spacing;
    match plane.spacing_axis() {
        0 => [y, z],
        1 => [x, z],
        _ => [x, y],
    }
}

/// Copy the 2D slice at `index` along axis 0 of a reoriented volume.
pub fn extract_slice(
    reoriented: ArrayView3<'_, f32>,
    index: usize,
) -> Result<Array2<f32>, VolumeError> {
    let len = reoriented.len_of(Axis(0));
    if index >= len {
        return Err(VolumeError::SliceOutOfRange { index, len });
    }
    Ok(reoriented.index_axis(Axis(0), index).to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;

    fn volume() -> Volume {
        let data = Array3::from_shape_fn((2, 3, 4), |(z, y, x)| (z * 100 + y * 10 + x) as f32);
        Volume::new(data, [1.0, 2.0, 3.0])
    }

    #[test]
    fn slice_spacing_drops_plane_axis() {
        let spacing = [1.0, 2.0, 3.0];
        assert_eq!(slice_spacing(spacing, Plane::Axial), [1.0, 2.0]);
        assert_eq!(slice_spacing(spacing, Plane::Sagittal), [1.0, 3.0]);
        assert_eq!(slice_spacing(spacing, Plane::Coronal), [2.0, 3.0]);
    }

    #[test]
    fn plane_spacing_picks_plane_axis() {
        let volume = volume();
        assert_eq!(volume.plane_spacing(Plane::Axial), 3.0);
        assert_eq!(volume.plane_spacing(Plane::Sagittal), 2.0);
        assert_eq!(volume.plane_spacing(Plane::Coronal), 1.0);
    }

    #[test]
    fn slice_count_follows_reoriented_axis_zero() {
        let volume = volume();
        for plane in Plane::ALL {
            assert_eq!(volume.slice_count(plane), volume.to_plane(plane).len_of(Axis(0)));
        }
    }

    #[test]
    fn axial_slice_is_stored_slice() {
        let volume = volume();
        let (slice, spacing) = volume.slice(Plane::Axial, 1).unwrap();
        assert_eq!(slice, volume.data.slice(s![1, .., ..]));
        assert_eq!(spacing, [1.0, 2.0]);
    }

    #[test]
    fn coronal_slice_is_mirrored_in_depth() {
        let volume = volume();
        let (slice, _) = volume.slice(Plane::Coronal, 2).unwrap();
        assert_eq!(slice.dim(), (2, 4));
        // first row of the coronal slice comes from the last stored slice
        assert_eq!(slice[[0, 0]], 120.0);
        assert_eq!(slice[[1, 3]], 23.0);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let volume = volume();
        let err = volume.slice(Plane::Sagittal, 4).unwrap_err();
        assert!(matches!(err, VolumeError::SliceOutOfRange { index: 4, len: 4 }));
        assert!(extract_slice(volume.data.view(), 2).is_err());
        assert!(extract_slice(volume.data.view(), 1).is_ok());
    }
}
