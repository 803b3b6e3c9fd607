use std::fmt;
use std::path::Path;
use std::str::FromStr;

use ndarray::{Array3, ArrayView3, Axis};

use crate::volume::VolumeError;

/// Anatomical viewing plane a volume can be reoriented into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plane {
    Axial,
    Sagittal,
    Coronal,
}

impl Plane {
    pub const ALL: [Plane; 3] = [Plane::Axial, Plane::Sagittal, Plane::Coronal];

    /// Identifier used when parsing and displaying the plane
    pub fn as_str(&self) -> &'static str {
        match self {
            Plane::Axial => "axial",
            Plane::Sagittal => "sagittal",
            Plane::Coronal => "coronal",
        }
    }

    /// Index into the volume spacing that belongs to the slice axis of this
    /// plane. It is dropped when building the spacing of a single slice.
    pub fn spacing_axis(&self) -> usize {
        match self {
            Plane::Axial => 2,
            Plane::Sagittal => 1,
            Plane::Coronal => 0,
        }
    }

    /// Reorient a volume in storage order so that axis 0 becomes the slice
    /// axis of this plane.
    ///
    /// * Axial: identity
    /// * Sagittal: swap axes 0 and 2, then rotate 90° in the (1, 2) plane
    ///   (reverse axis 2, swap axes 1 and 2)
    /// * Coronal: swap axes 0 and 1, then mirror axis 1
    ///
    /// The result is always in standard layout.
    pub fn apply(&self, data: ArrayView3<'_, f32>) -> Array3<f32> {
        let mut view = data;
        match self {
            Plane::Axial => {}
            Plane::Sagittal => {
                view.swap_axes(0, 2);
                view.invert_axis(Axis(2));
                view.swap_axes(1, 2);
            }
            Plane::Coronal => {
                view.swap_axes(0, 1);
                view.invert_axis(Axis(1));
            }
        }
        view.as_standard_layout().into_owned()
    }

    /// Inverse of [`Plane::apply`]: maps a reoriented volume back to
    /// storage order.
    pub fn restore(&self, reoriented: ArrayView3<'_, f32>) -> Array3<f32> {
        let mut view = reoriented;
        match self {
            Plane::Axial => {}
            Plane::Sagittal => {
                view.swap_axes(1, 2);
                view.invert_axis(Axis(2));
                view.swap_axes(0, 2);
            }
            Plane::Coronal => {
                view.invert_axis(Axis(1));
                view.swap_axes(0, 1);
            }
        }
        view.as_standard_layout().into_owned()
    }
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plane {
    type Err = VolumeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Plane::ALL
            .into_iter()
            .find(|plane| plane.as_str() == s)
            .ok_or_else(|| VolumeError::InvalidPlane(s.to_owned()))
    }
}

/// Whether `identifier` names one of the three supported planes.
pub fn is_valid_plane(identifier: &str) -> bool {
    identifier.parse::<Plane>().is_ok()
}

/// On-disk representation of a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeFormat {
    /// `.mhd` header with detached data, or `.mha` with inline data
    MetaImage,
    /// `.nii` or `.nii.gz`
    Nifti,
    /// Directory of `.dcm` files
    DicomSeries,
}

impl VolumeFormat {
    /// Guess a single file format from the file name
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".mhd") || name.ends_with(".mha") {
            Some(VolumeFormat::MetaImage)
        } else if name.ends_with(".nii") || name.ends_with(".nii.gz") {
            Some(VolumeFormat::Nifti)
        } else {
            None
        }
    }
}

/// Key used to order the files of a DICOM series along axis 0
#[derive(Default)]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn ramp(shape: (usize, usize, usize)) -> Array3<f32> {
        let len = shape.0 * shape.1 * shape.2;
        Array3::from_shape_vec(shape, (0..len).map(|v| v as f32).collect()).unwrap()
    }

    #[test]
    fn parses_known_planes_only() {
        for plane in Plane::ALL {
            assert!(is_valid_plane(plane.as_str()));
            assert_eq!(plane.to_string().parse::<Plane>().unwrap(), plane);
        }
        for name in ["", "Axial", "transverse", "axial ", "x"] {
            assert!(!is_valid_plane(name), "{name:?} should be rejected");
        }
        assert!(matches!(
            "oblique".parse::<Plane>(),
            Err(VolumeError::InvalidPlane(name)) if name == "oblique"
        ));
    }

    #[test]
    fn detects_format_from_file_name() {
        let format = |name: &str| VolumeFormat::from_path(Path::new(name));
        assert_eq!(format("scan.mhd"), Some(VolumeFormat::MetaImage));
        assert_eq!(format("dir/SCAN.MHA"), Some(VolumeFormat::MetaImage));
        assert_eq!(format("brain.nii"), Some(VolumeFormat::Nifti));
        assert_eq!(format("brain.nii.gz"), Some(VolumeFormat::Nifti));
        assert_eq!(format("scan.raw"), None);
        assert_eq!(format("notes.gz"), None);
    }

    #[test]
    fn spacing_axes() {
        assert_eq!(Plane::Axial.spacing_axis(), 2);
        assert_eq!(Plane::Sagittal.spacing_axis(), 1);
        assert_eq!(Plane::Coronal.spacing_axis(), 0);
    }

    #[test]
    fn axial_is_identity() {
        let volume = ramp((2, 3, 4));
        assert_eq!(Plane::Axial.apply(volume.view()), volume);
    }

    #[test]
    fn sagittal_matches_swap_then_rot90() {
        let volume = ramp((2, 3, 4));
        let (depth, height, width) = volume.dim();
        let sagittal = Plane::Sagittal.apply(volume.view());
        assert_eq!(sagittal.dim(), (width, depth, height));
        for x in 0..width {
            for z in 0..depth {
                for y in 0..height {
                    assert_eq!(sagittal[[x, z, y]], volume[[depth - 1 - z, y, x]]);
                }
            }
        }
    }

    #[test]
    fn coronal_matches_swap_then_flip() {
        let volume = ramp((2, 3, 4));
        let (depth, height, width) = volume.dim();
        let coronal = Plane::Coronal.apply(volume.view());
        assert_eq!(coronal.dim(), (height, depth, width));
        for y in 0..height {
            for z in 0..depth {
                for x in 0..width {
                    assert_eq!(coronal[[y, z, x]], volume[[depth - 1 - z, y, x]]);
                }
            }
        }
    }

    #[test]
    fn restore_inverts_apply() {
        let volume = ramp((3, 4, 5));
        for plane in Plane::ALL {
            let reoriented = plane.apply(volume.view());
            assert!(reoriented.is_standard_layout());
            assert_eq!(plane.restore(reoriented.view()), volume, "{plane}");
        }
    }
}
