//! # volume-planes
//!
//! Helpers for viewers and analysis tools that work on medical image
//! volumes: load a volume together with its voxel spacing, reorient it into
//! one of the three anatomical planes, take 2D slices and run simple per
//! pixel filters on them.
//!
//! Volumes can be loaded from:
//!  - MetaImage files (`.mhd` with a detached data file, or `.mha`)
//!  - NIfTI-1 files (`.nii`, `.nii.gz`)
//!  - a directory of DICOM files forming one series
//!
//! Data is kept in storage order (depth, height, width) and spacing in the
//! order the file reports it (x, y, z). Reorientation moves the slice axis
//! of the requested plane to axis 0:
//!  - Axial
//!  - Sagittal
//!  - Coronal
//!
//! Filters on slices:
//!  - [`filters::colorize`]: threshold at 0.5 into a single RGBA color
//!  - [`filters::mask`]: binary mask from a predicate
//!  - [`filters::edges`]: gradient edge map
//!
//! # Examples
//!
//! ## Loading a sagittal slice and detecting its edges
//!
//! ```no_run
//! # use volume_planes::{Plane, VolumeLoader, filters};
//! let (slice, spacing) = VolumeLoader::load_slice("scan.mhd", Plane::Sagittal, 40)
//!     .expect("should have loaded the slice");
//! let edges = filters::edges(slice.view());
//! let overlay = filters::colorize(edges.view(), [1.0, 0.0, 0.0, 1.0]);
//! println!("slice spacing {spacing:?}, {} pixels", overlay.len());
//! ```
//!
//! ## Parsing a plane name
//!
//! ```
//! # use volume_planes::{Plane, is_valid_plane};
//! assert!(is_valid_plane("coronal"));
//! let plane: Plane = "axial".parse().unwrap();
//! assert_eq!(plane.spacing_axis(), 2);
//! assert!("oblique".parse::<Plane>().is_err());
//! ```

pub mod enums;
pub mod filters;
pub mod interpolator;
pub mod metaimage;
pub mod render;
pub mod volume;
pub mod volume_loader;

pub use enums::{Plane, SortBy, VolumeFormat, is_valid_plane};
pub use volume::{SliceSpacing, Spacing, Volume, VolumeError};
pub use volume_loader::{VolumeLoader, VolumeLoaderError};
