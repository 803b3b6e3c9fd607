use crate::{
    enums::{Plane, SortBy, VolumeFormat},
    metaimage,
    volume::{SliceSpacing, Volume, VolumeError},
};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::PixelDecoder,
};
use dicom_dictionary_std::tags;
use log::{debug, trace};
use ndarray::{Array2, Array3, Axis, Ix3, s};
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Missing spacing information")]
    MissingSpacing,

    #[error("Expected a 3D volume, found shape {0:?}")]
    InvalidDimensions(Vec<usize>),

    #[error("Unsupported volume format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Invalid MetaImage file: {0}")]
    MetaImage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("NIfTI error: {0}")]
    Nifti(#[from] nifti::error::NiftiError),

    #[error(transparent)]
    Volume(#[from] VolumeError),
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume and its spacing from `path`.
    ///
    /// The format is picked from the path: a directory is read as a DICOM
    /// series (sorted by [`SortBy::default`]), `.mhd`/`.mha` as MetaImage and
    /// `.nii`/`.nii.gz` as NIfTI.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeLoaderError::Io`] if the path does not exist or cannot
    /// be read, and a format specific error if its content is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Volume, VolumeLoaderError> {
        let path = path.as_ref();
        let metadata = fs::metadata(path)?;
        let format = if metadata.is_dir() {
            VolumeFormat::DicomSeries
        } else {
            VolumeFormat::from_path(path)
                .ok_or_else(|| VolumeLoaderError::UnsupportedFormat(path.to_path_buf()))?
        };

        let volume = match format {
            VolumeFormat::MetaImage => Self::load_metaimage(path)?,
            VolumeFormat::Nifti => Self::load_nifti(path)?,
            VolumeFormat::DicomSeries => Self::load_from_directory(path, SortBy::default())?,
        };
        debug!(
            "Loaded {:?} volume {}: dim {:?}, spacing {:?}",
            format,
            path.display(),
            volume.dim(),
            volume.spacing
        );
        Ok(volume)
    }

    /// Load a volume reoriented into `plane` together with the spacing along
    /// its slice axis.
    pub fn load_plane(
        path: impl AsRef<Path>,
        plane: Plane,
    ) -> Result<(Array3<f32>, f32), VolumeLoaderError> {
        let volume = Self::load(path)?;
        let spacing = volume.plane_spacing(plane);
        Ok((volume.to_plane(plane), spacing))
    }

    /// Load a single slice of `plane` together with its in-plane spacing.
    ///
    /// # Errors
    ///
    /// Besides load errors, returns [`VolumeError::SliceOutOfRange`] if
    /// `index` is past the last slice of the plane.
    pub fn load_slice(
        path: impl AsRef<Path>,
        plane: Plane,
        index: usize,
    ) -> Result<(Array2<f32>, SliceSpacing), VolumeLoaderError> {
        let volume = Self::load(path)?;
        Ok(volume.slice(plane, index)?)
    }

    /// Load a MetaImage (`.mhd` or `.mha`) file
    pub fn load_metaimage(path: impl AsRef<Path>) -> Result<Volume, VolumeLoaderError> {
        metaimage::read(path)
    }

    /// Load a NIfTI-1 file. Voxels are reordered from the file's (x, y, z)
    /// to (z, y, x) and the spacing is read from `pixdim`.
    pub fn load_nifti(path: impl AsRef<Path>) -> Result<Volume, VolumeLoaderError> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let pixdim = obj.header().pixdim;
        let spacing = [pixdim[1].abs(), pixdim[2].abs(), pixdim[3].abs()];

        let mut data = obj.into_volume().into_ndarray::<f32>()?;
        // a single time point is stored as a trailing axis of length 1
        while data.ndim() > 3 && data.shape().last() == Some(&1) {
            let last = Axis(data.ndim() - 1);
            data = data.index_axis_move(last, 0);
        }
        let shape = data.shape().to_vec();
        let data = data
            .into_dimensionality::<Ix3>()
            .map_err(|_| VolumeLoaderError::InvalidDimensions(shape))?
            .permuted_axes([2, 1, 0]);

        Ok(Volume::new(data.as_standard_layout().into_owned(), spacing))
    }

    /// Load a volume from DICOM objects
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - Slice of DICOM file objects
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if no valid images found or dimensions are inconsistent
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let mut images_with_order: Vec<_> = dicom_objects
            .par_iter()
            .filter_map(|dicom_object| Self::extract_image_with_order(dicom_object, &sort_by))
            .collect();

        if images_with_order.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::sort_images(&mut images_with_order, sort_by);

        let images: Vec<_> = images_with_order
            .into_iter()
            .map(|(_, image)| image)
            .collect();

        Self::validate_dimensions(&images)?;

        let volume_array = Self::build_volume_array(&images);
        let spacing = Self::get_spacing(dicom_objects).ok_or(VolumeLoaderError::MissingSpacing)?;

        Ok(Volume::new(volume_array, spacing))
    }

    /// Load a volume from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path> + Sync],
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let objects: Result<Vec<_>, _> = paths
            .par_iter()
            .map(|path| open_file(path.as_ref()))
            .collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Load a volume from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::load_from_file_paths(&paths, sort_by)
    }

    fn extract_image_with_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<(Option<f32>, Array2<f32>)> {
        let order = Self::get_sort_order(dicom_object, sort_by)?;
        let image_2d = Self::decode_image(dicom_object)?;
        Some((order, image_2d))
    }

    fn get_sort_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<Option<f32>> {
        match sort_by {
            SortBy::ImagePositionPatient => {
                let pos = dicom_object
                    .element(tags::IMAGE_POSITION_PATIENT)
                    .ok()?
                    .to_multi_float32()
                    .ok()?;
                Some(pos.get(2).copied())
            }
            SortBy::TablePosition => {
                let pos = dicom_object
                    .element(tags::TABLE_POSITION)
                    .ok()?
                    .to_float32()
                    .ok();
                Some(pos)
            }
            SortBy::InstanceNumber => {
                let num = dicom_object
                    .element(tags::INSTANCE_NUMBER)
                    .ok()?
                    .to_int::<i32>()
                    .ok()
                    .map(|n| n as f32);
                Some(num)
            }
            SortBy::None => Some(Some(0.0)),
        }
    }

    /// First frame of the object with the modality LUT applied
    fn decode_image(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Array2<f32>> {
        let pixel_data = match dicom_object.decode_pixel_data() {
            Ok(pixel_data) => pixel_data,
            Err(e) => {
                trace!("Skipping DICOM object without decodable pixel data: {e}");
                return None;
            }
        };
        match pixel_data.to_ndarray::<f32>() {
            Ok(arr) => Some(arr.slice_move(s![0, .., .., 0])),
            Err(e) => {
                trace!("Skipping DICOM object, pixel data conversion failed: {e}");
                None
            }
        }
    }

    fn sort_images(images_with_order: &mut [(Option<f32>, Array2<f32>)], sort_by: SortBy) {
        if !matches!(sort_by, SortBy::None) {
            images_with_order
                .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        }

        if matches!(sort_by, SortBy::ImagePositionPatient) {
            images_with_order.reverse();
        }
    }

    fn validate_dimensions(images: &[Array2<f32>]) -> Result<(), VolumeLoaderError> {
        let first_dim = images[0].dim();
        if images.iter().any(|img| img.dim() != first_dim) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(images: &[Array2<f32>]) -> Array3<f32> {
        let (height, width) = images[0].dim();
        let depth = images.len();
        let mut volume = Array3::<f32>::zeros((depth, height, width));

        for (i, image) in images.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(image);
        }

        volume
    }

    fn get_spacing(dicom_objects: &[FileDicomObject<InMemDicomObject>]) -> Option<[f32; 3]> {
        dicom_objects
            .iter()
            .find_map(|dicom_object| Self::spacing_of(dicom_object))
    }

    /// Spacing as (x, y, z). PixelSpacing holds (row, column) spacing, i.e.
    /// y before x.
    fn spacing_of(dicom_object: &InMemDicomObject) -> Option<[f32; 3]> {
        let pixel_spacing = dicom_object
            .element(tags::PIXEL_SPACING)
            .ok()?
            .to_multi_float32()
            .ok()?;

        let slice_thickness = dicom_object
            .element(tags::SLICE_THICKNESS)
            .ok()?
            .to_float32()
            .ok()?;

        Some([*pixel_spacing.get(1)?, *pixel_spacing.first()?, slice_thickness])
    }
}
