//! Reader for MetaImage volumes (`.mhd` header with a detached data file,
//! or `.mha` with the data appended to the header).
//!
//! Only single channel, three dimensional images are supported. Data may be
//! raw or zlib compressed. Voxel values are converted to `f32`.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use bytemuck::Pod;
use flate2::read::ZlibDecoder;
use log::{debug, warn};
use ndarray::Array3;

use crate::volume::{Spacing, Volume};
use crate::volume_loader::VolumeLoaderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Float,
    Double,
}

impl ElementType {
    fn parse(value: &str) -> Option<Self> {
        let element_type = match value {
            "MET_CHAR" => ElementType::Char,
            "MET_UCHAR" => ElementType::UChar,
            "MET_SHORT" => ElementType::Short,
            "MET_USHORT" => ElementType::UShort,
            "MET_INT" => ElementType::Int,
            "MET_UINT" => ElementType::UInt,
            "MET_LONG" => ElementType::Long,
            "MET_ULONG" => ElementType::ULong,
            "MET_LONG_LONG" => ElementType::LongLong,
            "MET_ULONG_LONG" => ElementType::ULongLong,
            "MET_FLOAT" => ElementType::Float,
            "MET_DOUBLE" => ElementType::Double,
            _ => return None,
        };
        Some(element_type)
    }

    /// Size of one element in bytes
    pub fn size(&self) -> usize {
        match self {
            ElementType::Char | ElementType::UChar => 1,
            ElementType::Short | ElementType::UShort => 2,
            // MET_LONG is 32 bit regardless of platform
            ElementType::Int | ElementType::UInt | ElementType::Long | ElementType::ULong => 4,
            ElementType::Float => 4,
            ElementType::LongLong | ElementType::ULongLong | ElementType::Double => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataFile {
    /// Data follows the header in the same file
    Local,
    External(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetaImageHeader {
    /// Extent along (x, y, z)
    pub dim_size: [usize; 3],
    pub spacing: Spacing,
    pub element_type: ElementType,
    pub big_endian: bool,
    /// Data is a zlib stream
    pub compressed: bool,
    /// Length of the zlib stream, when the header states it
    pub compressed_size: Option<usize>,
    /// Bytes to skip before the data, `None` when the data sits at the end
    /// of the data file
    pub header_size: Option<usize>,
    pub data_file: DataFile,
}

impl MetaImageHeader {
    /// Parse the `Key = Value` lines at the start of `bytes`.
    ///
    /// Returns the header and the offset of the first byte after the
    /// `ElementDataFile` line, which is where local data starts.
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize), VolumeLoaderError> {
        let mut ndims = None;
        let mut dim_size = None;
        let mut spacing = None;
        let mut element_size = None;
        let mut element_type = None;
        let mut channels = 1;
        let mut big_endian = false;
        let mut compressed = false;
        let mut compressed_size = None;
        let mut header_size = Some(0);
        let mut data_file = None;

        let mut pos = 0;
        while pos < bytes.len() && data_file.is_none() {
            let end = bytes[pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(bytes.len(), |i| pos + i);
            let line = std::str::from_utf8(&bytes[pos..end])
                .map_err(|_| malformed("header is not valid text"))?;
            pos = (end + 1).min(bytes.len());

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(malformed(format!("expected `Key = Value`, found {line:?}")));
            };
            let value = value.trim();

            match key.trim() {
                "NDims" => ndims = Some(parse_number::<usize>("NDims", value)?),
                "DimSize" => dim_size = Some(parse_triple::<usize>("DimSize", value)?),
                "ElementSpacing" => spacing = Some(parse_triple::<f32>("ElementSpacing", value)?),
                "ElementSize" => element_size = Some(parse_triple::<f32>("ElementSize", value)?),
                "ElementType" => {
                    element_type = Some(ElementType::parse(value).ok_or_else(|| {
                        malformed(format!("unsupported ElementType {value}"))
                    })?)
                }
                "ElementNumberOfChannels" => {
                    channels = parse_number::<usize>("ElementNumberOfChannels", value)?
                }
                "BinaryDataByteOrderMSB" | "ElementByteOrderMSB" => {
                    big_endian = parse_bool(key.trim(), value)?
                }
                "CompressedData" => compressed = parse_bool("CompressedData", value)?,
                "CompressedDataSize" => {
                    compressed_size = Some(parse_number::<usize>("CompressedDataSize", value)?)
                }
                "HeaderSize" => {
                    header_size = match parse_number::<i64>("HeaderSize", value)? {
                        -1 => None,
                        n => Some(usize::try_from(n).map_err(|_| {
                            malformed(format!("invalid HeaderSize {n}"))
                        })?),
                    }
                }
                "ElementDataFile" => data_file = Some(parse_data_file(value)?),
                _ => {}
            }
        }

        let data_file = data_file.ok_or_else(|| malformed("missing ElementDataFile"))?;
        match ndims {
            Some(3) => {}
            Some(n) => return Err(malformed(format!("expected 3 dimensions, found {n}"))),
            None => return Err(malformed("missing NDims")),
        }
        if channels != 1 {
            return Err(malformed(format!(
                "expected a single channel, found {channels}"
            )));
        }
        let dim_size = dim_size.ok_or_else(|| malformed("missing DimSize"))?;
        let element_type = element_type.ok_or_else(|| malformed("missing ElementType"))?;
        let spacing = match spacing.or(element_size) {
            Some(spacing) => spacing,
            None => {
                warn!("MetaImage header has no ElementSpacing, assuming unit spacing");
                [1.0, 1.0, 1.0]
            }
        };

        let header = Self {
            dim_size,
            spacing,
            element_type,
            big_endian,
            compressed,
            compressed_size,
            header_size,
            data_file,
        };
        if header.byte_len().is_none() {
            return Err(malformed(format!("DimSize {:?} is too large", header.dim_size)));
        }
        Ok((header, pos))
    }

    /// Number of voxels described by the header, `None` on overflow
    pub fn voxel_count(&self) -> Option<usize> {
        self.dim_size
            .iter()
            .try_fold(1usize, |count, &dim| count.checked_mul(dim))
    }

    /// Size of the uncompressed voxel data in bytes, `None` on overflow
    pub fn byte_len(&self) -> Option<usize> {
        self.voxel_count()?.checked_mul(self.element_type.size())
    }

    /// Shape of the voxel array in storage order (z, y, x)
    pub fn shape(&self) -> (usize, usize, usize) {
        let [x, y, z] = self.dim_size;
        (z, y, x)
    }
}

/// Read a MetaImage file into a [`Volume`].
pub fn read(path: impl AsRef<Path>) -> Result<Volume, VolumeLoaderError> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let (header, data_offset) = MetaImageHeader::parse(&bytes)?;
    debug!(
        "MetaImage header {}: dims {:?}, type {:?}, spacing {:?}",
        path.display(),
        header.dim_size,
        header.element_type,
        header.spacing
    );

    let byte_len = header
        .byte_len()
        .ok_or_else(|| malformed("voxel data size overflows"))?;
    let external;
    let raw: &[u8] = match &header.data_file {
        DataFile::Local => &bytes[data_offset..],
        DataFile::External(file) => {
            let data_path = match path.parent() {
                Some(dir) => dir.join(file),
                None => file.clone(),
            };
            external = fs::read(&data_path)?;
            &external
        }
    };

    let voxels = if header.compressed {
        let stream = raw
            .get(header.header_size.unwrap_or(0)..)
            .ok_or_else(|| malformed("HeaderSize is past the end of the data"))?;
        let stream = match header.compressed_size {
            Some(size) => stream.get(..size).ok_or_else(|| {
                malformed(format!(
                    "expected {size} bytes of compressed data, found {}",
                    stream.len()
                ))
            })?,
            None => stream,
        };
        let inflated = inflate(stream, byte_len)?;
        let data = locate(&inflated, Some(0), byte_len)?;
        decode(data, header.element_type, header.big_endian)
    } else {
        let data = locate(raw, header.header_size, byte_len)?;
        decode(data, header.element_type, header.big_endian)
    };

    let data = Array3::from_shape_vec(header.shape(), voxels)
        .map_err(|e| malformed(e.to_string()))?;
    Ok(Volume::new(data, header.spacing))
}

/// Inflate at most `byte_len` bytes from a zlib stream
fn inflate(stream: &[u8], byte_len: usize) -> Result<Vec<u8>, VolumeLoaderError> {
    let mut inflated = Vec::new();
    ZlibDecoder::new(stream)
        .take(byte_len as u64)
        .read_to_end(&mut inflated)
        .map_err(|e| malformed(format!("invalid compressed data: {e}")))?;
    Ok(inflated)
}

fn locate(data: &[u8], skip: Option<usize>, byte_len: usize) -> Result<&[u8], VolumeLoaderError> {
    let start = match skip {
        Some(skip) => skip,
        None => data.len().saturating_sub(byte_len),
    };
    let end = start
        .checked_add(byte_len)
        .ok_or_else(|| malformed(format!("HeaderSize {start} is too large")))?;
    data.get(start..end).ok_or_else(|| {
        malformed(format!(
            "expected {byte_len} bytes of voxel data, found {}",
            data.len().saturating_sub(start)
        ))
    })
}

trait Element: Pod {
    fn swap(self) -> Self;
    fn to_f32(self) -> f32;
}

macro_rules! int_element {
    ($($t:ty),*) => {$(
        impl Element for $t {
            fn swap(self) -> Self {
                self.swap_bytes()
            }
            fn to_f32(self) -> f32 {
                self as f32
            }
        }
    )*};
}

int_element!(i8, u8, i16, u16, i32, u32, i64, u64);

impl Element for f32 {
    fn swap(self) -> Self {
        f32::from_bits(self.to_bits().swap_bytes())
    }
    fn to_f32(self) -> f32 {
        self
    }
}

impl Element for f64 {
    fn swap(self) -> Self {
        f64::from_bits(self.to_bits().swap_bytes())
    }
    fn to_f32(self) -> f32 {
        self as f32
    }
}

fn decode(data: &[u8], element_type: ElementType, big_endian: bool) -> Vec<f32> {
    match element_type {
        ElementType::Char => decode_as::<i8>(data, big_endian),
        ElementType::UChar => decode_as::<u8>(data, big_endian),
        ElementType::Short => decode_as::<i16>(data, big_endian),
        ElementType::UShort => decode_as::<u16>(data, big_endian),
        ElementType::Int | ElementType::Long => decode_as::<i32>(data, big_endian),
        ElementType::UInt | ElementType::ULong => decode_as::<u32>(data, big_endian),
        ElementType::LongLong => decode_as::<i64>(data, big_endian),
        ElementType::ULongLong => decode_as::<u64>(data, big_endian),
        ElementType::Float => decode_as::<f32>(data, big_endian),
        ElementType::Double => decode_as::<f64>(data, big_endian),
    }
}

fn decode_as<T: Element>(data: &[u8], big_endian: bool) -> Vec<f32> {
    let swap = big_endian != cfg!(target_endian = "big");
    data.chunks_exact(size_of::<T>())
        .map(|chunk| {
            let value: T = bytemuck::pod_read_unaligned(chunk);
            let value = if swap { value.swap() } else { value };
            value.to_f32()
        })
        .collect()
}

fn malformed(message: impl Into<String>) -> VolumeLoaderError {
    VolumeLoaderError::MetaImage(message.into())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, VolumeLoaderError> {
    value
        .parse()
        .map_err(|_| malformed(format!("invalid {key} value {value:?}")))
}

fn parse_triple<T: std::str::FromStr + Copy>(
    key: &str,
    value: &str,
) -> Result<[T; 3], VolumeLoaderError> {
    let parts = value
        .split_whitespace()
        .map(|part| parse_number::<T>(key, part))
        .collect::<Result<Vec<_>, _>>()?;
    match parts.as_slice() {
        &[a, b, c] => Ok([a, b, c]),
        _ => Err(malformed(format!("expected 3 values for {key}, found {value:?}"))),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, VolumeLoaderError> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(malformed(format!("invalid {key} value {value:?}")))
    }
}

fn parse_data_file(value: &str) -> Result<DataFile, VolumeLoaderError> {
    if value == "LOCAL" {
        Ok(DataFile::Local)
    } else if value.starts_with("LIST") || value.contains('%') {
        Err(malformed(format!("multi-file ElementDataFile {value} is not supported")))
    } else if value.is_empty() {
        Err(malformed("empty ElementDataFile"))
    } else {
        Ok(DataFile::External(PathBuf::from(value)))
    }
}
