//! NIfTI-1 volume I/O
//!
//! Loads intensity volumes, masks and feature maps from `.nii` / `.nii.gz`
//! bytes or files, and writes float32 NIfTI-1. Feature maps are stored as 4D
//! volumes with one frame per channel (BVTV, TbN, TbTh, TbSp, BSBV).

use std::io::{Cursor, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{Array, IxDyn};
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};

use crate::error::MorphometryError;
use crate::feature_map::{FeatureMap, FEATURE_COUNT};
use crate::volume::{Mask, Volume};

/// Intensity volume plus the affine needed to write results in the same space
#[derive(Debug, Clone)]
pub struct NiftiImage {
    pub volume: Volume,
    /// Affine transformation matrix (4x4, row-major)
    pub affine: [f64; 16],
}

/// Feature map read back from a 4D NIfTI file
#[derive(Debug, Clone)]
pub struct NiftiFeatureMap {
    pub map: FeatureMap,
    pub voxel_size: (f64, f64, f64),
    pub affine: [f64; 16],
}

/// Check if bytes are gzip compressed
fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Header summary for error messages
fn get_header_info(bytes: &[u8]) -> String {
    if bytes.len() < 348 {
        return format!("File too small ({} bytes, need at least 348)", bytes.len());
    }

    let sizeof_hdr = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let magic = String::from_utf8_lossy(&bytes[344..348]).to_string();
    let datatype = i16::from_le_bytes([bytes[70], bytes[71]]);

    format!("sizeof_hdr={}, magic='{}', datatype={}", sizeof_hdr, magic, datatype)
}

fn read_object(bytes: &[u8]) -> Result<InMemNiftiObject, MorphometryError> {
    if is_gzip(bytes) {
        InMemNiftiObject::from_reader(GzDecoder::new(Cursor::new(bytes))).map_err(|e| {
            let mut decompressed = Vec::new();
            let mut decoder = GzDecoder::new(Cursor::new(bytes));
            let info = if std::io::Read::read_to_end(&mut decoder, &mut decompressed).is_ok() {
                get_header_info(&decompressed)
            } else {
                "Could not decompress".to_string()
            };
            MorphometryError::Io(format!("Failed to read gzipped NIfTI: {} ({})", e, info))
        })
    } else {
        InMemNiftiObject::from_reader(Cursor::new(bytes)).map_err(|e| {
            MorphometryError::Io(format!("Failed to read NIfTI: {} ({})", e, get_header_info(bytes)))
        })
    }
}

/// Decoded voxel data in Fortran order, frames concatenated
struct RawVolume {
    data: Vec<f64>,
    dims: (usize, usize, usize),
    frames: usize,
    voxel_size: (f64, f64, f64),
    affine: [f64; 16],
}

fn decode(bytes: &[u8]) -> Result<RawVolume, MorphometryError> {
    let obj = read_object(bytes)?;
    let header = obj.header();

    let ndim = header.dim[0] as usize;
    if ndim < 3 {
        return Err(MorphometryError::UnsupportedDimensions(ndim));
    }

    let voxel_size = (
        header.pixdim[1] as f64,
        header.pixdim[2] as f64,
        header.pixdim[3] as f64,
    );
    let affine = get_affine(header);

    let array: Array<f64, IxDyn> = obj
        .into_volume()
        .into_ndarray()
        .map_err(|e| MorphometryError::Io(format!("Failed to convert to ndarray: {}", e)))?;

    let shape = array.shape().to_vec();
    if shape.len() < 3 {
        return Err(MorphometryError::UnsupportedDimensions(shape.len()));
    }

    // Use the array shape, nifti-rs may drop trailing singleton dims
    let (nx, ny, nz) = (shape[0], shape[1], shape[2]);
    let frames = if shape.len() >= 4 { shape[3] } else { 1 };

    let mut data = Vec::with_capacity(nx * ny * nz * frames);
    for t in 0..frames {
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let value = if shape.len() >= 4 {
                        let mut idx = vec![0usize; shape.len()];
                        idx[0] = i;
                        idx[1] = j;
                        idx[2] = k;
                        idx[3] = t;
                        array[IxDyn(&idx)]
                    } else {
                        array[IxDyn(&[i, j, k])]
                    };
                    data.push(value);
                }
            }
        }
    }

    Ok(RawVolume { data, dims: (nx, ny, nz), frames, voxel_size, affine })
}

/// Affine from the sform, or a pure voxel scaling when no sform is set
fn get_affine(header: &NiftiHeader) -> [f64; 16] {
    if header.sform_code > 0 {
        let s = &header.srow_x;
        let t = &header.srow_y;
        let u = &header.srow_z;
        [
            s[0] as f64, s[1] as f64, s[2] as f64, s[3] as f64,
            t[0] as f64, t[1] as f64, t[2] as f64, t[3] as f64,
            u[0] as f64, u[1] as f64, u[2] as f64, u[3] as f64,
            0.0, 0.0, 0.0, 1.0,
        ]
    } else {
        identity_affine((
            header.pixdim[1] as f64,
            header.pixdim[2] as f64,
            header.pixdim[3] as f64,
        ))
    }
}

/// Diagonal affine scaled by the voxel size
pub fn identity_affine(voxel_size: (f64, f64, f64)) -> [f64; 16] {
    let (vsx, vsy, vsz) = voxel_size;
    [
        vsx, 0.0, 0.0, 0.0,
        0.0, vsy, 0.0, 0.0,
        0.0, 0.0, vsz, 0.0,
        0.0, 0.0, 0.0, 1.0,
    ]
}

/// Load an intensity volume from bytes
///
/// Supports both .nii and .nii.gz (gzip is auto-detected). For 4D input only
/// the first frame is kept.
pub fn load_nifti(bytes: &[u8]) -> Result<NiftiImage, MorphometryError> {
    let raw = decode(bytes)?;
    let n = raw.dims.0 * raw.dims.1 * raw.dims.2;
    let mut data = raw.data;
    data.truncate(n);

    Ok(NiftiImage {
        volume: Volume::new(data, raw.dims, raw.voxel_size)?,
        affine: raw.affine,
    })
}

/// Load a mask; nonzero voxels are in scope
pub fn load_mask(bytes: &[u8]) -> Result<Mask, MorphometryError> {
    let raw = decode(bytes)?;
    let n = raw.dims.0 * raw.dims.1 * raw.dims.2;
    let mut data = raw.data;
    data.truncate(n);
    Mask::new(data, raw.dims)
}

/// Load a feature map written by [`save_feature_map_to_file`]
pub fn load_feature_map(bytes: &[u8]) -> Result<NiftiFeatureMap, MorphometryError> {
    let raw = decode(bytes)?;
    if raw.frames != FEATURE_COUNT {
        return Err(MorphometryError::SizeMismatch { expected: FEATURE_COUNT, actual: raw.frames });
    }
    let n = raw.dims.0 * raw.dims.1 * raw.dims.2;
    let channels: Vec<Vec<f64>> = raw.data.chunks(n).map(|c| c.to_vec()).collect();

    Ok(NiftiFeatureMap {
        map: FeatureMap::from_channels(&channels, raw.dims)?,
        voxel_size: raw.voxel_size,
        affine: raw.affine,
    })
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, MorphometryError> {
    std::fs::read(path).map_err(|e| {
        MorphometryError::Io(format!("Failed to read file '{}': {}", path.display(), e))
    })
}

pub fn read_nifti_file(path: &Path) -> Result<NiftiImage, MorphometryError> {
    load_nifti(&read_bytes(path)?)
}

pub fn read_mask_file(path: &Path) -> Result<Mask, MorphometryError> {
    load_mask(&read_bytes(path)?)
}

pub fn read_feature_map_file(path: &Path) -> Result<NiftiFeatureMap, MorphometryError> {
    load_feature_map(&read_bytes(path)?)
}

/// Encode float32 NIfTI-1 bytes
///
/// `frames > 1` writes a 4D volume whose frames are consecutive
/// `nx*ny*nz` blocks of `data`.
pub fn save_nifti(
    data: &[f64],
    dims: (usize, usize, usize),
    frames: usize,
    voxel_size: (f64, f64, f64),
    affine: &[f64; 16],
) -> Result<Vec<u8>, MorphometryError> {
    let (nx, ny, nz) = dims;
    let expected = nx * ny * nz * frames;
    if data.len() != expected {
        return Err(MorphometryError::SizeMismatch { expected, actual: data.len() });
    }
    let (vsx, vsy, vsz) = voxel_size;

    let mut header = [0u8; 348];

    // sizeof_hdr
    header[0..4].copy_from_slice(&348i32.to_le_bytes());

    let header_dim = |n: usize| {
        i16::try_from(n).map_err(|_| {
            MorphometryError::Io(format!(
                "extent {}x{}x{}x{} exceeds the NIfTI-1 limit of {} per axis",
                nx, ny, nz, frames, i16::MAX
            ))
        })
    };
    let ndim: i16 = if frames > 1 { 4 } else { 3 };
    let dim: [i16; 8] = [
        ndim,
        header_dim(nx)?,
        header_dim(ny)?,
        header_dim(nz)?,
        header_dim(frames)?,
        1,
        1,
        1,
    ];
    for (i, &d) in dim.iter().enumerate() {
        let offset = 40 + i * 2;
        header[offset..offset + 2].copy_from_slice(&d.to_le_bytes());
    }

    // datatype = 16 (FLOAT32), bitpix = 32
    header[70..72].copy_from_slice(&16i16.to_le_bytes());
    header[72..74].copy_from_slice(&32i16.to_le_bytes());

    let pixdim: [f32; 8] = [1.0, vsx as f32, vsy as f32, vsz as f32, 1.0, 1.0, 1.0, 1.0];
    for (i, &p) in pixdim.iter().enumerate() {
        let offset = 76 + i * 4;
        header[offset..offset + 4].copy_from_slice(&p.to_le_bytes());
    }

    // vox_offset = 352 (header + 4 byte extension flag)
    header[108..112].copy_from_slice(&352.0f32.to_le_bytes());
    // scl_slope = 1, scl_inter = 0
    header[112..116].copy_from_slice(&1.0f32.to_le_bytes());
    header[116..120].copy_from_slice(&0.0f32.to_le_bytes());
    // sform_code = 1 (scanner anat)
    header[254..256].copy_from_slice(&1i16.to_le_bytes());

    for (row, base) in [280usize, 296, 312].into_iter().enumerate() {
        for col in 0..4 {
            let offset = base + col * 4;
            header[offset..offset + 4]
                .copy_from_slice(&(affine[row * 4 + col] as f32).to_le_bytes());
        }
    }

    header[344..348].copy_from_slice(b"n+1\0");

    let mut buffer = Vec::with_capacity(352 + data.len() * 4);
    buffer.extend_from_slice(&header);
    buffer.extend_from_slice(&[0u8; 4]);
    for &val in data {
        buffer.extend_from_slice(&(val as f32).to_le_bytes());
    }

    Ok(buffer)
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>, MorphometryError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| MorphometryError::Io(format!("Gzip compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| MorphometryError::Io(format!("Gzip finish failed: {}", e)))
}

fn write_file(path: &Path, bytes: Vec<u8>) -> Result<(), MorphometryError> {
    let bytes = if path.to_string_lossy().ends_with(".nii.gz") { gzip(&bytes)? } else { bytes };
    std::fs::write(path, &bytes).map_err(|e| {
        MorphometryError::Io(format!("Failed to write file '{}': {}", path.display(), e))
    })
}

/// Write a volume; `.nii.gz` paths are gzip compressed
pub fn save_volume_to_file(
    path: &Path,
    volume: &Volume,
    affine: &[f64; 16],
) -> Result<(), MorphometryError> {
    let bytes = save_nifti(volume.data(), volume.dims(), 1, volume.voxel_size(), affine)?;
    write_file(path, bytes)
}

/// Write a feature map as a 4D volume with five frames
pub fn save_feature_map_to_file(
    path: &Path,
    map: &FeatureMap,
    voxel_size: (f64, f64, f64),
    affine: &[f64; 16],
) -> Result<(), MorphometryError> {
    let mut planes = Vec::with_capacity(map.len() * FEATURE_COUNT);
    for feature in crate::feature_map::Feature::ALL {
        planes.extend(map.channel(feature));
    }
    let bytes = save_nifti(&planes, map.dims(), FEATURE_COUNT, voxel_size, affine)?;
    write_file(path, bytes)
}
