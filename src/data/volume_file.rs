/// HDF5 volume container I/O
///
/// Volumes are top-level datasets of an HDF5 file, the container the
/// reconstruction toolbox reads and writes.
use hdf5::types::{FloatSize, IntSize, TypeDescriptor};
use hdf5::{Dataset, File, H5Type};
use ndarray::{ArrayBase, ArrayD, Data, Dimension, IxDyn};
use std::path::Path;

use crate::DgdError;

/// List the top-level members of a container
pub fn array_names<P: AsRef<Path>>(path: P) -> crate::Result<Vec<String>> {
    let file = File::open(path.as_ref())?;
    Ok(file.member_names()?)
}

fn open_dataset(file: &File, name: &str) -> crate::Result<Dataset> {
    if !file.link_exists(name) {
        return Err(DgdError::Format(format!(
            "array '{}' not found (available: {:?})",
            name,
            file.member_names().unwrap_or_default()
        )));
    }
    Ok(file.dataset(name)?)
}

/// Read a named array as `f32`.
///
/// Stored `f32`, `f64` and `u8` data are accepted; the latter two are cast.
pub fn read_volume_array<P: AsRef<Path>>(path: P, name: &str) -> crate::Result<ArrayD<f32>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let dataset = open_dataset(&file, name)?;
    let shape = dataset.shape();

    let data: Vec<f32> = match dataset.dtype()?.to_descriptor()? {
        TypeDescriptor::Float(FloatSize::U4) => dataset.read_raw::<f32>()?,
        TypeDescriptor::Float(FloatSize::U8) => {
            log::debug!("'{}' stored as f64, casting to f32", name);
            dataset.read_raw::<f64>()?.into_iter().map(|v| v as f32).collect()
        }
        TypeDescriptor::Unsigned(IntSize::U1) => {
            log::debug!("'{}' stored as u8, casting to f32", name);
            dataset.read_raw::<u8>()?.into_iter().map(f32::from).collect()
        }
        other => {
            return Err(DgdError::Format(format!(
                "array '{}' in {:?} has unsupported type {:?} (expected f32, f64 or u8)",
                name, path, other
            )))
        }
    };

    ArrayD::from_shape_vec(IxDyn(&shape), data)
        .map_err(|e| DgdError::Format(format!("array '{}' in {:?}: {}", name, path, e)))
}

/// Write a single named array into a new container, replacing any existing file
pub fn write_volume_array<P, T, S, D>(path: P, name: &str, array: &ArrayBase<S, D>) -> crate::Result<()>
where
    P: AsRef<Path>,
    T: H5Type + Copy,
    S: Data<Elem = T>,
    D: Dimension,
{
    let file = File::create(path.as_ref())?;

    // Logical iteration order is row-major, matching HDF5's C order
    let data: Vec<T> = array.iter().copied().collect();
    file.new_dataset::<T>()
        .shape(array.shape().to_vec())
        .create(name)?
        .write_raw(data.as_slice())?;
    file.flush()?;

    log::info!(
        "Wrote '{}' with shape {:?} to {:?}",
        name,
        array.shape(),
        path.as_ref()
    );
    Ok(())
}
