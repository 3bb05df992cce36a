use crate::tree::{RecordError, VoxelRecord, VoxelTree};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Errors emitted while reading or writing voxel files.
#[derive(Debug, Error)]
pub enum VoxelFileError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("voxel file missing: {}", .0.display())]
    NotFound(PathBuf),
    #[error(transparent)]
    Corrupt(#[from] RecordError),
}

/// Serialize every colored leaf of `tree`.
pub fn encode_voxel_records(tree: &VoxelTree) -> Vec<u8> {
    encode_records(&tree.leaf_records())
}

fn encode_records(records: &[VoxelRecord]) -> Vec<u8> {
    let mut data = Vec::with_capacity(records.iter().map(VoxelRecord::encoded_len).sum());
    for record in records {
        record.encode_into(&mut data);
    }
    data
}

/// Apply a buffer of records to `tree`. Nothing is applied if any record is
/// malformed. Returns the number of records.
pub fn read_voxel_records(
    tree: &mut VoxelTree,
    data: &[u8],
    destructive: bool,
) -> Result<usize, VoxelFileError> {
    Ok(tree.read_code_color_records(data, destructive)?)
}

/// Load a voxel file into `tree`, returning the number of records applied.
pub fn load_voxels_file(path: impl AsRef<Path>, tree: &mut VoxelTree) -> Result<usize, VoxelFileError> {
    let path = path.as_ref();
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(VoxelFileError::NotFound(path.to_path_buf()));
        }
        Err(err) => return Err(VoxelFileError::Io(err)),
    };

    let count = read_voxel_records(tree, &data, true)?;
    tracing::info!(path = %path.display(), records = count, "loaded voxel file");
    Ok(count)
}

/// Write every colored leaf of `tree` to `path`, replacing it atomically.
/// Returns the number of records written.
pub fn save_voxels_file(path: impl AsRef<Path>, tree: &VoxelTree) -> Result<usize, VoxelFileError> {
    let path = path.as_ref();
    let records = tree.leaf_records();
    let data = encode_records(&records);

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data)?;
    fs::rename(tmp, path)?;
    Ok(records.len())
}
