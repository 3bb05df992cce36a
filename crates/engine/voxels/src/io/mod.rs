//! Voxel record files.
//!
//! A voxel file is a flat run of `[octal code][R][G][B]` records, one per
//! colored leaf, with no header.

mod records;

pub use records::{
    encode_voxel_records, load_voxels_file, read_voxel_records, save_voxels_file, VoxelFileError,
};
