//! Voxel record file tests

use tempfile::TempDir;
use voxels::io::{encode_voxel_records, load_voxels_file, save_voxels_file, VoxelFileError};
use voxels::{OctalCode, Rgb, VoxelTree};

fn sample_tree() -> VoxelTree {
    let mut tree = VoxelTree::new();
    tree.create_voxel(0.1, 0.2, 0.3, 0.125, Rgb::new(10, 20, 30), false)
        .unwrap();
    tree.create_voxel(0.9, 0.9, 0.9, 0.25, Rgb::new(200, 100, 0), false)
        .unwrap();
    tree.set_voxel(
        &OctalCode::from_sections(&[3, 3, 3, 3]).unwrap(),
        Rgb::new(7, 7, 7),
        false,
    );
    tree
}

#[test]
fn test_save_then_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("world.voxels");
    let tree = sample_tree();

    assert_eq!(save_voxels_file(&path, &tree).unwrap(), 3);
    assert_eq!(std::fs::read(&path).unwrap(), encode_voxel_records(&tree));

    let mut loaded = VoxelTree::new();
    assert_eq!(load_voxels_file(&path, &mut loaded).unwrap(), 3);
    assert_eq!(encode_voxel_records(&loaded), encode_voxel_records(&tree));
    assert!(!path.with_extension("tmp").exists());
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let mut tree = VoxelTree::new();
    let err = load_voxels_file(dir.path().join("absent.voxels"), &mut tree).unwrap_err();
    assert!(matches!(err, VoxelFileError::NotFound(_)));
}

#[test]
fn test_corrupt_file_loads_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("corrupt.voxels");
    let mut data = encode_voxel_records(&sample_tree());
    data.extend_from_slice(&[2, 0xFF]);
    std::fs::write(&path, data).unwrap();

    let mut tree = VoxelTree::new();
    let err = load_voxels_file(&path, &mut tree).unwrap_err();
    assert!(matches!(err, VoxelFileError::Corrupt(_)));
    assert_eq!(tree.node_count(), 1);
}
