//! Shared voxel tree owned by the server

use crate::config::ServerConfig;
use parking_lot::{RwLock, RwLockReadGuard};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use voxels::io::{load_voxels_file, save_voxels_file, VoxelFileError};
use voxels::{BitstreamError, TreeConfig, VoxelRecord, VoxelTree};

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("voxel file error: {0}")]
    File(#[from] VoxelFileError),
    #[error("bitstream rejected: {0}")]
    Bitstream(#[from] BitstreamError),
}

/// Cheaply clonable handle to the world tree.
///
/// Every mutation bumps the revision while the write lock is held, so a
/// reader that sees revision `r` also sees every edit up to `r`.
#[derive(Debug, Clone)]
pub struct WorldState {
    inner: Arc<WorldInner>,
}

#[derive(Debug)]
struct WorldInner {
    tree: RwLock<VoxelTree>,
    revision: AtomicU64,
    tree_file: Option<PathBuf>,
}

impl WorldState {
    pub fn new(tree: VoxelTree, tree_file: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(WorldInner {
                tree: RwLock::new(tree),
                revision: AtomicU64::new(0),
                tree_file,
            }),
        }
    }

    /// Load the configured voxel file, or start empty when there is none.
    pub fn load_or_default(config: &ServerConfig) -> Result<Self, WorldError> {
        let mut tree = VoxelTree::with_config(TreeConfig {
            reaverage_on_edit: config.reaverage_on_edit,
        });

        if let Some(path) = &config.tree_file {
            match load_voxels_file(path, &mut tree) {
                Ok(_) => tree.reaverage_voxel_colors(),
                Err(VoxelFileError::NotFound(_)) => {
                    tracing::info!("No voxel file at {}, starting empty", path.display());
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(Self::new(tree, config.tree_file.clone()))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, VoxelTree> {
        self.inner.tree.read()
    }

    pub fn revision(&self) -> u64 {
        self.inner.revision.load(Ordering::Acquire)
    }

    /// Apply a `V` bitstream sent by a peer. Malformed buffers change nothing.
    pub fn apply_bitstream(&self, data: &[u8]) -> Result<usize, WorldError> {
        let mut tree = self.inner.tree.write();
        let records = tree.read_bitstream_to_tree(data)?;
        if records > 0 {
            self.bump();
        }
        Ok(records)
    }

    /// Returns how many records changed the tree.
    pub fn set_voxels(&self, records: &[VoxelRecord], destructive: bool) -> usize {
        let mut tree = self.inner.tree.write();
        let changed = records
            .iter()
            .filter(|record| tree.set_voxel(&record.code, record.color, destructive))
            .count();
        if changed > 0 {
            self.bump();
        }
        changed
    }

    /// Delete the voxel at each record's code, collapsing emptied branches.
    pub fn erase_voxels(&self, records: &[VoxelRecord]) -> usize {
        let mut tree = self.inner.tree.write();
        let erased = records
            .iter()
            .filter(|record| tree.delete_voxel_code_from_tree(&record.code, true))
            .count();
        if erased > 0 {
            self.bump();
        }
        erased
    }

    /// Write the tree to the configured file. Returns `None` without a file.
    pub fn save(&self) -> Result<Option<usize>, WorldError> {
        let Some(path) = &self.inner.tree_file else {
            return Ok(None);
        };
        let tree = self.inner.tree.read();
        let count = save_voxels_file(path, &tree)?;
        tracing::info!("Saved {} voxels to {}", count, path.display());
        Ok(Some(count))
    }

    fn bump(&self) {
        self.inner.revision.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxels::{OctalCode, Rgb};

    fn record(sections: &[u8], shade: u8) -> VoxelRecord {
        VoxelRecord::new(
            OctalCode::from_sections(sections).unwrap(),
            Rgb::new(shade, shade, shade),
        )
    }

    #[test]
    fn test_edits_bump_revision() {
        let world = WorldState::new(VoxelTree::new(), None);
        assert_eq!(world.revision(), 0);

        assert_eq!(world.set_voxels(&[record(&[1, 2], 9)], false), 1);
        assert_eq!(world.revision(), 1);

        // Same color again changes nothing
        assert_eq!(world.set_voxels(&[record(&[1, 2], 9)], false), 0);
        assert_eq!(world.revision(), 1);

        assert_eq!(world.erase_voxels(&[record(&[1, 2], 0)]), 1);
        assert_eq!(world.revision(), 2);
        assert_eq!(world.read().node_count(), 1);
    }

    #[test]
    fn test_rejected_bitstream_keeps_revision() {
        let world = WorldState::new(VoxelTree::new(), None);
        assert!(world.apply_bitstream(&[b'V']).is_err());
        assert_eq!(world.revision(), 0);
    }

    #[test]
    fn test_save_without_file() {
        let world = WorldState::new(VoxelTree::new(), None);
        assert_eq!(world.save().unwrap(), None);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ServerConfig {
            tree_file: Some(dir.path().join("world.voxels")),
            ..ServerConfig::default()
        };

        let world = WorldState::load_or_default(&config).unwrap();
        assert_eq!(world.read().node_count(), 1);
        world.set_voxels(&[record(&[3], 40), record(&[4, 4], 80)], false);
        assert_eq!(world.save().unwrap(), Some(2));

        let reloaded = WorldState::load_or_default(&config).unwrap();
        let tree = reloaded.read();
        let code = OctalCode::from_sections(&[4, 4]).unwrap();
        let id = tree.find_node(&code).unwrap();
        assert_eq!(tree[id].color(), Some(Rgb::new(80, 80, 80)));
    }
}
