//! Single-voxel edits: insert records, point lookups and deletion.

use super::{NodeId, RecordError, VoxelRecord, VoxelTree};
use crate::color::Rgb;
use crate::octal::{OctalCode, OctalCodeError, NUMBER_OF_CHILDREN};

impl VoxelTree {
    /// Apply one `[code][R][G][B]` insert record from the start of `data`.
    ///
    /// Returns the number of bytes consumed.
    pub fn read_code_color_buffer_to_tree(
        &mut self,
        data: &[u8],
        destructive: bool,
    ) -> Result<usize, OctalCodeError> {
        let (record, len) = VoxelRecord::parse(data)?;
        self.set_voxel(&record.code, record.color, destructive);
        Ok(len)
    }

    /// Apply a run of insert records. Nothing is applied if any record is
    /// malformed.
    pub fn read_code_color_records(
        &mut self,
        data: &[u8],
        destructive: bool,
    ) -> Result<usize, RecordError> {
        let records = VoxelRecord::parse_all(data)?;
        for record in &records {
            self.set_voxel(&record.code, record.color, destructive);
        }
        Ok(records.len())
    }

    /// Color the node at `code`, creating the path to it.
    ///
    /// A non-destructive write onto a node with children is ignored; a
    /// destructive one deletes the children first. Returns whether the tree
    /// changed.
    pub fn set_voxel(&mut self, code: &OctalCode, color: Rgb, destructive: bool) -> bool {
        let mut path = vec![self.root()];
        let mut current = self.root();
        while let Some(index) = self[current].octal_code().branch_index_with_descendant(code) {
            current = self.add_child_at_index(current, index as usize);
            path.push(current);
        }

        let mut changed = false;
        if !self[current].is_leaf() {
            if !destructive {
                tracing::warn!(
                    code = %code,
                    "ignoring non-destructive write onto a voxel with children"
                );
                return false;
            }
            self.delete_children(current);
            changed = true;
        }

        changed |= self.node_mut(current).set_color(Some(color));
        self.stats.voxels_colored += 1;

        if changed {
            path.pop();
            self.subtree_changed(&path);
        }
        changed
    }

    /// Re-average ancestors after an edit, deepest first, when enabled.
    fn subtree_changed(&mut self, ancestors: &[NodeId]) {
        if !self.config.reaverage_on_edit {
            return;
        }
        for &id in ancestors.iter().rev() {
            self.set_color_from_average_of_children(id);
        }
    }

    /// Insert a voxel of edge `s` at the given point.
    pub fn create_voxel(
        &mut self,
        x: f32,
        y: f32,
        z: f32,
        s: f32,
        color: Rgb,
        destructive: bool,
    ) -> Result<bool, OctalCodeError> {
        let code = OctalCode::from_point(x, y, z, s)?;
        Ok(self.set_voxel(&code, color, destructive))
    }

    /// Node of exactly edge `s` at the given point, if present.
    pub fn get_voxel_at(&self, x: f32, y: f32, z: f32, s: f32) -> Result<Option<NodeId>, OctalCodeError> {
        let code = OctalCode::from_point(x, y, z, s)?;
        Ok(self.find_node(&code))
    }

    /// Delete the voxel at `code`.
    ///
    /// When the code lies inside a larger colored leaf, the leaf is broken
    /// into colored children down to the target level, leaving the target
    /// octant empty. With `collapse_empty_trees`, ancestors left without
    /// children are removed too. Returns whether anything changed.
    pub fn delete_voxel_code_from_tree(&mut self, code: &OctalCode, collapse_empty_trees: bool) -> bool {
        if code.is_root() {
            self.erase_all_voxels();
            return true;
        }

        let mut path = vec![self.root()];
        let mut current = self.root();
        loop {
            let node = &self[current];
            let Some(branch) = node.octal_code().branch_index_with_descendant(code) else {
                break;
            };
            match node.child_at_index(branch as usize) {
                Some(child) => {
                    current = child;
                    path.push(child);
                }
                None => {
                    let Some(color) = node.color().filter(|_| node.is_leaf()) else {
                        return false;
                    };
                    self.break_up_leaf(current, code, color);
                    self.subtree_changed(&path);
                    return true;
                }
            }
        }

        // `current` is the target; it has a parent because it is not the root
        path.pop();
        let parent = path[path.len() - 1];
        let Some(index) = code.last_section() else {
            return false;
        };
        self.delete_child_at_index(parent, index as usize);

        if collapse_empty_trees {
            while path.len() > 1 {
                let id = path[path.len() - 1];
                if !self[id].is_leaf() || self[id].is_colored() {
                    break;
                }
                path.pop();
                let Some(index) = self[id].octal_code().last_section() else {
                    break;
                };
                self.delete_child_at_index(path[path.len() - 1], index as usize);
            }
        }

        self.subtree_changed(&path);
        true
    }

    /// Split colored leaf `leaf` so that every octant except the one leading
    /// to `target` keeps `color`, down to `target`'s level.
    fn break_up_leaf(&mut self, leaf: NodeId, target: &OctalCode, color: Rgb) {
        let mut ancestor = leaf;
        while let Some(branch) = self[ancestor].octal_code().branch_index_with_descendant(target) {
            let branch = branch as usize;
            for index in (0..NUMBER_OF_CHILDREN).filter(|&i| i != branch) {
                let sibling = self.add_child_at_index(ancestor, index);
                self.node_mut(sibling).set_color(Some(color));
            }
            if self[ancestor].depth() + 1 == target.depth() {
                break;
            }
            let next = self.add_child_at_index(ancestor, branch);
            self.node_mut(next).set_color(Some(color));
            ancestor = next;
        }
    }

    /// Delete the voxel of edge `s` at the given point.
    pub fn delete_voxel_at(&mut self, x: f32, y: f32, z: f32, s: f32) -> Result<bool, OctalCodeError> {
        let code = OctalCode::from_point(x, y, z, s)?;
        Ok(self.delete_voxel_code_from_tree(&code, true))
    }

    /// Delete each voxel named by a run of `[code][RGB]` records. Colors are
    /// ignored. Nothing is deleted if any record is malformed.
    pub fn process_remove_voxel_records(&mut self, data: &[u8]) -> Result<usize, RecordError> {
        let records = VoxelRecord::parse_all(data)?;
        for record in &records {
            self.delete_voxel_code_from_tree(&record.code, true);
        }
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeConfig;

    fn code(sections: &[u8]) -> OctalCode {
        OctalCode::from_sections(sections).unwrap()
    }

    #[test]
    fn test_insert_record() {
        let mut tree = VoxelTree::new();
        let record = VoxelRecord::new(code(&[5]), Rgb::new(1, 0, 1)).to_bytes();
        let consumed = tree.read_code_color_buffer_to_tree(&record, false).unwrap();

        assert_eq!(consumed, record.len());
        let id = tree.find_node(&code(&[5])).unwrap();
        assert_eq!(tree[id].color(), Some(Rgb::new(1, 0, 1)));
        assert_eq!(tree.stats().voxels_colored, 1);
    }

    #[test]
    fn test_non_destructive_write_on_interior_is_ignored() {
        let mut tree = VoxelTree::new();
        tree.set_voxel(&code(&[2, 2]), Rgb::new(9, 9, 9), false);

        assert!(!tree.set_voxel(&code(&[2]), Rgb::new(1, 1, 1), false));
        let parent = tree.find_node(&code(&[2])).unwrap();
        assert_eq!(tree[parent].color(), None);
        assert!(tree.find_node(&code(&[2, 2])).is_some());

        assert!(tree.set_voxel(&code(&[2]), Rgb::new(1, 1, 1), true));
        assert!(tree[parent].is_leaf());
        assert_eq!(tree[parent].color(), Some(Rgb::new(1, 1, 1)));
    }

    #[test]
    fn test_reaverage_on_edit() {
        let mut tree = VoxelTree::with_config(TreeConfig {
            reaverage_on_edit: true,
        });
        for index in 0..4u8 {
            tree.set_voxel(&code(&[3, index]), Rgb::new(100, 0, 0), false);
        }
        let parent = tree.find_node(&code(&[3])).unwrap();
        assert_eq!(tree[parent].color(), Some(Rgb::new(100, 0, 0)));

        tree.delete_voxel_code_from_tree(&code(&[3, 0]), true);
        assert_eq!(tree[parent].color(), None);
    }

    #[test]
    fn test_get_voxel_at_exact_size_only() {
        let mut tree = VoxelTree::new();
        tree.create_voxel(0.1, 0.1, 0.1, 0.25, Rgb::new(5, 5, 5), false)
            .unwrap();

        assert!(tree.get_voxel_at(0.2, 0.2, 0.2, 0.25).unwrap().is_some());
        assert!(tree.get_voxel_at(0.1, 0.1, 0.1, 0.125).unwrap().is_none());
        assert!(tree.get_voxel_at(0.1, 0.1, 0.1, 0.0).is_err());
    }

    #[test]
    fn test_delete_collapses_empty_ancestors() {
        let mut tree = VoxelTree::new();
        tree.set_voxel(&code(&[1, 2, 3]), Rgb::new(1, 2, 3), false);
        assert_eq!(tree.node_count(), 4);

        assert!(tree.delete_voxel_code_from_tree(&code(&[1, 2, 3]), true));
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn test_delete_without_collapse_keeps_path() {
        let mut tree = VoxelTree::new();
        tree.set_voxel(&code(&[1, 2, 3]), Rgb::new(1, 2, 3), false);
        tree.delete_voxel_code_from_tree(&code(&[1, 2, 3]), false);
        assert_eq!(tree.node_count(), 3);
    }

    #[test]
    fn test_delete_inside_colored_leaf_breaks_it_up() {
        let mut tree = VoxelTree::new();
        let green = Rgb::new(0, 255, 0);
        tree.set_voxel(&code(&[4]), green, false);

        assert!(tree.delete_voxel_code_from_tree(&code(&[4, 6, 1]), true));

        // Seven siblings at each of the two new levels, plus the path node
        let leaf = tree.find_node(&code(&[4])).unwrap();
        assert_eq!(tree[leaf].child_count(), 8);
        let mid = tree.find_node(&code(&[4, 6])).unwrap();
        assert_eq!(tree[mid].child_count(), 7);
        assert!(tree.find_node(&code(&[4, 6, 1])).is_none());
        assert_eq!(
            tree[tree.find_node(&code(&[4, 6, 0])).unwrap()].color(),
            Some(green)
        );
    }

    #[test]
    fn test_delete_missing_voxel_is_noop() {
        let mut tree = VoxelTree::new();
        tree.set_voxel(&code(&[1]), Rgb::new(1, 1, 1), false);
        tree.set_voxel(&code(&[1, 0]), Rgb::new(1, 1, 1), true);
        assert!(!tree.delete_voxel_code_from_tree(&code(&[1, 5]), true));
        assert!(!tree.delete_voxel_code_from_tree(&code(&[6]), true));
    }

    #[test]
    fn test_remove_records_fail_closed() {
        let mut tree = VoxelTree::new();
        tree.set_voxel(&code(&[1]), Rgb::new(1, 1, 1), false);

        let mut data = VoxelRecord::new(code(&[1]), Rgb::default()).to_bytes();
        data.push(9);
        assert!(tree.process_remove_voxel_records(&data).is_err());
        assert!(tree.find_node(&code(&[1])).is_some());

        data.pop();
        assert_eq!(tree.process_remove_voxel_records(&data).unwrap(), 1);
        assert!(tree.find_node(&code(&[1])).is_none());
    }
}
