//! Mapping between octal codes and unit-cube geometry.

use super::{OctalCode, OctalCodeError};
use crate::color::Rgb;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Minimum corner and edge length of a node's cube.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoxelPositionSize {
    pub corner: Vec3,
    pub scale: f32,
}

impl VoxelPositionSize {
    pub fn center(&self) -> Vec3 {
        self.corner + Vec3::splat(self.scale * 0.5)
    }

    pub fn contains(&self, point: Vec3) -> bool {
        let max = self.corner + Vec3::splat(self.scale);
        point.cmpge(self.corner).all() && point.cmplt(max).all()
    }
}

/// Unit offset of child `section` within its parent: x from bit 2, y from
/// bit 1, z from bit 0.
pub fn octant_offset(section: u8) -> Vec3 {
    Vec3::new(
        f32::from((section >> 2) & 1),
        f32::from((section >> 1) & 1),
        f32::from(section & 1),
    )
}

/// Corner and scale of the cube addressed by `code`.
pub fn voxel_details_for_code(code: &OctalCode) -> VoxelPositionSize {
    let mut corner = Vec3::ZERO;
    let mut scale = 1.0f32;
    for section in code.sections() {
        scale *= 0.5;
        corner += octant_offset(section) * scale;
    }
    VoxelPositionSize { corner, scale }
}

/// Section path of the voxel of edge `s` containing `(x, y, z)`.
///
/// Subdivides from the unit cube until the running scale drops to `s` or
/// below, so `s = 2^-k` yields depth `k`. Points outside the unit cube clamp
/// to the nearest boundary voxel.
pub(crate) fn sections_for_point(x: f32, y: f32, z: f32, s: f32) -> Result<Vec<u8>, OctalCodeError> {
    if !s.is_finite() || s <= 0.0 {
        return Err(OctalCodeError::InvalidVoxelSize(s));
    }
    if !(x.is_finite() && y.is_finite() && z.is_finite()) {
        return Err(OctalCodeError::InvalidPosition { x, y, z });
    }

    let point = Vec3::new(x, y, z);
    let mut test = Vec3::splat(0.5);
    let mut scale = 1.0f32;
    let mut sections = Vec::new();

    while scale > s {
        let child_scale = scale * 0.5;
        let step = child_scale * 0.5;
        let mut section = 0u8;
        for (axis, bit) in [(0usize, 2u8), (1, 1), (2, 0)] {
            if point[axis] >= test[axis] {
                section |= 1 << bit;
                test[axis] += step;
            } else {
                test[axis] -= step;
            }
        }
        sections.push(section);
        scale = child_scale;
    }

    Ok(sections)
}

/// Build an insert record `[code][R][G][B]` for the voxel of edge `s` at the
/// given point.
pub fn point_to_voxel(x: f32, y: f32, z: f32, s: f32, color: Rgb) -> Result<Vec<u8>, OctalCodeError> {
    let mut record = OctalCode::from_point(x, y, z, s)?.into_bytes();
    record.extend_from_slice(&color.to_bytes());
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_of_upper_octant() {
        let details = voxel_details_for_code(&OctalCode::from_sections(&[7, 0]).unwrap());
        assert_eq!(details.center(), Vec3::splat(0.625));
        assert!(details.contains(details.center()));
    }

    #[test]
    fn test_position_size_serde() {
        let details = voxel_details_for_code(&OctalCode::from_sections(&[7]).unwrap());
        let json = serde_json::to_string(&details).unwrap();
        assert_eq!(json, r#"{"corner":[0.5,0.5,0.5],"scale":0.5}"#);
        assert_eq!(serde_json::from_str::<VoxelPositionSize>(&json).unwrap(), details);
    }

    #[test]
    fn test_depth_from_size() {
        for k in 0..12 {
            let s = 0.5f32.powi(k);
            let code = OctalCode::from_point(0.3, 0.6, 0.9, s).unwrap();
            assert_eq!(code.depth(), k as usize);
        }
        // Sizes between powers of two round down to the next level
        assert_eq!(OctalCode::from_point(0.1, 0.1, 0.1, 0.3).unwrap().depth(), 2);
    }

    #[test]
    fn test_octant_bits() {
        let code = OctalCode::from_point(0.75, 0.25, 0.75, 0.5).unwrap();
        assert_eq!(code.sections().collect::<Vec<_>>(), vec![0b101]);

        let details = voxel_details_for_code(&code);
        assert_eq!(details.corner, Vec3::new(0.5, 0.0, 0.5));
        assert_eq!(details.scale, 0.5);
    }

    #[test]
    fn test_invalid_size() {
        assert_eq!(
            OctalCode::from_point(0.5, 0.5, 0.5, 0.0),
            Err(OctalCodeError::InvalidVoxelSize(0.0))
        );
        assert!(OctalCode::from_point(0.5, 0.5, 0.5, -1.0).is_err());
        assert!(OctalCode::from_point(0.5, 0.5, 0.5, f32::NAN).is_err());
        assert!(OctalCode::from_point(f32::INFINITY, 0.5, 0.5, 0.25).is_err());
    }

    #[test]
    fn test_point_to_voxel_record() {
        let record = point_to_voxel(0.75, 0.25, 0.75, 0.5, Rgb::new(1, 2, 3)).unwrap();
        assert_eq!(record, vec![1, 0b1010_0000, 1, 2, 3]);
    }

    #[test]
    fn test_contains() {
        let details = voxel_details_for_code(&OctalCode::from_sections(&[7, 0]).unwrap());
        assert_eq!(details.corner, Vec3::new(0.5, 0.5, 0.5));
        assert_eq!(details.scale, 0.25);
        assert!(details.contains(Vec3::new(0.6, 0.6, 0.6)));
        assert!(!details.contains(Vec3::new(0.75, 0.6, 0.6)));
    }
}
