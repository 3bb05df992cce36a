//! Voxel colors and child color averaging.

use serde::{Deserialize, Serialize};

/// Minimum number of colored children needed before a parent takes their
/// average color. With fewer, the parent is left uncolored.
pub const MIN_CHILDREN_FOR_AVERAGE: usize = 4;

/// An opaque RGB voxel color.
///
/// "No color" is expressed as `Option<Rgb>::None` on the node, never through
/// an alpha channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn from_bytes(bytes: [u8; 3]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2])
    }

    pub const fn to_bytes(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl From<[u8; 3]> for Rgb {
    fn from(bytes: [u8; 3]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Running per-channel sum of child colors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColorSum {
    r: u32,
    g: u32,
    b: u32,
    count: usize,
}

impl ColorSum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, color: Rgb) {
        self.r += u32::from(color.r);
        self.g += u32::from(color.g);
        self.b += u32::from(color.b);
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Integer average of the accumulated colors, or `None` when fewer than
    /// [`MIN_CHILDREN_FOR_AVERAGE`] colors contributed.
    pub fn average(&self) -> Option<Rgb> {
        if self.count < MIN_CHILDREN_FOR_AVERAGE {
            return None;
        }
        let count = self.count as u32;
        Some(Rgb::new(
            (self.r / count) as u8,
            (self.g / count) as u8,
            (self.b / count) as u8,
        ))
    }
}

impl FromIterator<Rgb> for ColorSum {
    fn from_iter<I: IntoIterator<Item = Rgb>>(iter: I) -> Self {
        let mut sum = ColorSum::new();
        for color in iter {
            sum.add(color);
        }
        sum
    }
}
