//! Display colors for row and column tags.

use serde::{Deserialize, Serialize};

/// Linear RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl LinearColor {
    pub const WHITE: LinearColor = LinearColor::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Build an opaque color from 8-bit channels
    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::new(
            f32::from(r) / 255.0,
            f32::from(g) / 255.0,
            f32::from(b) / 255.0,
            1.0,
        )
    }
}

impl Default for LinearColor {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Starting palette cycled when new rows or columns get a color
const HEADER_PALETTE: [(u8, u8, u8); 10] = [
    (116, 0, 184),
    (105, 48, 195),
    (94, 96, 206),
    (83, 144, 217),
    (78, 168, 222),
    (72, 191, 227),
    (86, 207, 225),
    (100, 223, 223),
    (114, 239, 221),
    (128, 255, 219),
];

/// Caller-owned position in the header palette.
///
/// Each call to [`PaletteCursor::next_color`] hands out the next palette entry,
/// wrapping around at the end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaletteCursor(usize);

impl PaletteCursor {
    pub fn new() -> Self {
        Self(0)
    }

    /// Number of distinct palette entries
    pub const fn palette_len() -> usize {
        HEADER_PALETTE.len()
    }

    pub fn next_color(&mut self) -> LinearColor {
        let (r, g, b) = HEADER_PALETTE[self.0 % HEADER_PALETTE.len()];
        self.0 = (self.0 + 1) % HEADER_PALETTE.len();
        LinearColor::from_rgb8(r, g, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_cycles() {
        let mut cursor = PaletteCursor::new();
        let first = cursor.next_color();
        for _ in 1..PaletteCursor::palette_len() {
            assert_ne!(cursor.next_color(), first);
        }
        assert_eq!(cursor.next_color(), first);
    }

    #[test]
    fn test_independent_cursors() {
        let mut a = PaletteCursor::new();
        let mut b = PaletteCursor::new();
        a.next_color();
        a.next_color();
        assert_eq!(b.next_color(), LinearColor::from_rgb8(116, 0, 184));
    }
}
