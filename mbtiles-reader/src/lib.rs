#![doc = include_str!("../README.md")]

// Re-export sqlx
pub use sqlx;

mod errors;
pub use errors::{MbtError, MbtResult};

mod headers;
pub use headers::{HeaderMode, TileHeaders, http_date};

mod inference;
pub use inference::{ZOOM_PROBE_LIMIT, ensure_bounds, ensure_center, ensure_zooms};

mod mbtiles;
pub use mbtiles::{Mbtiles, TileData};

mod metadata;
pub use metadata::Info;

mod store;
pub use store::{Tile, TileStore};

/// Convert an XYZ row into the TMS row stored in `MBTiles` files (and back).
///
/// The shift is a 32-bit wrapping shift: the shift amount is taken modulo 32,
/// so a negative `zoom` does not panic (`-1` shifts by 31, giving `i32::MIN`).
/// Such rows do not exist in any file, so the lookup simply finds nothing.
#[must_use]
#[expect(clippy::cast_sign_loss)]
pub fn invert_y_value(zoom: i32, y: i64) -> i64 {
    let tiles = 1_i32.wrapping_shl(zoom as u32);
    i64::from(tiles).wrapping_sub(1).wrapping_sub(y)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, 0, 0)]
    #[case(1, 0, 1)]
    #[case(1, 1, 0)]
    #[case(4, 15, 0)]
    #[case(4, 0, 15)]
    #[case(18, 262_140, 3)]
    #[case(3, -1, 8)]
    fn flip_rows(#[case] zoom: i32, #[case] xyz: i64, #[case] tms: i64) {
        assert_eq!(invert_y_value(zoom, xyz), tms);
        assert_eq!(invert_y_value(zoom, tms), xyz);
    }

    #[test]
    fn flip_round_trip() {
        for zoom in 0..=30 {
            let max = (1_i64 << zoom) - 1;
            for y in [0, 1, max / 2, max] {
                assert_eq!(invert_y_value(zoom, invert_y_value(zoom, y)), y);
            }
        }
    }

    #[test]
    fn flip_wraps_instead_of_panicking() {
        // 1 << 31 overflows into the sign bit
        assert_eq!(invert_y_value(31, 0), i64::from(i32::MIN) - 1);
        // negative zoom shifts by (zoom mod 32)
        assert_eq!(invert_y_value(-1, 0), i64::from(i32::MIN) - 1);
        assert_eq!(invert_y_value(-31, 0), 1);
        assert_eq!(invert_y_value(32, 0), 0);
        assert_eq!(invert_y_value(0, i64::MAX), i64::MIN + 1);
        assert_eq!(invert_y_value(0, i64::MIN), i64::MIN);
    }
}
