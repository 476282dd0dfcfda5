//! Mapbox Terrain-RGB height encoding.
//!
//! `height = -10000 + (R * 65536 + G * 256 + B) * 0.1`

use crate::ElevationGrid;

const OFFSET_M: f64 = 10_000.0;
/// Steps per metre (0.1 m resolution).
const STEPS_PER_M: f64 = 10.0;
const MAX_VALUE: u32 = 0xFF_FFFF;

/// Encode a height in metres as an RGB triple.
///
/// Heights below -10000 m or above the 24-bit range clamp to the extremes.
/// Values are truncated to the 0.1 m step below.
pub fn encode_height(height_m: f64) -> [u8; 3] {
    let scaled = ((height_m + OFFSET_M) * STEPS_PER_M).floor();
    let value = if scaled.is_nan() {
        0
    } else {
        scaled.clamp(0.0, MAX_VALUE as f64) as u32
    };
    [(value >> 16) as u8, (value >> 8) as u8, value as u8]
}

/// Decode an RGB triple to a height in metres.
pub fn decode_height(rgb: [u8; 3]) -> f64 {
    let value = (rgb[0] as u32) << 16 | (rgb[1] as u32) << 8 | rgb[2] as u32;
    -OFFSET_M + value as f64 / STEPS_PER_M
}

/// Encode a whole grid as packed row-major RGB bytes (3 per sample).
pub fn encode_grid(grid: &ElevationGrid) -> Vec<u8> {
    grid.values()
        .iter()
        .flat_map(|h| encode_height(*h as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_known_values() {
        // 0 m -> 100000 = 0x0186A0
        assert_eq!(encode_height(0.0), [0x01, 0x86, 0xA0]);
        assert_eq!(decode_height([0x01, 0x86, 0xA0]), 0.0);
        assert_eq!(encode_height(-10_000.0), [0, 0, 0]);
        assert_abs_diff_eq!(decode_height([1, 0, 0]), -10_000.0 + 6553.6, epsilon = 1e-9);
    }

    #[test]
    fn test_clamping() {
        assert_eq!(encode_height(-20_000.0), [0, 0, 0]);
        assert_eq!(encode_height(1.0e7), [0xFF, 0xFF, 0xFF]);
        assert_eq!(encode_height(f64::NAN), [0, 0, 0]);
    }

    #[test]
    fn test_decimetre_precision() {
        for h in [-431.75, 0.05, 8848.86, 123.45] {
            let decoded = decode_height(encode_height(h));
            assert!(decoded <= h + 1e-9, "{} decoded above input: {}", h, decoded);
            assert!(h - decoded < 0.1 + 1e-9, "{} decoded too low: {}", h, decoded);
        }
    }

    #[test]
    fn test_encode_grid_layout() {
        let grid = ElevationGrid::new(2, vec![0.0, -10_000.0, 0.0, 0.0]).unwrap();
        let bytes = encode_grid(&grid);
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[0..3], &[0x01, 0x86, 0xA0]);
        assert_eq!(&bytes[3..6], &[0, 0, 0]);
    }
}
