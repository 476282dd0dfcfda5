//! Square elevation grids and the cached tile payload.

use crate::{Result, TerrainError, TileCoord};
use bytes::{Buf, BufMut, BytesMut};

/// Native samples per tile edge.
pub const GRID_SIZE: usize = 16;

const TILE_MAGIC: &[u8; 4] = b"MRFG";
const TILE_CODEC_VERSION: u8 = 1;
/// magic + version + z + x + y + size
const TILE_HEADER_LEN: usize = 4 + 1 + 1 + 4 + 4 + 2;

/// An N×N grid of elevations in metres, stored row-major.
///
/// Orientation follows [`crate::TileBounds::sample_position`]: row 0 is north,
/// column 0 is west.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationGrid {
    size: usize,
    data: Vec<f32>,
}

impl ElevationGrid {
    /// Build a grid from row-major samples. Exactly `size * size` values are required.
    pub fn new(size: usize, data: Vec<f32>) -> Result<Self> {
        let expected = size * size;
        if data.len() != expected {
            return Err(TerrainError::GridShape {
                size,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { size, data })
    }

    /// A grid of the given size with every sample at sea level.
    pub fn zeros(size: usize) -> Self {
        Self {
            size,
            data: vec![0.0; size * size],
        }
    }

    /// Samples per edge.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Row-major sample values.
    pub fn values(&self) -> &[f32] {
        &self.data
    }

    /// Sample at (`row`, `col`), or `None` outside the grid.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < self.size && col < self.size {
            Some(self.data[row * self.size + col])
        } else {
            None
        }
    }

    fn at(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.size + col] as f64
    }

    /// Bilinear interpolation at a fractional (row, col).
    ///
    /// Indices are clamped to the grid, so positions on or beyond an edge use
    /// the edge samples.
    pub fn interpolate(&self, row: f64, col: f64) -> f64 {
        if self.size == 0 {
            return 0.0;
        }
        let cells = self.cells_for(row, col);

        let v00 = self.at(cells.r0, cells.c0);
        let v01 = self.at(cells.r0, cells.c1);
        let v10 = self.at(cells.r1, cells.c0);
        let v11 = self.at(cells.r1, cells.c1);

        v00 * (1.0 - cells.fc) * (1.0 - cells.fr)
            + v01 * cells.fc * (1.0 - cells.fr)
            + v10 * (1.0 - cells.fc) * cells.fr
            + v11 * cells.fc * cells.fr
    }

    /// Resample to `out_size`×`out_size` with bilinear interpolation.
    ///
    /// Output corners coincide with input corners: output index `i` reads the
    /// source at `i * (n - 1) / (out_size - 1)`. A single-sample output takes
    /// the north-west corner.
    pub fn resample(&self, out_size: usize) -> ElevationGrid {
        if self.size == 0 || out_size == 0 {
            return ElevationGrid::zeros(out_size);
        }

        let span = (self.size - 1) as f64;
        let divisor = out_size.saturating_sub(1).max(1) as f64;
        let source_index = |i: usize| i as f64 * span / divisor;

        let mut data = Vec::with_capacity(out_size * out_size);
        for row in 0..out_size {
            for col in 0..out_size {
                data.push(self.interpolate(source_index(row), source_index(col)) as f32);
            }
        }
        ElevationGrid {
            size: out_size,
            data,
        }
    }

    /// Lowest sample, or `None` for an empty grid.
    pub fn min(&self) -> Option<f32> {
        self.data.iter().copied().reduce(f32::min)
    }

    /// Highest sample, or `None` for an empty grid.
    pub fn max(&self) -> Option<f32> {
        self.data.iter().copied().reduce(f32::max)
    }

    fn cells_for(&self, row: f64, col: f64) -> InterpolationCells {
        let last = (self.size - 1) as f64;
        let row = if row.is_nan() { 0.0 } else { row.clamp(0.0, last) };
        let col = if col.is_nan() { 0.0 } else { col.clamp(0.0, last) };

        let r0 = row.floor() as usize;
        let c0 = col.floor() as usize;
        InterpolationCells {
            r0,
            c0,
            r1: (r0 + 1).min(self.size - 1),
            c1: (c0 + 1).min(self.size - 1),
            fr: row - r0 as f64,
            fc: col - c0 as f64,
        }
    }
}

struct InterpolationCells {
    r0: usize,
    c0: usize,
    r1: usize,
    c1: usize,
    fr: f64,
    fc: f64,
}

/// A fetched tile: its key, native grid, and which samples were substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainTile {
    /// Tile key.
    pub coord: TileCoord,
    /// Native elevation grid.
    pub grid: ElevationGrid,
    /// Row-major mask; `true` where the sample is a 0 m stand-in for a failed batch.
    pub degraded: Vec<bool>,
}

impl TerrainTile {
    /// Build a tile. The mask must match the grid sample count.
    pub fn new(coord: TileCoord, grid: ElevationGrid, degraded: Vec<bool>) -> Result<Self> {
        if degraded.len() != grid.values().len() {
            return Err(TerrainError::GridShape {
                size: grid.size(),
                expected: grid.values().len(),
                actual: degraded.len(),
            });
        }
        Ok(Self {
            coord,
            grid,
            degraded,
        })
    }

    /// Number of substituted samples.
    pub fn degraded_count(&self) -> usize {
        self.degraded.iter().filter(|d| **d).count()
    }

    /// Whether any sample was substituted.
    pub fn is_degraded(&self) -> bool {
        self.degraded.iter().any(|d| *d)
    }

    /// Interpolated elevation at a coordinate inside (or clamped to) the tile,
    /// plus whether any of the four surrounding samples is degraded.
    pub fn sample(&self, lat: f64, lon: f64) -> (f64, bool) {
        let size = self.grid.size();
        if size == 0 {
            return (0.0, true);
        }
        let (row, col) = self.coord.bounds().fractional_index(lat, lon, size);
        let cells = self.grid.cells_for(row, col);
        let touched = [
            (cells.r0, cells.c0),
            (cells.r0, cells.c1),
            (cells.r1, cells.c0),
            (cells.r1, cells.c1),
        ]
        .iter()
        .any(|(r, c)| self.degraded[r * size + c]);

        (self.grid.interpolate(row, col), touched)
    }

    /// Serialize for a [`crate::CacheStore`].
    ///
    /// Layout: `MRFG`, version, z, x (u32 LE), y (u32 LE), size (u16 LE),
    /// `size²` f32 LE samples, `size²` mask bytes.
    pub fn encode(&self) -> Vec<u8> {
        let samples = self.grid.values().len();
        let mut buf = BytesMut::with_capacity(TILE_HEADER_LEN + samples * 5);
        buf.put_slice(TILE_MAGIC);
        buf.put_u8(TILE_CODEC_VERSION);
        buf.put_u8(self.coord.z);
        buf.put_u32_le(self.coord.x);
        buf.put_u32_le(self.coord.y);
        buf.put_u16_le(self.grid.size() as u16);
        for v in self.grid.values() {
            buf.put_f32_le(*v);
        }
        for d in &self.degraded {
            buf.put_u8(u8::from(*d));
        }
        buf.to_vec()
    }

    /// Inverse of [`TerrainTile::encode`].
    pub fn decode(mut bytes: &[u8]) -> Result<Self> {
        if bytes.len() < TILE_HEADER_LEN {
            return Err(TerrainError::Codec(format!(
                "tile record too short ({} bytes)",
                bytes.len()
            )));
        }
        if &bytes[..4] != TILE_MAGIC {
            return Err(TerrainError::Codec("bad tile magic".to_string()));
        }
        bytes.advance(4);

        let version = bytes.get_u8();
        if version != TILE_CODEC_VERSION {
            return Err(TerrainError::Codec(format!(
                "unsupported tile codec version {}",
                version
            )));
        }

        let z = bytes.get_u8();
        let x = bytes.get_u32_le();
        let y = bytes.get_u32_le();
        let coord = TileCoord::new(z, x, y)?;
        let size = bytes.get_u16_le() as usize;
        let samples = size * size;

        if bytes.remaining() != samples * 5 {
            return Err(TerrainError::Codec(format!(
                "tile body is {} bytes, expected {}",
                bytes.remaining(),
                samples * 5
            )));
        }

        let mut data = Vec::with_capacity(samples);
        for _ in 0..samples {
            data.push(bytes.get_f32_le());
        }
        let degraded = (0..samples).map(|_| bytes.get_u8() != 0).collect();

        TerrainTile::new(coord, ElevationGrid::new(size, data)?, degraded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp(size: usize) -> ElevationGrid {
        let data = (0..size * size)
            .map(|i| ((i / size) * 10 + (i % size)) as f32)
            .collect();
        ElevationGrid::new(size, data).unwrap()
    }

    #[test]
    fn test_grid_shape_rejected() {
        let err = ElevationGrid::new(4, vec![0.0; 15]).unwrap_err();
        assert!(matches!(
            err,
            TerrainError::GridShape {
                expected: 16,
                actual: 15,
                ..
            }
        ));
    }

    #[test]
    fn test_interpolate_at_samples_and_between() {
        let grid = ramp(4);
        assert_relative_eq!(grid.interpolate(2.0, 3.0), 23.0);
        assert_relative_eq!(grid.interpolate(0.5, 0.5), 5.5);
        assert_relative_eq!(grid.interpolate(1.0, 2.25), 12.25);
    }

    #[test]
    fn test_interpolate_clamps_edges() {
        let grid = ramp(4);
        assert_relative_eq!(grid.interpolate(-3.0, -1.0), 0.0);
        assert_relative_eq!(grid.interpolate(3.0, 3.0), 33.0);
        assert_relative_eq!(grid.interpolate(9.0, 9.0), 33.0);
        assert_relative_eq!(grid.interpolate(f64::NAN, 1.0), 1.0);
    }

    #[test]
    fn test_resample_preserves_corners() {
        let grid = ramp(16);
        for out in [2, 5, 64, 256] {
            let resampled = grid.resample(out);
            assert_eq!(resampled.size(), out);
            assert_eq!(resampled.get(0, 0), grid.get(0, 0));
            assert_eq!(resampled.get(0, out - 1), grid.get(0, 15));
            assert_eq!(resampled.get(out - 1, 0), grid.get(15, 0));
            assert_eq!(resampled.get(out - 1, out - 1), grid.get(15, 15));
        }
    }

    #[test]
    fn test_resample_single_sample() {
        let grid = ramp(16);
        let one = grid.resample(1);
        assert_eq!(one.values(), &[0.0]);
    }

    #[test]
    fn test_min_max() {
        let grid = ramp(3);
        assert_eq!(grid.min(), Some(0.0));
        assert_eq!(grid.max(), Some(22.0));
        assert_eq!(ElevationGrid::zeros(0).max(), None);
    }

    #[test]
    fn test_tile_codec_round_trip_bit_exact() {
        let coord = TileCoord::new(12, 655, 1430).unwrap();
        let data: Vec<f32> = (0..256).map(|i| (i as f32) * 1.337 - 40.25).collect();
        let mut degraded = vec![false; 256];
        degraded[200..256].iter_mut().for_each(|d| *d = true);
        let tile = TerrainTile::new(coord, ElevationGrid::new(16, data).unwrap(), degraded).unwrap();

        let decoded = TerrainTile::decode(&tile.encode()).unwrap();
        assert_eq!(decoded, tile);
        for (a, b) in decoded.grid.values().iter().zip(tile.grid.values()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        assert_eq!(decoded.degraded_count(), 56);
    }

    #[test]
    fn test_tile_decode_rejects_garbage() {
        assert!(TerrainTile::decode(b"nope").is_err());
        let coord = TileCoord::new(3, 1, 1).unwrap();
        let tile = TerrainTile::new(coord, ElevationGrid::zeros(4), vec![false; 16]).unwrap();
        let mut bytes = tile.encode();
        bytes.pop();
        assert!(matches!(TerrainTile::decode(&bytes), Err(TerrainError::Codec(_))));
        bytes[0] = b'X';
        assert!(TerrainTile::decode(&bytes).is_err());
    }

    #[test]
    fn test_sample_flags_degraded_neighbours() {
        let coord = TileCoord::new(12, 655, 1430).unwrap();
        let mut degraded = vec![false; 256];
        degraded[0] = true;
        let tile = TerrainTile::new(coord, ElevationGrid::zeros(16), degraded).unwrap();
        let b = coord.bounds();

        let (_, nw_flag) = tile.sample(b.max_lat, b.min_lon);
        assert!(nw_flag);
        let (_, se_flag) = tile.sample(b.min_lat, b.max_lon);
        assert!(!se_flag);
    }
}
