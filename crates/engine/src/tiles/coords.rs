//! Slippy map tile coordinates.

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Deepest zoom level accepted.
pub const MAX_ZOOM: u8 = 24;

/// Edge-adjacent then corner-adjacent offsets.
const NEIGHBOR_OFFSETS: [(i64, i64); 8] = [
    (0, -1),
    (1, 0),
    (0, 1),
    (-1, 0),
    (-1, -1),
    (1, -1),
    (1, 1),
    (-1, 1),
];

/// Coordinates of a web mercator tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Column, from the antimeridian eastward.
    pub x: u32,
    /// Row, from the north.
    pub y: u32,
    /// Zoom level.
    pub z: u8,
}

impl TileCoord {
    /// Creates tile coordinates, checking they exist at this zoom.
    pub fn new(x: u32, y: u32, z: u8) -> Result<Self, ValidationError> {
        let coord = Self { x, y, z };
        if z > MAX_ZOOM || u64::from(x) >= coord.tiles_per_side() || u64::from(y) >= coord.tiles_per_side()
        {
            return Err(ValidationError::InvalidTile {
                input: coord.to_string(),
            });
        }
        Ok(coord)
    }

    /// Parses `z/x/y` or `x,y,z`.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidTile {
            input: input.to_string(),
        };
        let parts: Vec<&str> = if input.contains('/') {
            input.split('/').collect()
        } else {
            input.split(',').collect()
        };
        if parts.len() != 3 {
            return Err(invalid());
        }
        let numbers: Vec<u32> = parts
            .iter()
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<_, _>>()
            .map_err(|_| invalid())?;
        let (x, y, z) = if input.contains('/') {
            (numbers[1], numbers[2], numbers[0])
        } else {
            (numbers[0], numbers[1], numbers[2])
        };
        let z = u8::try_from(z).map_err(|_| invalid())?;
        Self::new(x, y, z)
    }

    /// Number of tiles along one side at this zoom.
    pub fn tiles_per_side(&self) -> u64 {
        1u64 << self.z
    }

    /// Returns `[west, south, east, north]` in degrees.
    pub fn bbox(&self) -> [f64; 4] {
        let n = self.tiles_per_side() as f64;
        [
            tile_lon(f64::from(self.x), n),
            tile_lat(f64::from(self.y) + 1.0, n),
            tile_lon(f64::from(self.x) + 1.0, n),
            tile_lat(f64::from(self.y), n),
        ]
    }

    /// Returns the existing neighbor tiles, edges first, then corners.
    ///
    /// Columns wrap around the antimeridian, rows beyond the poles do not
    /// exist. At low zoom wrapping can fold neighbors onto each other or onto
    /// the tile itself; duplicates are dropped.
    pub fn neighbors(&self) -> Vec<TileCoord> {
        let n = self.tiles_per_side() as i64;
        let mut neighbors: Vec<TileCoord> = Vec::with_capacity(8);
        for (dx, dy) in NEIGHBOR_OFFSETS {
            let y = i64::from(self.y) + dy;
            if y < 0 || y >= n {
                continue;
            }
            let x = (i64::from(self.x) + dx).rem_euclid(n);
            let tile = TileCoord {
                x: x as u32,
                y: y as u32,
                z: self.z,
            };
            if tile != *self && !neighbors.contains(&tile) {
                neighbors.push(tile);
            }
        }
        neighbors
    }

    /// Projects a longitude/latitude to pixel coordinates inside this tile.
    pub fn project(&self, lon: f64, lat: f64, extent: u32) -> (i64, i64) {
        let n = self.tiles_per_side() as f64;
        let lat = lat.clamp(-85.051_128_78, 85.051_128_78).to_radians();
        let world_x = (lon + 180.0) / 360.0 * n;
        let world_y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * n;
        let px = (world_x - f64::from(self.x)) * f64::from(extent);
        let py = (world_y - f64::from(self.y)) * f64::from(extent);
        (px.round() as i64, py.round() as i64)
    }
}

fn tile_lon(x: f64, n: f64) -> f64 {
    x / n * 360.0 - 180.0
}

fn tile_lat(y: f64, n: f64) -> f64 {
    (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees()
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}
