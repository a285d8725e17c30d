use std::fmt;

use crate::geo;

/// A web-mercator slippy-map tile with x, y and z-coordinate.
/// ref: https://wiki.openstreetmap.org/wiki/Slippy_map_tilenames
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

/// Geographic extent of a tile in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileBounds {
    pub north: f64,
    pub south: f64,
    pub west: f64,
    pub east: f64,
}

impl Tile {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// The tile containing the given coordinate (in degrees), clamped into the
    /// pyramid at `zoom`. Zooms deeper than [`geo::MAX_ZOOM`] are clamped.
    pub fn from_degrees(lat_deg: f64, lon_deg: f64, zoom: u8) -> Self {
        let zoom = zoom.min(geo::MAX_ZOOM);
        let (x, y) = geo::degrees_to_tile(lat_deg, lon_deg, zoom);
        let last = (1_i64 << zoom) - 1;

        Self::new(x.clamp(0, last) as u32, y.clamp(0, last) as u32, zoom)
    }

    pub fn bounds(&self) -> TileBounds {
        let (x, y) = (f64::from(self.x), f64::from(self.y));

        TileBounds {
            north: geo::tile_to_latitude(y, self.z),
            south: geo::tile_to_latitude(y + 1_f64, self.z),
            west: geo::tile_to_longitude(x, self.z),
            east: geo::tile_to_longitude(x + 1_f64, self.z),
        }
    }

    /// Deterministic name of the per-tile intermediate file.
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}_{}_{}.{}", self.x, self.y, self.z, extension)
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.x, self.y, self.z)
    }
}
