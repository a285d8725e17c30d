use crate::tile::{Tile, TileBounds};

/// Maps a pixel of a fetched tile to the geographic location it samples.
pub trait TileProjection: Send + Sync {
    /// Returns `(longitude, latitude)` in degrees for pixel `(px, py)` of
    /// `tile`, where `py` grows southwards.
    fn pixel_to_location(&self, px: u32, py: u32, tile: &Tile) -> (f64, f64);
}

/// Affine mapping of pixel centers onto the tile's geographic bounds.
///
/// Spacing is constant within a tile in both axes, which is what the XYZ
/// grid readers downstream expect from a single file.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineTileProjection {
    pub tile_size: u32,
}

impl AffineTileProjection {
    pub fn new(tile_size: u32) -> Self {
        Self { tile_size }
    }

    fn locate(&self, px: u32, py: u32, b: &TileBounds) -> (f64, f64) {
        let size = f64::from(self.tile_size);
        let fx = (f64::from(px) + 0.5) / size;
        let fy = (f64::from(py) + 0.5) / size;

        (b.west + fx * (b.east - b.west), b.north - fy * (b.north - b.south))
    }
}

impl TileProjection for AffineTileProjection {
    fn pixel_to_location(&self, px: u32, py: u32, tile: &Tile) -> (f64, f64) {
        self.locate(px, py, &tile.bounds())
    }
}
