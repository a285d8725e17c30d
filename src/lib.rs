//! Fetch elevation tiles for a bounding box and mosaic them into one raster.
//!
//! The tiles covering the box (plus a one tile buffer) are fetched by a fixed
//! pool of workers, decoded pixel by pixel into elevations and written to one
//! CSV-style file per tile. Once every tile is accounted for, the files are
//! handed to GDAL to build a GeoTIFF, or to `raster2pgsql` for a PostGIS
//! import. Tiles that fail to download or decode are skipped and reported.
//!
//! # Usage
//!
//! The `terrain-mosaic` binary has a CLI you can access via `-h` / `--help`.
//! The crate is also available as a library.
//!
//! # CLI Example
//!
//! ```bash
//! terrain-mosaic \
//!   --token "$MAPBOX_TOKEN" \
//!   --minlat 40.0 --maxlat 40.1 \
//!   --minlng -74.1 --maxlng -74.0 \
//!   --zoom 10 \
//!   --out-file nyc.tif
//! ```
//!
//! # Library Example
//! ```no_run
//! use terrain_mosaic::{BoundingBox, Config, Pipeline, Provider, Target, Zoom};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut config = Config::new(
//!     BoundingBox::new(40.0, 40.1, -74.1, -74.0),
//!     Provider::mapbox(Some("pk.my-token".to_owned())),
//! );
//! config.zoom = Zoom::Explicit(10);
//! config.target = Target::GeoTiff("nyc.tif".into());
//!
//! Pipeline::http(config)
//!     .expect("invalid configuration")
//!     .run()
//!     .await
//!     .expect("failed building mosaic");
//! # }
//! ```

mod assembly;
mod barrier;
mod bounding_box;
mod config;
mod decode;
mod error;
mod fetch;
mod output;
mod pipeline;
mod pool;
mod projection;
mod tile;
mod url;

pub mod geo;

pub use assembly::{geotiff_path, Assembler, Database, ExternalAssembler, Target, Toolchain};
pub use barrier::{CompletionBarrier, JobGuard};
pub use bounding_box::{BoundingBox, Viewport};
pub use config::{default_workers, Config, Provider, Zoom, DEFAULT_CANVAS, DEFAULT_MAX_TILES};
pub use decode::{Encoding, Pixel, PixelDecoder, PixelGrid};
pub use error::{Error, Result, TileError};
pub use fetch::{HttpTileFetcher, TileFetcher};
pub use output::{tile_path, ElevationSample, OutputFormat, TileWriter, TILE_FILE_EXTENSION};
pub use pipeline::{Pipeline, RunState, RunSummary};
pub use pool::{Dispatch, PoolReport, TileJob, TileWorkerPool};
pub use projection::{AffineTileProjection, TileProjection};
pub use tile::{Tile, TileBounds};
pub use url::{UrlFormat, AWS_TERRARIUM, MAPBOX_TERRAIN_RGB};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_index() {
        let tile = Tile::from_degrees(50.7929, 6.0402, 18);
        assert_eq!((tile.x, tile.y), (135470, 87999));
    }

    #[test]
    fn viewport_tiles_match_projection() {
        let viewport = BoundingBox::new(50.7492, 50.811, 6.031, 6.1649).at_zoom(14);
        let nw = Tile::from_degrees(50.811, 6.031, 14);
        let se = Tile::from_degrees(50.7492, 6.1649, 14);

        let tiles: Vec<_> = viewport.tiles().collect();
        assert_eq!(tiles.first(), Some(&Tile::new(nw.x - 1, nw.y - 1, 14)));
        assert_eq!(tiles.last(), Some(&Tile::new(se.x + 1, se.y + 1, 14)));
    }
}
