use std::{path::PathBuf, time::Duration};

use crate::assembly::Target;
use crate::bounding_box::{BoundingBox, Viewport};
use crate::decode::Encoding;
use crate::error::{Error, Result};
use crate::geo;
use crate::output::OutputFormat;
use crate::url::{UrlFormat, MAPBOX_TERRAIN_RGB};

/// Default cap on the number of tiles one run may fetch.
pub const DEFAULT_MAX_TILES: usize = 100;

/// Canvas the zoom is fitted to when none is given.
pub const DEFAULT_CANVAS: (u32, u32) = (1920, 1080);

/// How the zoom level of a run is chosen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Zoom {
    Explicit(u8),

    /// The largest zoom at which the bounding box fits the canvas.
    FitCanvas { width: u32, height: u32 },
}

impl Default for Zoom {
    fn default() -> Self {
        Zoom::FitCanvas {
            width: DEFAULT_CANVAS.0,
            height: DEFAULT_CANVAS.1,
        }
    }
}

/// An elevation tile source.
#[derive(Clone, Debug, PartialEq)]
pub struct Provider {
    pub url: UrlFormat,
    pub encoding: Encoding,
    pub tile_size: u32,
    pub min_zoom: u8,
    pub max_zoom: u8,
}

impl Provider {
    /// Mapbox Terrain-RGB; tiles exist up to zoom 15.
    /// ref: https://docs.mapbox.com/help/troubleshooting/access-elevation-data/
    pub fn mapbox(token: Option<String>) -> Self {
        Self {
            url: UrlFormat::new(MAPBOX_TERRAIN_RGB, token),
            encoding: Encoding::TerrainRgb,
            tile_size: 256,
            min_zoom: 1,
            max_zoom: 15,
        }
    }
}

/// Mosaic run configuration.
#[derive(Debug, PartialEq)]
pub struct Config {
    /// Area to cover, in degrees.
    pub bounding_box: BoundingBox,

    pub zoom: Zoom,

    pub provider: Provider,

    /// Number of tiles fetched and converted in parallel.
    pub workers: usize,

    /// Runs needing more tiles than this are refused before fetching.
    pub max_tiles: usize,

    pub output_format: OutputFormat,

    /// Directory for the per-tile files. Kept after the run if given,
    /// otherwise a temporary directory is used and removed afterwards.
    pub working_dir: Option<PathBuf>,

    pub target: Target,

    /// Timeout for fetching a single tile.
    ///
    /// Pass the zero duration to disable the timeout.
    pub timeout: Duration,

    /// How many times to retry a failed HTTP request.
    pub request_retries_amount: u8,

    pub show_progress: bool,
}

impl Config {
    /// A configuration with defaults for everything but the area and source.
    pub fn new(bounding_box: BoundingBox, provider: Provider) -> Self {
        Self {
            bounding_box,
            zoom: Zoom::default(),
            provider,
            workers: default_workers(),
            max_tiles: DEFAULT_MAX_TILES,
            output_format: OutputFormat::default(),
            working_dir: None,
            target: Target::None,
            timeout: Duration::from_secs(10),
            request_retries_amount: 3,
            show_progress: false,
        }
    }

    /// Checks everything that can be checked before any work is dispatched.
    pub fn validate(&self) -> Result<()> {
        self.validate_extent()?;

        if self.provider.url.missing_token() {
            return Err(Error::Configuration(
                "the tile URL requires an access token".to_owned(),
            ));
        }
        if self.workers == 0 {
            return Err(Error::Configuration("need at least one worker".to_owned()));
        }

        Ok(())
    }

    /// Checks only what [`Config::viewport`] depends on, so the tiles of a run
    /// can be planned without credentials.
    pub fn validate_extent(&self) -> Result<()> {
        self.bounding_box.validate().map_err(Error::Configuration)?;

        if self.provider.tile_size == 0 {
            return Err(Error::Configuration("tile size must be > 0".to_owned()));
        }
        if self.provider.min_zoom == 0 || self.provider.min_zoom > self.provider.max_zoom {
            return Err(Error::Configuration(format!(
                "invalid provider zoom range {}..={}",
                self.provider.min_zoom, self.provider.max_zoom
            )));
        }
        if let Zoom::Explicit(zoom) = self.zoom {
            if zoom < self.provider.min_zoom {
                return Err(Error::Configuration(format!(
                    "must supply a map zoom ({} to {})",
                    self.provider.min_zoom, self.provider.max_zoom
                )));
            }
        }

        Ok(())
    }

    /// The zoom the run is fetched at, within the provider's range.
    pub fn resolve_zoom(&self) -> u8 {
        let (min, max) = (self.provider.min_zoom, self.provider.max_zoom);

        let requested = match self.zoom {
            Zoom::Explicit(zoom) => i32::from(zoom),
            Zoom::FitCanvas { width, height } => geo::zoom_for_viewport_pixels(
                &self.bounding_box,
                width,
                height,
                self.provider.tile_size,
            ),
        };

        if requested > i32::from(max) {
            log::warn!(
                "zoom {} exceeds the provider's maximum, using {}",
                requested,
                max
            );
            max
        } else if requested < i32::from(min) {
            log::warn!("zoom {} is below the provider's minimum, using {}", requested, min);
            min
        } else {
            requested as u8
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.bounding_box.at_zoom(self.resolve_zoom())
    }
}

/// Number of available execution units, or 1 if that cannot be determined.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(usize::from)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::new(
            BoundingBox::new(40.0, 40.1, -74.1, -74.0),
            Provider::mapbox(Some("pk.test".to_owned())),
        )
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = config();
        assert!(cfg.validate().is_ok());
        assert!(cfg.workers >= 1);
        assert_eq!(cfg.max_tiles, 100);
    }

    #[test]
    fn missing_token() {
        let mut cfg = config();
        cfg.provider = Provider::mapbox(None);
        assert!(matches!(cfg.validate(), Err(Error::Configuration(_))));

        // planning a run does not need credentials
        assert!(cfg.validate_extent().is_ok());
        assert_eq!(cfg.viewport().tile_count(), config().viewport().tile_count());
    }

    #[test]
    fn zero_workers() {
        let mut cfg = config();
        cfg.workers = 0;
        assert!(matches!(cfg.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn zoom_below_range() {
        let mut cfg = config();
        cfg.zoom = Zoom::Explicit(0);
        assert!(matches!(cfg.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn inverted_bounds() {
        let mut cfg = config();
        cfg.bounding_box = BoundingBox::new(40.1, 40.0, -74.1, -74.0);
        assert!(matches!(cfg.validate(), Err(Error::Configuration(_))));
        assert!(matches!(cfg.validate_extent(), Err(Error::Configuration(_))));
    }

    #[test]
    fn zoom_resolution() {
        let mut cfg = config();
        assert_eq!(cfg.resolve_zoom(), 13);

        cfg.zoom = Zoom::Explicit(18);
        assert_eq!(cfg.resolve_zoom(), 15);

        cfg.zoom = Zoom::Explicit(10);
        assert_eq!(cfg.viewport().zoom, 10);

        cfg.bounding_box = BoundingBox::new(40.0, 40.0, -74.0, -74.0);
        cfg.zoom = Zoom::default();
        assert_eq!(cfg.resolve_zoom(), 15);
    }
}
