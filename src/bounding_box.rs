use std::fmt::Debug;

use crate::geo::{self, MAX_LATITUDE};
use crate::tile::Tile;

/// A geographic bounding box in degrees.
///
/// # Example
/// ```rust
/// # use terrain_mosaic::BoundingBox;
/// let lower_manhattan = BoundingBox::new(40.0, 40.1, -74.1, -74.0);
/// ```
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Creates a bounding box from its southern, northern, western and
    /// eastern boundaries (in degrees).
    ///
    /// The box is not validated here; see [`BoundingBox::validate`].
    pub fn new(min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> Self {
        BoundingBox {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }
    }

    /// Checks that the box lies inside the web-mercator domain and is not
    /// inverted. Degenerate boxes (zero width or height) are accepted.
    pub fn validate(&self) -> Result<(), String> {
        let lats = [self.min_lat, self.max_lat];
        let lngs = [self.min_lng, self.max_lng];

        if lats.iter().chain(lngs.iter()).any(|v| !v.is_finite()) {
            return Err("bounding box coordinates must be finite".to_owned());
        }
        if lats.iter().any(|lat| lat.abs() > MAX_LATITUDE) {
            return Err(format!(
                "latitudes must be within ±{:.4}°",
                MAX_LATITUDE
            ));
        }
        if lngs.iter().any(|lng| lng.abs() > 180_f64) {
            return Err("longitudes must be within ±180°".to_owned());
        }
        if self.min_lat > self.max_lat {
            return Err(format!(
                "min latitude {} is north of max latitude {}",
                self.min_lat, self.max_lat
            ));
        }
        if self.min_lng > self.max_lng {
            return Err(format!(
                "min longitude {} is east of max longitude {}",
                self.min_lng, self.max_lng
            ));
        }

        Ok(())
    }

    /// Pairs the box with a zoom level, clamped to [`geo::MAX_ZOOM`].
    pub fn at_zoom(self, zoom: u8) -> Viewport {
        Viewport {
            bbox: self,
            zoom: zoom.min(geo::MAX_ZOOM),
        }
    }
}

/// A bounding box paired with the zoom level it is rendered at.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Viewport {
    pub bbox: BoundingBox,
    pub zoom: u8,
}

impl Viewport {
    /// Creates an iterator over every tile covering the viewport, buffered by
    /// one tile on each side so partial edge tiles are fully covered.
    ///
    /// Tiles are yielded column by column (`x` outer, `y` inner). Indices are
    /// clamped into the pyramid, so boxes touching the grid edges yield fewer
    /// tiles rather than invalid ones.
    pub fn tiles(&self) -> impl Iterator<Item = Tile> + Debug {
        let zoom = self.zoom;
        let (x_min, x_max, y_min, y_max) = self.tile_range();

        (x_min..=x_max)
            .flat_map(move |x| (y_min..=y_max).map(move |y| Tile::new(x, y, zoom)))
    }

    /// Number of tiles [`Viewport::tiles`] yields, without enumerating them.
    pub fn tile_count(&self) -> usize {
        let (x_min, x_max, y_min, y_max) = self.tile_range();
        (x_max - x_min + 1) as usize * (y_max - y_min + 1) as usize
    }

    /// Inclusive `(x_min, x_max, y_min, y_max)` of the buffered tile rectangle.
    fn tile_range(&self) -> (u32, u32, u32, u32) {
        let b = &self.bbox;

        // north-west and south-east corners; tile rows grow southwards
        let (x_west, y_north) = geo::degrees_to_tile(b.max_lat, b.min_lng, self.zoom);
        let (x_east, y_south) = geo::degrees_to_tile(b.min_lat, b.max_lng, self.zoom);

        let last = (1_i64 << self.zoom) - 1;
        let clamp = |v: i64| v.clamp(0, last) as u32;

        (
            clamp(x_west.min(x_east) - 1),
            clamp(x_west.max(x_east) + 1),
            clamp(y_north.min(y_south) - 1),
            clamp(y_north.max(y_south) + 1),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nyc() -> BoundingBox {
        BoundingBox::new(40.0, 40.1, -74.1, -74.0)
    }

    #[test]
    fn nyc_at_zoom_10() {
        let tiles: Vec<_> = nyc().at_zoom(10).tiles().collect();

        let mut expected = Vec::new();
        for x in 300..=302 {
            for y in 386..=388 {
                expected.push(Tile::new(x, y, 10));
            }
        }

        assert_eq!(tiles, expected);
        assert_eq!(nyc().at_zoom(10).tile_count(), 9);
    }

    #[test]
    fn enumeration_is_deterministic() {
        let viewport = BoundingBox::new(40.0, 43.2, -74.1, -71.5).at_zoom(10);
        let first: Vec<_> = viewport.tiles().collect();
        let second: Vec<_> = viewport.tiles().collect();

        assert_eq!(first, second);
        assert_eq!(first.len(), 150);
        assert_eq!(viewport.tile_count(), 150);
    }

    #[test]
    fn zero_size_viewport_yields_tiles() {
        let point = BoundingBox::new(40.05, 40.05, -74.05, -74.05).at_zoom(10);
        assert_eq!(point.tiles().count(), 9);

        let line = BoundingBox::new(40.05, 40.05, -74.1, -74.0).at_zoom(10);
        assert!(line.tiles().count() >= 1);
    }

    #[test]
    fn clamped_at_grid_origin() {
        let corner = BoundingBox::new(84.0, 85.0, -180.0, -179.0).at_zoom(3);
        let tiles: Vec<_> = corner.tiles().collect();

        assert_eq!(tiles.first(), Some(&Tile::new(0, 0, 3)));
        assert_eq!(tiles.len(), 4);
    }

    #[test]
    fn clamped_at_far_edge() {
        let corner = BoundingBox::new(-85.0, -84.0, 179.0, 180.0).at_zoom(2);
        assert!(corner.tiles().all(|t| t.x <= 3 && t.y <= 3));
    }

    #[test]
    fn tile_count_grows_with_zoom() {
        let bbox = BoundingBox::new(40.0, 50.0, 0.0, 10.0);
        let counts: Vec<_> = (1..=12).map(|z| bbox.at_zoom(z).tile_count()).collect();

        assert!(counts.windows(2).all(|w| w[0] <= w[1]), "{:?}", counts);
        assert!(counts[11] > counts[0]);
    }

    #[test]
    fn every_point_is_covered() {
        let bbox = BoundingBox::new(-33.9, -33.4, 150.9, 151.4);

        for zoom in 1..=14 {
            let tiles: Vec<_> = bbox.at_zoom(zoom).tiles().collect();

            for i in 0..=10 {
                for j in 0..=10 {
                    let lat = bbox.min_lat + (bbox.max_lat - bbox.min_lat) * i as f64 / 10.0;
                    let lng = bbox.min_lng + (bbox.max_lng - bbox.min_lng) * j as f64 / 10.0;
                    let (x, y) = geo::degrees_to_tile(lat, lng, zoom);
                    let tile = Tile::new(x as u32, y as u32, zoom);

                    assert!(tiles.contains(&tile), "{:?} not covered at z{}", tile, zoom);
                }
            }
        }
    }

    #[test]
    fn deep_zoom_is_clamped() {
        let viewport = nyc().at_zoom(u8::MAX);
        assert_eq!(viewport.zoom, geo::MAX_ZOOM);
        assert!(viewport.tile_count() >= 9);
    }

    #[test]
    fn validation() {
        assert!(nyc().validate().is_ok());
        assert!(BoundingBox::new(40.0, 40.0, -74.0, -74.0).validate().is_ok());
        assert!(BoundingBox::new(41.0, 40.0, -74.1, -74.0).validate().is_err());
        assert!(BoundingBox::new(40.0, 40.1, -74.0, -74.1).validate().is_err());
        assert!(BoundingBox::new(40.0, 89.0, -74.1, -74.0).validate().is_err());
        assert!(BoundingBox::new(40.0, 40.1, -190.0, -74.0).validate().is_err());
        assert!(BoundingBox::new(f64::NAN, 40.1, -74.1, -74.0).validate().is_err());
    }
}
