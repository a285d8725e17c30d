//! Web-mercator tile math.
//!
//! ref: https://wiki.openstreetmap.org/wiki/Slippy_map_tilenames

use std::f64::consts::PI;

use crate::bounding_box::BoundingBox;

/// Latitude limit of the web-mercator projection, `atan(sinh(π))` in degrees.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_6;

/// Deepest zoom level tile indices are computed for. Deeper zooms are
/// clamped to it.
pub const MAX_ZOOM: u8 = 30;

/// Number of tiles along one axis of the pyramid at `zoom`.
pub fn tiles_per_axis(zoom: u8) -> f64 {
    2_f64.powi(i32::from(zoom))
}

/// Projects a coordinate given in degrees to the `(x, y)` index of the tile
/// containing it.
///
/// The result is signed: latitudes beyond [`MAX_LATITUDE`] project outside
/// the pyramid. Results at exactly ±90° are meaningless.
pub fn degrees_to_tile(lat_deg: f64, lon_deg: f64, zoom: u8) -> (i64, i64) {
    let lat_rad = lat_deg.to_radians();
    let n = tiles_per_axis(zoom);

    let x = (lon_deg + 180_f64) / 360_f64 * n;
    let y = (1_f64 - (lat_rad.tan() + 1_f64 / lat_rad.cos()).ln() / PI) / 2_f64 * n;

    (x.floor() as i64, y.floor() as i64)
}

/// Longitude in degrees of the western edge of tile column `x`.
///
/// `x` may be fractional to address positions inside a tile.
pub fn tile_to_longitude(x: f64, zoom: u8) -> f64 {
    x / tiles_per_axis(zoom) * 360_f64 - 180_f64
}

/// Latitude in degrees of the northern edge of tile row `y`.
///
/// `y` may be fractional to address positions inside a tile.
pub fn tile_to_latitude(y: f64, zoom: u8) -> f64 {
    let n = PI - 2_f64 * PI * y / tiles_per_axis(zoom);
    n.sinh().atan().to_degrees()
}

/// Picks the largest zoom at which `bbox` still fits a canvas of
/// `width_px` × `height_px` built from tiles of `tile_size_px`.
///
/// Latitude and longitude spans are fitted independently and the smaller zoom
/// wins. The value is not clamped into any provider's zoom range and may be
/// negative or very large for degenerate boxes.
pub fn zoom_for_viewport_pixels(
    bbox: &BoundingBox,
    width_px: u32,
    height_px: u32,
    tile_size_px: u32,
) -> i32 {
    let lat_fraction =
        (mercator_lat_rad(bbox.max_lat) - mercator_lat_rad(bbox.min_lat)) / PI;

    let lng_diff = bbox.max_lng - bbox.min_lng;
    let lng_fraction = if lng_diff < 0_f64 {
        lng_diff + 360_f64
    } else {
        lng_diff
    } / 360_f64;

    let lat_zoom = fit_zoom(height_px, tile_size_px, lat_fraction);
    let lng_zoom = fit_zoom(width_px, tile_size_px, lng_fraction);

    saturate(lat_zoom.min(lng_zoom))
}

fn mercator_lat_rad(lat_deg: f64) -> f64 {
    let sin = lat_deg.to_radians().sin();
    let rad_x2 = ((1_f64 + sin) / (1_f64 - sin)).ln() / 2_f64;
    rad_x2.clamp(-PI, PI) / 2_f64
}

fn fit_zoom(canvas_px: u32, tile_px: u32, fraction: f64) -> f64 {
    (f64::from(canvas_px) / f64::from(tile_px) / fraction).log2().floor()
}

// an empty span fits at any zoom and yields +inf
fn saturate(zoom: f64) -> i32 {
    if zoom.is_nan() {
        0
    } else {
        zoom.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn tile_index() {
        assert_eq!(degrees_to_tile(50.7929, 6.0402, 18), (135470, 87999));
        assert_eq!(degrees_to_tile(40.0, -74.1, 10), (301, 387));
        assert_eq!(degrees_to_tile(0.0, 0.0, 1), (1, 1));
    }

    #[test]
    fn beyond_mercator_limit_projects_outside() {
        let (_, y) = degrees_to_tile(89.0, 0.0, 4);
        assert!(y < 0);
    }

    #[test]
    fn tile_edges() {
        assert_relative_eq!(tile_to_longitude(0.0, 3), -180.0);
        assert_relative_eq!(tile_to_longitude(4.0, 3), 0.0);
        assert_relative_eq!(tile_to_longitude(8.0, 3), 180.0);

        assert_relative_eq!(tile_to_latitude(0.0, 1), MAX_LATITUDE, epsilon = 1e-9);
        assert_relative_eq!(tile_to_latitude(1.0, 1), 0.0, epsilon = 1e-9);
        assert_relative_eq!(tile_to_latitude(2.0, 1), -MAX_LATITUDE, epsilon = 1e-9);
    }

    #[test]
    fn tile_edges_invert_projection() {
        let zoom = 10;
        let lat = tile_to_latitude(385.5, zoom);
        let lng = tile_to_longitude(301.5, zoom);
        assert_eq!(degrees_to_tile(lat, lng, zoom), (301, 385));
    }

    #[test]
    fn zoom_fits_canvas() {
        let nyc = BoundingBox::new(40.0, 40.1, -74.1, -74.0);
        assert_eq!(zoom_for_viewport_pixels(&nyc, 1920, 1080, 256), 13);

        let world = BoundingBox::new(-85.0, 85.0, -175.0, 175.0);
        assert_eq!(zoom_for_viewport_pixels(&world, 1920, 1080, 256), 2);

        let square = BoundingBox::new(40.0, 41.0, -74.0, -73.0);
        assert_eq!(zoom_for_viewport_pixels(&square, 1920, 1080, 256), 10);
    }

    #[test]
    fn zoom_for_degenerate_box_saturates() {
        let point = BoundingBox::new(40.0, 40.0, -74.0, -74.0);
        assert_eq!(zoom_for_viewport_pixels(&point, 1920, 1080, 256), i32::MAX);
    }
}
