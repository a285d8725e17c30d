//! Raw tile pixels and the encodings that turn them into elevations.

use std::{fmt, str::FromStr};

/// Offset of the Terrarium encoding, in meters.
const TERRARIUM_OFFSET: f64 = 32768_f64;

/// An RGB pixel as delivered by the tile provider.
pub type Pixel = [u8; 3];

/// A decoded tile image, stored row by row.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    pixels: Vec<Pixel>,
}

impl PixelGrid {
    /// Builds a grid from row-major pixels. Returns `None` if the pixel count
    /// does not match the dimensions.
    pub fn new(width: u32, height: u32, pixels: Vec<Pixel>) -> Option<Self> {
        if pixels.len() != width as usize * height as usize {
            return None;
        }

        Some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Decodes an encoded image (PNG for the bundled providers).
    pub fn from_image_bytes(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let rgb = image::load_from_memory(bytes)?.to_rgb8();
        let (width, height) = rgb.dimensions();
        let pixels = rgb.pixels().map(|p| p.0).collect();

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn get(&self, px: u32, py: u32) -> Option<Pixel> {
        if px >= self.width || py >= self.height {
            return None;
        }
        self.pixels
            .get(py as usize * self.width as usize + px as usize)
            .copied()
    }
}

/// Converts one provider pixel into an elevation in meters.
pub trait PixelDecoder: Send + Sync {
    fn decode_elevation(&self, pixel: Pixel) -> f64;
}

/// Pixel encodings used by the supported elevation providers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Encoding {
    /// Mapbox Terrain-RGB: `-10000 + (R * 256 * 256 + G * 256 + B) * 0.1`.
    TerrainRgb,

    /// Mapzen/AWS Terrarium: `R * 256 + G + B / 256 - 32768`.
    Terrarium,
}

impl PixelDecoder for Encoding {
    fn decode_elevation(&self, [r, g, b]: Pixel) -> f64 {
        let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));

        match self {
            Encoding::TerrainRgb => -10000_f64 + (r * 65536_f64 + g * 256_f64 + b) * 0.1,
            Encoding::Terrarium => r * 256_f64 + g + b / 256_f64 - TERRARIUM_OFFSET,
        }
    }
}

impl FromStr for Encoding {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "terrain-rgb" | "terrainrgb" | "mapbox" => Ok(Encoding::TerrainRgb),
            "terrarium" | "aws" => Ok(Encoding::Terrarium),
            _ => Err("unrecognized encoding"),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Encoding::TerrainRgb => "terrain-rgb",
            Encoding::Terrarium => "terrarium",
        })
    }
}
