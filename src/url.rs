use anyhow::{Context, Result};
use maplit::hashmap;
use std::fmt;
use strfmt::strfmt;

use crate::tile::Tile;

/// Mapbox Terrain-RGB tiles, served losslessly.
pub const MAPBOX_TERRAIN_RGB: &str =
    "https://api.mapbox.com/v4/mapbox.terrain-rgb/{z}/{x}/{y}.pngraw?access_token={token}";

/// AWS open data Terrarium tiles; no token required.
pub const AWS_TERRARIUM: &str =
    "https://s3.amazonaws.com/elevation-tiles-prod/terrarium/{z}/{x}/{y}.png";

/// A tile URL template with the replacement specifiers `{x}`, `{y}`, `{z}`
/// and optionally `{token}`.
#[derive(Clone, PartialEq)]
pub struct UrlFormat {
    format_str: String,
    token: Option<String>,
}

impl UrlFormat {
    pub fn new(format_str: impl Into<String>, token: Option<String>) -> Self {
        Self {
            format_str: format_str.into(),
            token,
        }
    }

    /// Whether the template cannot be filled in without an access token.
    pub fn missing_token(&self) -> bool {
        self.format_str.contains("{token}")
            && self.token.as_deref().map_or(true, str::is_empty)
    }

    pub fn tile_url(&self, tile: &Tile) -> Result<String> {
        let vars = hashmap! {
            "x".to_owned() => tile.x.to_string(),
            "y".to_owned() => tile.y.to_string(),
            "z".to_owned() => tile.z.to_string(),
            "token".to_owned() => self.token.clone().unwrap_or_default(),
        };

        strfmt(&self.format_str, &vars).context("failed formatting URL")
    }
}

// keep access tokens out of logs
impl fmt::Debug for UrlFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlFormat")
            .field("format_str", &self.format_str)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_placeholders() {
        let fmt = UrlFormat::new(MAPBOX_TERRAIN_RGB, Some("pk.abc".to_owned()));
        assert_eq!(
            fmt.tile_url(&Tile::new(301, 387, 10)).unwrap(),
            "https://api.mapbox.com/v4/mapbox.terrain-rgb/10/301/387.pngraw?access_token=pk.abc"
        );
    }

    #[test]
    fn token_requirement() {
        assert!(UrlFormat::new(MAPBOX_TERRAIN_RGB, None).missing_token());
        assert!(UrlFormat::new(MAPBOX_TERRAIN_RGB, Some(String::new())).missing_token());
        assert!(!UrlFormat::new(AWS_TERRARIUM, None).missing_token());
    }

    #[test]
    fn debug_redacts_token() {
        let fmt = UrlFormat::new(MAPBOX_TERRAIN_RGB, Some("secret".to_owned()));
        assert!(!format!("{:?}", fmt).contains("secret"));
    }

    #[test]
    fn rejects_unknown_placeholder() {
        let fmt = UrlFormat::new("https://example.com/{q}/{x}", None);
        assert!(fmt.tile_url(&Tile::new(0, 0, 1)).is_err());
    }
}
