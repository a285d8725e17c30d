//! Error types for a mosaic run.

use std::path::PathBuf;

use thiserror::Error;

use crate::tile::Tile;

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum Error {
    /// The run was configured incorrectly; nothing has been dispatched.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The viewport covers more tiles than the configured maximum.
    #[error("too many map tiles ({count} > {max}), raise the zoom or shrink the bounds")]
    TooManyTiles {
        /// Tiles the viewport would require.
        count: usize,
        /// Configured maximum.
        max: usize,
    },

    /// An external merge or import tool failed.
    #[error("{tool} failed ({status}): {stderr}")]
    Assembly {
        /// Name of the tool that was run.
        tool: String,
        /// Exit status description.
        status: String,
        /// Diagnostic output of the tool.
        stderr: String,
    },

    /// The working directory could not be prepared or read.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors confined to a single tile. The tile is skipped and the run goes on.
#[derive(Debug, Error)]
pub enum TileError {
    /// The provider could not deliver the tile.
    #[error("failed fetching tile {tile}: {reason}")]
    Fetch { tile: Tile, reason: String },

    /// The tile was delivered but its pixels could not be decoded.
    #[error("failed decoding tile {tile}: {reason}")]
    Decode { tile: Tile, reason: String },

    /// The intermediate file for the tile could not be written.
    #[error("failed writing tile {tile} to {}: {source}", .path.display())]
    Io {
        tile: Tile,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TileError {
    pub fn tile(&self) -> Tile {
        match self {
            TileError::Fetch { tile, .. }
            | TileError::Decode { tile, .. }
            | TileError::Io { tile, .. } => *tile,
        }
    }

    /// Whether the failure points at the local environment rather than the
    /// provider. Such failures are likely to hit every tile.
    pub fn is_local(&self) -> bool {
        matches!(self, TileError::Io { .. })
    }
}

/// Result type for run-level operations.
pub type Result<T> = std::result::Result<T, Error>;
