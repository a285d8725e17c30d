use anyhow::{Context, Result};
use clap::crate_version;
use reqwest::StatusCode;
use std::{future::Future, time::Duration};

use crate::decode::PixelGrid;
use crate::error::{Error, TileError};
use crate::tile::Tile;
use crate::url::UrlFormat;

pub(crate) const BACKOFF_DELAY: Duration = Duration::from_secs(10);
const ZERO_DURATION: Duration = Duration::from_secs(0);

/// Source of raw elevation tiles.
///
/// Implementations deliver the tile's pixels; turning pixels into elevations
/// is left to a [`PixelDecoder`](crate::PixelDecoder).
pub trait TileFetcher: Send + Sync {
    fn fetch(&self, tile: Tile) -> impl Future<Output = Result<PixelGrid, TileError>> + Send;
}

/// Fetches PNG tiles over HTTP from a URL template.
#[derive(Debug)]
pub struct HttpTileFetcher {
    client: reqwest::Client,
    url: UrlFormat,
    retries: u8,
    backoff: Duration,
}

impl HttpTileFetcher {
    /// Creates a fetcher. A zero `timeout` disables the per-request timeout.
    pub fn new(url: UrlFormat, timeout: Duration, retries: u8) -> crate::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(format!("terrain-mosaic_rs_{}", crate_version!()));
        if timeout > ZERO_DURATION {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Configuration(format!("failed creating HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url,
            retries,
            backoff: BACKOFF_DELAY,
        })
    }

    /// Replaces the delay between retries of a failed request.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn fetch_bytes(&self, tile: &Tile) -> Result<Vec<u8>> {
        let formatted_url = self.url.tile_url(tile)?;
        let mut attempt: u16 = 0;

        loop {
            attempt += 1;
            let may_retry = attempt <= u16::from(self.retries);

            let raw_response = match self.client.get(&formatted_url).send().await {
                Ok(response) => response,
                Err(e) if may_retry => {
                    log::debug!("retrying tile {} after error: {}", tile, e);
                    tokio::time::sleep(self.backoff).await;
                    continue;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("failed fetching tile {}", tile))
                }
            };

            if raw_response.status() == StatusCode::TOO_MANY_REQUESTS && may_retry {
                let retry_after = raw_response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|val| val.parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(self.backoff);

                log::debug!("rate limited on tile {}, waiting {:?}", tile, retry_after);
                tokio::time::sleep(retry_after).await;
                continue;
            }

            let bytes = raw_response
                .error_for_status()
                .with_context(|| format!("received invalid status code fetching tile {}", tile))?
                .bytes()
                .await
                .with_context(|| format!("failed reading body of tile {}", tile))?;

            return Ok(bytes.to_vec());
        }
    }
}

impl TileFetcher for HttpTileFetcher {
    async fn fetch(&self, tile: Tile) -> Result<PixelGrid, TileError> {
        let bytes = self.fetch_bytes(&tile).await.map_err(|e| TileError::Fetch {
            tile,
            reason: format!("{:#}", e),
        })?;

        PixelGrid::from_image_bytes(&bytes).map_err(|e| TileError::Decode {
            tile,
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::AWS_TERRARIUM;

    #[test]
    fn builds_without_timeout() {
        let fetcher = HttpTileFetcher::new(UrlFormat::new(AWS_TERRARIUM, None), ZERO_DURATION, 3);
        assert!(fetcher.is_ok());
    }

    #[tokio::test]
    async fn bad_template_is_a_fetch_error() {
        let fetcher =
            HttpTileFetcher::new(UrlFormat::new("http://{nope}", None), Duration::from_secs(1), 0)
                .unwrap();

        let err = fetcher.fetch(Tile::new(1, 1, 1)).await.unwrap_err();
        assert!(matches!(err, TileError::Fetch { .. }));
        assert_eq!(err.tile(), Tile::new(1, 1, 1));
    }

    #[tokio::test]
    async fn maximum_retries_give_up() {
        // nothing listens on port 1, every attempt is refused
        let fetcher = HttpTileFetcher::new(
            UrlFormat::new("http://127.0.0.1:1/{z}/{x}/{y}.png", None),
            Duration::from_secs(1),
            u8::MAX,
        )
        .unwrap()
        .with_backoff(ZERO_DURATION);

        let err = fetcher.fetch(Tile::new(1, 1, 1)).await.unwrap_err();
        assert!(matches!(err, TileError::Fetch { .. }));
    }
}
