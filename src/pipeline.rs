use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use tempdir::TempDir;
use tokio::fs;

use crate::assembly::{Assembler, ExternalAssembler};
use crate::bounding_box::Viewport;
use crate::config::Config;
use crate::decode::PixelDecoder;
use crate::error::{Error, Result, TileError};
use crate::fetch::{HttpTileFetcher, TileFetcher};
use crate::pool::TileWorkerPool;
use crate::projection::{AffineTileProjection, TileProjection};
use crate::tile::Tile;

const TEMP_DIR_PREFIX: &str = "terrain-rgb";

/// Stages of a run, in order. A crashed run starts over from `Enumerating`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunState {
    Enumerating,
    Dispatching,
    AwaitingCompletion,
    Assembling,
    Done,
}

/// Outcome of a completed run.
#[derive(Debug)]
pub struct RunSummary {
    pub viewport: Viewport,
    pub requested: usize,
    pub succeeded: usize,
    pub failures: Vec<TileError>,

    /// Where the intermediate files were kept, if they outlive the run.
    pub working_dir: Option<PathBuf>,
}

/// Fetches the tiles covering a bounding box and assembles them.
///
/// # Example
/// ```no_run
/// use terrain_mosaic::{BoundingBox, Config, Pipeline, Provider, Target, Zoom};
///
/// # #[tokio::main]
/// # async fn main() {
/// let mut config = Config::new(
///     BoundingBox::new(40.0, 40.1, -74.1, -74.0),
///     Provider::mapbox(Some("pk.my-token".to_owned())),
/// );
/// config.zoom = Zoom::Explicit(10);
/// config.target = Target::GeoTiff("nyc.tif".into());
///
/// let summary = Pipeline::http(config)
///     .expect("invalid configuration")
///     .run()
///     .await
///     .expect("run failed");
/// println!("{} of {} tiles", summary.succeeded, summary.requested);
/// # }
/// ```
pub struct Pipeline<F, A> {
    config: Config,
    fetcher: Arc<F>,
    assembler: A,
    decoder: Arc<dyn PixelDecoder>,
    projection: Arc<dyn TileProjection>,
    state: RunState,
}

impl Pipeline<HttpTileFetcher, ExternalAssembler> {
    /// A pipeline fetching over HTTP and assembling with the external tools.
    pub fn http(config: Config) -> Result<Self> {
        let fetcher = HttpTileFetcher::new(
            config.provider.url.clone(),
            config.timeout,
            config.request_retries_amount,
        )?;
        let assembler = ExternalAssembler::new(config.target.clone(), config.provider.tile_size);

        Self::new(config, fetcher, assembler)
    }
}

impl<F, A> Pipeline<F, A>
where
    F: TileFetcher + 'static,
    A: Assembler,
{
    /// Validates `config` and wires up the pipeline. The provider's encoding
    /// and an affine pixel projection are used unless replaced.
    pub fn new(config: Config, fetcher: F, assembler: A) -> Result<Self> {
        config.validate()?;

        let decoder = Arc::new(config.provider.encoding);
        let projection = Arc::new(AffineTileProjection::new(config.provider.tile_size));

        Ok(Self {
            config,
            fetcher: Arc::new(fetcher),
            assembler,
            decoder,
            projection,
            state: RunState::Enumerating,
        })
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn PixelDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_projection(mut self, projection: Arc<dyn TileProjection>) -> Self {
        self.projection = projection;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Enumerates the tiles of the run and enforces the tile limit.
    pub fn plan(&self) -> Result<(Viewport, Vec<Tile>)> {
        let viewport = self.config.viewport();

        let count = viewport.tile_count();
        if count > self.config.max_tiles {
            return Err(Error::TooManyTiles {
                count,
                max: self.config.max_tiles,
            });
        }

        Ok((viewport, viewport.tiles().collect()))
    }

    /// Runs every stage. Per-tile failures are reported in the summary; only
    /// planning, the working directory and assembly can fail the run.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let start_time = Instant::now();
        self.transition(RunState::Enumerating);

        let (viewport, tiles) = self.plan()?;
        let b = &viewport.bbox;
        log::info!(
            "extent [{}, {}, {}, {}] zoom {} tiles {}",
            b.min_lat,
            b.max_lat,
            b.min_lng,
            b.max_lng,
            viewport.zoom,
            tiles.len()
        );

        let work_dir = WorkDir::prepare(self.config.working_dir.as_deref()).await?;
        let mut summary = RunSummary {
            viewport,
            requested: tiles.len(),
            succeeded: 0,
            failures: Vec::new(),
            working_dir: work_dir.kept(),
        };

        if tiles.is_empty() {
            self.transition(RunState::Done);
            work_dir.close();
            return Ok(summary);
        }

        self.transition(RunState::Dispatching);
        let pool = TileWorkerPool::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.decoder),
            Arc::clone(&self.projection),
            self.config.provider.tile_size,
            self.config.output_format,
            self.config.workers,
        )
        .with_progress(self.config.show_progress);

        let mut dispatch = pool.start(work_dir.path(), tiles.len());
        for tile in tiles {
            dispatch.submit(tile).await;
        }

        self.transition(RunState::AwaitingCompletion);
        log::debug!("waiting on {} tiles", dispatch.barrier().pending());
        let report = dispatch.finish().await;

        log::info!(
            "processed {}/{} tiles in {:?}",
            report.succeeded(),
            report.requested,
            start_time.elapsed()
        );
        summary.succeeded = report.succeeded();
        summary.failures = report.failures;

        self.transition(RunState::Assembling);
        self.assembler
            .assemble(work_dir.path(), &report.written)
            .await?;

        self.transition(RunState::Done);
        log::info!("run complete in {:?}", start_time.elapsed());
        work_dir.close();

        Ok(summary)
    }

    fn transition(&mut self, next: RunState) {
        log::debug!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Directory holding the intermediate files of a run.
enum WorkDir {
    Kept(PathBuf),
    Temporary(TempDir),
}

impl WorkDir {
    async fn prepare(dir: Option<&Path>) -> Result<Self> {
        match dir {
            Some(dir) => {
                fs::create_dir_all(dir).await.map_err(|source| Error::Io {
                    path: dir.to_owned(),
                    source,
                })?;
                Ok(WorkDir::Kept(dir.to_owned()))
            }
            None => TempDir::new(TEMP_DIR_PREFIX)
                .map(WorkDir::Temporary)
                .map_err(|source| Error::Io {
                    path: std::env::temp_dir(),
                    source,
                }),
        }
    }

    fn path(&self) -> &Path {
        match self {
            WorkDir::Kept(dir) => dir.as_path(),
            WorkDir::Temporary(dir) => dir.path(),
        }
    }

    fn kept(&self) -> Option<PathBuf> {
        match self {
            WorkDir::Kept(dir) => Some(dir.clone()),
            WorkDir::Temporary(_) => None,
        }
    }

    fn close(self) {
        if let WorkDir::Temporary(dir) = self {
            let path = dir.path().to_owned();
            if let Err(e) = dir.close() {
                log::warn!("failed removing {}: {}", path.display(), e);
            }
        }
    }
}
