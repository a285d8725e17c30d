//! Bounded pool of tile workers.
//!
//! The producer pushes [`TileJob`]s into a queue holding at most twice as many
//! jobs as there are workers, so it stalls instead of running ahead of slow
//! fetches. Each worker pulls jobs until the queue is closed and drained,
//! fetches and decodes the tile, and streams its samples to an intermediate
//! file. Every job carries a [`JobGuard`] that releases it on the run's
//! [`CompletionBarrier`] once the worker is done with it.

use indicatif::{ProgressBar, ProgressStyle};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};

use crate::barrier::{CompletionBarrier, JobGuard};
use crate::decode::{PixelDecoder, PixelGrid};
use crate::error::TileError;
use crate::fetch::TileFetcher;
use crate::output::{self, ElevationSample, OutputFormat, TileWriter};
use crate::projection::TileProjection;
use crate::tile::Tile;

/// A tile waiting to be processed.
#[derive(Debug)]
pub struct TileJob {
    pub tile: Tile,
    _guard: JobGuard,
}

/// What the pool did with the tiles it was given.
#[derive(Debug, Default)]
pub struct PoolReport {
    pub requested: usize,
    pub written: Vec<PathBuf>,
    pub failures: Vec<TileError>,
}

impl PoolReport {
    pub fn succeeded(&self) -> usize {
        self.written.len()
    }
}

type Outcome = Result<PathBuf, TileError>;

/// Fetches, decodes and persists tiles with a fixed number of workers.
pub struct TileWorkerPool<F> {
    inner: Arc<Worker<F>>,
    workers: usize,
    show_progress: bool,
}

struct Worker<F> {
    fetcher: Arc<F>,
    decoder: Arc<dyn PixelDecoder>,
    projection: Arc<dyn TileProjection>,
    tile_size: u32,
    format: OutputFormat,
}

impl<F> TileWorkerPool<F>
where
    F: TileFetcher + 'static,
{
    pub fn new(
        fetcher: Arc<F>,
        decoder: Arc<dyn PixelDecoder>,
        projection: Arc<dyn TileProjection>,
        tile_size: u32,
        format: OutputFormat,
        workers: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Worker {
                fetcher,
                decoder,
                projection,
                tile_size,
                format,
            }),
            workers: workers.max(1),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Spawns the workers and returns the handle jobs are submitted through.
    ///
    /// `expected` only sizes the progress bar.
    pub fn start(&self, output_dir: &Path, expected: usize) -> Dispatch {
        let (sender, receiver) = mpsc::channel(self.workers * 2);
        let receiver = Arc::new(Mutex::new(receiver));
        let progress = progress_bar(expected, self.show_progress);

        log::debug!("spawning {} workers", self.workers);
        let handles = (0..self.workers)
            .map(|id| {
                tokio::spawn(Arc::clone(&self.inner).run(
                    id,
                    Arc::clone(&receiver),
                    output_dir.to_owned(),
                    progress.clone(),
                ))
            })
            .collect();

        Dispatch {
            queue: sender,
            barrier: Arc::new(CompletionBarrier::new()),
            handles,
            progress,
            submitted: 0,
        }
    }

    /// Processes all `tiles` into `output_dir` and waits for every one of them.
    pub async fn process(&self, tiles: Vec<Tile>, output_dir: &Path) -> PoolReport {
        let mut dispatch = self.start(output_dir, tiles.len());
        for tile in tiles {
            dispatch.submit(tile).await;
        }
        dispatch.finish().await
    }
}

/// Producer side of a running pool.
pub struct Dispatch {
    queue: mpsc::Sender<TileJob>,
    barrier: Arc<CompletionBarrier>,
    handles: Vec<JoinHandle<Vec<Outcome>>>,
    progress: ProgressBar,
    submitted: usize,
}

impl Dispatch {
    /// Queues a tile, waiting while the queue is full.
    pub async fn submit(&mut self, tile: Tile) {
        self.submitted += 1;
        let job = TileJob {
            tile,
            _guard: self.barrier.enter(),
        };

        // only fails once every worker is gone; dropping the job releases it
        if let Err(mpsc::error::SendError(job)) = self.queue.send(job).await {
            log::error!("no worker left to process tile {}", job.tile);
        }
    }

    pub fn barrier(&self) -> &Arc<CompletionBarrier> {
        &self.barrier
    }

    /// Closes the queue, waits on the barrier until every submitted job is
    /// released and collects the workers' outcomes.
    pub async fn finish(self) -> PoolReport {
        let Dispatch {
            queue,
            barrier,
            handles,
            progress,
            submitted,
        } = self;

        drop(queue);
        barrier.wait().await;
        progress.finish_and_clear();

        let mut report = PoolReport {
            requested: submitted,
            ..PoolReport::default()
        };

        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        match outcome {
                            Ok(path) => report.written.push(path),
                            Err(e) => report.failures.push(e),
                        }
                    }
                }
                Err(e) => log::error!("tile worker aborted: {}", e),
            }
        }

        report
    }
}

impl<F: TileFetcher> Worker<F> {
    async fn run(
        self: Arc<Self>,
        id: usize,
        queue: Arc<Mutex<mpsc::Receiver<TileJob>>>,
        output_dir: PathBuf,
        progress: ProgressBar,
    ) -> Vec<Outcome> {
        let mut outcomes = Vec::new();

        loop {
            // the lock is only held while waiting for the next job
            let job = match queue.lock().await.recv().await {
                Some(job) => job,
                None => break,
            };

            log::debug!("worker {} processing tile {}", id, job.tile);
            let outcome = self.process(job.tile, &output_dir).await;

            match &outcome {
                Ok(path) => log::debug!("wrote tile {} to {}", job.tile, path.display()),
                Err(e) if e.is_local() => log::error!("{}", e),
                Err(e) => log::warn!("skipping tile: {}", e),
            }
            if outcome.is_err() {
                output::remove_stale(&output_dir, &job.tile).await;
            }

            progress.inc(1);
            outcomes.push(outcome);
            drop(job);
        }

        outcomes
    }

    async fn process(&self, tile: Tile, output_dir: &Path) -> Outcome {
        let grid = self.fetcher.fetch(tile).await?;

        let (width, height) = grid.dimensions();
        if width != self.tile_size || height != self.tile_size {
            return Err(TileError::Decode {
                tile,
                reason: format!(
                    "expected {0}x{0} pixels, got {1}x{2}",
                    self.tile_size, width, height
                ),
            });
        }

        let io_err = |path: &Path| {
            let path = path.to_owned();
            move |source| TileError::Io { tile, path, source }
        };

        let mut writer = TileWriter::create(output_dir, &tile, self.format)
            .await
            .map_err(io_err(output_dir))?;
        let target = writer.target().to_owned();

        if let Err(e) = self.write_samples(&tile, &grid, &mut writer).await {
            writer.discard().await;
            return Err(io_err(&target)(e));
        }

        writer.finish().await.map_err(io_err(&target))
    }

    /// Streams the samples row by row, north to south.
    async fn write_samples(
        &self,
        tile: &Tile,
        grid: &PixelGrid,
        writer: &mut TileWriter,
    ) -> std::io::Result<()> {
        let (width, height) = grid.dimensions();

        for py in 0..height {
            for px in 0..width {
                let pixel = match grid.get(px, py) {
                    Some(pixel) => pixel,
                    None => continue,
                };
                let (longitude, latitude) = self.projection.pixel_to_location(px, py, tile);
                let sample = ElevationSample {
                    longitude,
                    latitude,
                    elevation: self.decoder.decode_elevation(pixel),
                };

                writer.write_sample(px, py, &sample).await?;
            }
        }

        Ok(())
    }
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:60.cyan/blue} {pos:>7}/{len:7} ETA: {eta} {msg}")
            .progress_chars("##-"),
    );
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Encoding;
    use crate::projection::AffineTileProjection;
    use std::{collections::HashSet, future::Future};
    use tempdir::TempDir;

    /// Serves flat tiles whose pixel value encodes the row, failing on request.
    struct RowFetcher {
        size: u32,
        failing: HashSet<Tile>,
    }

    impl TileFetcher for RowFetcher {
        fn fetch(&self, tile: Tile) -> impl Future<Output = Result<PixelGrid, TileError>> + Send {
            let result = if self.failing.contains(&tile) {
                Err(TileError::Fetch {
                    tile,
                    reason: "provider unavailable".to_owned(),
                })
            } else {
                let mut pixels = Vec::new();
                for py in 0..self.size {
                    for _ in 0..self.size {
                        pixels.push([128, py as u8, 0]);
                    }
                }
                Ok(PixelGrid::new(self.size, self.size, pixels).unwrap())
            };
            async move { result }
        }
    }

    fn pool(fetcher: RowFetcher, tile_size: u32, workers: usize) -> TileWorkerPool<RowFetcher> {
        TileWorkerPool::new(
            Arc::new(fetcher),
            Arc::new(Encoding::Terrarium),
            Arc::new(AffineTileProjection::new(tile_size)),
            tile_size,
            OutputFormat::PixelRecords,
            workers,
        )
    }

    fn tiles() -> Vec<Tile> {
        (300..303)
            .flat_map(|x| (386..389).map(move |y| Tile::new(x, y, 10)))
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 3)]
    async fn failed_tiles_are_skipped() {
        let dir = TempDir::new("terrain-pool").unwrap();
        let failing: HashSet<_> = vec![Tile::new(300, 386, 10), Tile::new(302, 388, 10)]
            .into_iter()
            .collect();

        let report = pool(RowFetcher { size: 4, failing: failing.clone() }, 4, 3)
            .process(tiles(), dir.path())
            .await;

        assert_eq!(report.requested, 9);
        assert_eq!(report.succeeded(), 7);
        assert_eq!(report.failures.len(), 2);
        let failed: HashSet<_> = report.failures.iter().map(TileError::tile).collect();
        assert_eq!(failed, failing);

        let files = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 7);
        assert!(!dir.path().join("300_386_10.csv").exists());
    }

    #[tokio::test]
    async fn every_tile_failing_still_completes() {
        let dir = TempDir::new("terrain-pool").unwrap();
        let failing = tiles().into_iter().collect();

        let report = pool(RowFetcher { size: 4, failing }, 4, 2)
            .process(tiles(), dir.path())
            .await;

        assert_eq!(report.requested, 9);
        assert_eq!(report.failures.len(), 9);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn rows_are_written_in_order() {
        let dir = TempDir::new("terrain-pool").unwrap();
        let tile = Tile::new(301, 387, 10);

        let report = pool(RowFetcher { size: 8, failing: HashSet::new() }, 8, 1)
            .process(vec![tile], dir.path())
            .await;
        assert_eq!(report.succeeded(), 1);

        let content = std::fs::read_to_string(dir.path().join("301_387_10.csv")).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("x,y,elevation"));

        let rows: Vec<(u32, u32, f64)> = lines
            .map(|line| {
                let mut cols = line.split(',');
                (
                    cols.next().unwrap().parse().unwrap(),
                    cols.next().unwrap().parse().unwrap(),
                    cols.next().unwrap().parse().unwrap(),
                )
            })
            .collect();

        assert_eq!(rows.len(), 64);
        assert!(rows.windows(2).all(|w| (w[0].1, w[0].0) < (w[1].1, w[1].0)));
        assert!(rows.iter().all(|&(_, py, elevation)| elevation == f64::from(py)));
    }

    #[tokio::test]
    async fn wrong_tile_size_is_a_decode_error() {
        let dir = TempDir::new("terrain-pool").unwrap();

        let report = pool(RowFetcher { size: 4, failing: HashSet::new() }, 256, 2)
            .process(vec![Tile::new(1, 1, 2)], dir.path())
            .await;

        assert!(matches!(report.failures[..], [TileError::Decode { .. }]));
    }

    #[tokio::test]
    async fn unwritable_directory_is_an_io_error() {
        let dir = TempDir::new("terrain-pool").unwrap();
        let missing = dir.path().join("missing");

        let report = pool(RowFetcher { size: 4, failing: HashSet::new() }, 4, 2)
            .process(vec![Tile::new(1, 1, 2)], &missing)
            .await;

        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].is_local());
    }
}
