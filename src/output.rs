//! Per-tile intermediate files.
//!
//! Each successfully processed tile becomes one CSV-style text file named
//! after its address. Lines are written in emission order: pixel rows from
//! north to south, pixels west to east within a row. Merge tooling relies on
//! that order, so nothing here buffers or re-sorts samples.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};
use tokio::{
    fs::{self, File},
    io::{self, AsyncWriteExt, BufWriter},
};

use crate::tile::Tile;

/// Extension of finished intermediate files.
pub const TILE_FILE_EXTENSION: &str = "csv";
const PARTIAL_SUFFIX: &str = "part";

/// One decoded elevation, located at the center of its source pixel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ElevationSample {
    pub longitude: f64,
    pub latitude: f64,
    pub elevation: f64,
}

/// Layout of the lines in an intermediate file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputFormat {
    /// `longitude,latitude,elevation` per sample, under an `x,y,z` header.
    RowRecords,

    /// Tile-local `px,py,elevation` per sample, under an `x,y,elevation` header.
    PixelRecords,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::RowRecords
    }
}

impl OutputFormat {
    pub fn header(&self) -> &'static str {
        match self {
            OutputFormat::RowRecords => "x,y,z",
            OutputFormat::PixelRecords => "x,y,elevation",
        }
    }

    pub fn line(&self, px: u32, py: u32, sample: &ElevationSample) -> String {
        match self {
            OutputFormat::RowRecords => format!(
                "{},{},{}\n",
                sample.longitude, sample.latitude, sample.elevation
            ),
            OutputFormat::PixelRecords => format!("{},{},{}\n", px, py, sample.elevation),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "row-records" | "rows" => Ok(OutputFormat::RowRecords),
            "pixel-records" | "pixels" => Ok(OutputFormat::PixelRecords),
            _ => Err("unrecognized output format"),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::RowRecords => "row-records",
            OutputFormat::PixelRecords => "pixel-records",
        })
    }
}

/// Path of the finished intermediate file for `tile` inside `dir`.
pub fn tile_path(dir: &Path, tile: &Tile) -> PathBuf {
    dir.join(tile.file_name(TILE_FILE_EXTENSION))
}

/// Writes one tile's samples. The file only appears under its final name
/// once [`TileWriter::finish`] succeeds.
pub struct TileWriter {
    format: OutputFormat,
    partial: PathBuf,
    target: PathBuf,
    writer: BufWriter<File>,
}

impl TileWriter {
    pub async fn create(dir: &Path, tile: &Tile, format: OutputFormat) -> io::Result<Self> {
        let target = tile_path(dir, tile);
        let partial = target.with_extension(format!("{}.{}", TILE_FILE_EXTENSION, PARTIAL_SUFFIX));

        let mut writer = BufWriter::new(File::create(&partial).await?);
        writer.write_all(format.header().as_bytes()).await?;
        writer.write_all(b"\n").await?;

        Ok(Self {
            format,
            partial,
            target,
            writer,
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub async fn write_sample(&mut self, px: u32, py: u32, sample: &ElevationSample) -> io::Result<()> {
        self.writer
            .write_all(self.format.line(px, py, sample).as_bytes())
            .await
    }

    /// Flushes and closes the file, then moves it to its final name.
    pub async fn finish(self) -> io::Result<PathBuf> {
        let TileWriter {
            partial,
            target,
            mut writer,
            ..
        } = self;

        let closed = async {
            writer.flush().await?;
            let file = writer.into_inner();
            file.sync_all().await?;
            drop(file);
            fs::rename(&partial, &target).await
        }
        .await;

        match closed {
            Ok(()) => Ok(target),
            Err(e) => {
                remove_partial(&partial).await;
                Err(e)
            }
        }
    }

    /// Closes and removes the partially written file.
    pub async fn discard(self) {
        drop(self.writer);
        remove_partial(&self.partial).await;
    }
}

/// Removes a finished file left behind for `tile` by an earlier run.
pub async fn remove_stale(dir: &Path, tile: &Tile) {
    let path = tile_path(dir, tile);
    match fs::remove_file(&path).await {
        Ok(()) => log::debug!("removed stale {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("failed removing stale {}: {}", path.display(), e),
    }
}

async fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        log::debug!("failed removing {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn sample(elevation: f64) -> ElevationSample {
        ElevationSample {
            longitude: -74.05,
            latitude: 40.5,
            elevation,
        }
    }

    #[test]
    fn line_layouts() {
        assert_eq!(OutputFormat::RowRecords.line(3, 4, &sample(12.5)), "-74.05,40.5,12.5\n");
        assert_eq!(OutputFormat::PixelRecords.line(3, 4, &sample(12.5)), "3,4,12.5\n");
        assert_eq!("pixels".parse(), Ok(OutputFormat::PixelRecords));
    }

    #[tokio::test]
    async fn finished_file_appears_under_final_name() {
        let dir = TempDir::new("terrain-output").unwrap();
        let tile = Tile::new(1, 2, 3);

        let mut writer = TileWriter::create(dir.path(), &tile, OutputFormat::RowRecords)
            .await
            .unwrap();
        assert!(!writer.target().exists());

        writer.write_sample(0, 0, &sample(1.0)).await.unwrap();
        writer.write_sample(1, 0, &sample(2.0)).await.unwrap();
        let path = writer.finish().await.unwrap();

        assert_eq!(path, dir.path().join("1_2_3.csv"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "x,y,z\n-74.05,40.5,1\n-74.05,40.5,2\n");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn discarded_file_leaves_nothing() {
        let dir = TempDir::new("terrain-output").unwrap();
        let writer = TileWriter::create(dir.path(), &Tile::new(1, 2, 3), OutputFormat::RowRecords)
            .await
            .unwrap();

        writer.discard().await;
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
