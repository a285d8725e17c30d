//! Merging the per-tile files into a single product with GDAL or PostGIS
//! tooling.
//!
//! Every intermediate file is first converted into a GeoTIFF next to it with
//! `gdal_translate`, which reads the XYZ grid as written. The GeoTIFFs are
//! then either warped into one output file or loaded into a PostGIS table.

use std::{
    ffi::OsString,
    future::Future,
    path::{Path, PathBuf},
};
use tokio::{fs, process::Command};

use crate::error::{Error, Result};

const GEOTIFF_EXTENSION: &str = "tif";
const IMPORT_SCRIPT: &str = "import_to_pgsql.sql";

/// Turns the finished intermediate files of a run into the final product.
///
/// `tiles` lists exactly the files written by the run; anything else in
/// `tile_dir` is left alone.
pub trait Assembler: Send + Sync {
    fn assemble(
        &self,
        tile_dir: &Path,
        tiles: &[PathBuf],
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Names of the external executables, overridable for non-standard installs.
#[derive(Clone, Debug, PartialEq)]
pub struct Toolchain {
    pub gdal_translate: String,
    pub gdalwarp: String,
    pub raster2pgsql: String,
    pub psql: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            gdal_translate: "gdal_translate".to_owned(),
            gdalwarp: "gdalwarp".to_owned(),
            raster2pgsql: "raster2pgsql".to_owned(),
            psql: "psql".to_owned(),
        }
    }
}

/// Connection settings for a PostGIS import.
#[derive(Clone, PartialEq)]
pub struct Database {
    pub name: String,
    pub user: String,
    pub password: String,
    pub table: String,
    pub host: String,
    pub port: u16,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("user", &self.user)
            .field("table", &self.table)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

/// What the tiles are assembled into.
#[derive(Clone, Debug, PartialEq)]
pub enum Target {
    /// One merged GeoTIFF. `.tif` is appended when missing.
    GeoTiff(PathBuf),

    /// Rasters loaded into a PostGIS table.
    Postgis(Database),

    /// Keep the intermediate files only.
    None,
}

/// Runs the external tools for a [`Target`].
#[derive(Clone, Debug)]
pub struct ExternalAssembler {
    pub target: Target,
    pub tools: Toolchain,
    pub tile_size: u32,
}

impl ExternalAssembler {
    pub fn new(target: Target, tile_size: u32) -> Self {
        Self {
            target,
            tools: Toolchain::default(),
            tile_size,
        }
    }

    async fn tiles_to_rasters(&self, tiles: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut tiles = tiles.to_vec();
        tiles.sort();
        log::info!("converting {} tiles to GeoTIFF", tiles.len());

        let mut rasters = Vec::with_capacity(tiles.len());
        for tile in tiles {
            let raster = tile.with_extension(GEOTIFF_EXTENSION);
            log::debug!("building {} from {}", raster.display(), tile.display());

            let args: Vec<OsString> = vec![
                "-q".into(),
                "-if".into(),
                "XYZ".into(),
                "-a_srs".into(),
                "EPSG:4326".into(),
                tile.into_os_string(),
                raster.clone().into_os_string(),
            ];
            run_tool(&self.tools.gdal_translate, &args, &[]).await?;
            rasters.push(raster);
        }

        Ok(rasters)
    }

    async fn merge(&self, rasters: Vec<PathBuf>, out_file: &Path) -> Result<()> {
        let out_file = geotiff_path(out_file);
        log::info!("merging {} rasters into {}", rasters.len(), out_file.display());

        let mut args: Vec<OsString> = vec![
            "-overwrite".into(),
            "--config".into(),
            "GDAL_CACHEMAX".into(),
            "3000".into(),
            "-wm".into(),
            "3000".into(),
        ];
        args.extend(rasters.into_iter().map(PathBuf::into_os_string));
        args.push(out_file.into_os_string());

        run_tool(&self.tools.gdalwarp, &args, &[]).await.map(drop)
    }

    async fn import(&self, tile_dir: &Path, rasters: Vec<PathBuf>, db: &Database) -> Result<()> {
        log::info!("importing {} rasters into table {}", rasters.len(), db.table);

        let blocks = format!("{0}x{0}", self.tile_size);
        let mut args: Vec<OsString> = ["-d", "-I", "-C", "-M", "-F", "-t", blocks.as_str(), "-s", "4326"]
            .iter()
            .map(OsString::from)
            .collect();
        args.extend(rasters.into_iter().map(PathBuf::into_os_string));
        args.push(db.table.clone().into());

        let sql = run_tool(&self.tools.raster2pgsql, &args, &[]).await?;
        let script = tile_dir.join(IMPORT_SCRIPT);
        fs::write(&script, sql).await.map_err(|source| Error::Io {
            path: script.clone(),
            source,
        })?;

        let port = db.port.to_string();
        let args: Vec<OsString> = vec![
            "-U".into(),
            db.user.clone().into(),
            "-d".into(),
            db.name.clone().into(),
            "-h".into(),
            db.host.clone().into(),
            "-p".into(),
            port.into(),
            "-f".into(),
            script.into_os_string(),
        ];
        run_tool(&self.tools.psql, &args, &[("PGPASSWORD", db.password.as_str())])
            .await
            .map(drop)
    }
}

impl Assembler for ExternalAssembler {
    async fn assemble(&self, tile_dir: &Path, tiles: &[PathBuf]) -> Result<()> {
        if self.target == Target::None {
            return Ok(());
        }
        if tiles.is_empty() {
            log::warn!("no tiles were written, nothing to assemble");
            return Ok(());
        }

        let rasters = self.tiles_to_rasters(tiles).await?;

        match &self.target {
            Target::None => Ok(()),
            Target::GeoTiff(out_file) => self.merge(rasters, out_file).await,
            Target::Postgis(db) => self.import(tile_dir, rasters, db).await,
        }
    }
}

/// Appends `.tif` unless the name already carries it.
pub fn geotiff_path(out_file: &Path) -> PathBuf {
    if out_file.to_string_lossy().contains(".tif") {
        out_file.to_owned()
    } else {
        let mut name = out_file.as_os_str().to_owned();
        name.push(".");
        name.push(GEOTIFF_EXTENSION);
        PathBuf::from(name)
    }
}

/// Runs `tool` to completion and returns its stdout. A non-zero exit becomes
/// [`Error::Assembly`] carrying the tool's stderr.
async fn run_tool(tool: &str, args: &[OsString], env: &[(&str, &str)]) -> Result<Vec<u8>> {
    log::debug!("running {} {:?}", tool, args);

    let output = Command::new(tool)
        .args(args)
        .envs(env.iter().copied())
        .output()
        .await
        .map_err(|e| Error::Assembly {
            tool: tool.to_owned(),
            status: "not started".to_owned(),
            stderr: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(Error::Assembly {
            tool: tool.to_owned(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }

    Ok(output.stdout)
}
