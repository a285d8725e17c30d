mod args;
mod validators;

use anyhow::{Context, Result};
use args::Args;
use terrain_mosaic::{Config, Pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse()?;
    let dry_run = args.dry_run;
    let config: Config = args.into();

    if dry_run {
        config.validate_extent()?;
        let viewport = config.viewport();
        let tile_count = viewport.tile_count();

        eprintln!(
            "would download {} tiles at zoom {} (approx {}, assuming 100 kb per tile)",
            tile_count,
            viewport.zoom,
            pretty_bytes::converter::convert((tile_count as f64) * 100_000f64)
        );
        if tile_count > config.max_tiles {
            eprintln!(
                "this exceeds the limit of {} tiles, raise the zoom or shrink the bounds",
                config.max_tiles
            );
        }

        return Ok(());
    }

    let mut pipeline = Pipeline::http(config)?;

    let summary = pipeline.run().await.context("failed building mosaic")?;
    if let Some(dir) = summary.working_dir {
        log::info!("tile files kept in {}", dir.display());
    }

    Ok(())
}
