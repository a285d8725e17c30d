use anyhow::{anyhow, Context, Result};
use clap::{
    app_from_crate, crate_authors, crate_description, crate_name, crate_version,
    AppSettings, Arg, ArgMatches,
};
use std::{fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use crate::validators::*;
use terrain_mosaic::{
    default_workers, BoundingBox, Config, Database, Encoding, OutputFormat, Provider,
    Target, UrlFormat, Zoom, AWS_TERRARIUM, MAPBOX_TERRAIN_RGB,
};

const TOKEN_ARG: &str = "token";
const URL_ARG: &str = "url";
const ENCODING_ARG: &str = "encoding";
const TILE_SIZE_ARG: &str = "tile_size";
const MIN_LAT_ARG: &str = "minlat";
const MAX_LAT_ARG: &str = "maxlat";
const MIN_LNG_ARG: &str = "minlng";
const MAX_LNG_ARG: &str = "maxlng";
const ZOOM_ARG: &str = "zoom";
const WIDTH_ARG: &str = "width";
const HEIGHT_ARG: &str = "height";
const WORKERS_ARG: &str = "workers";
const MAX_TILES_ARG: &str = "max_tiles";
const WORKDIR_ARG: &str = "workdir";
const FORMAT_ARG: &str = "format";
const TARGET_ARG: &str = "target";
const OUT_FILE_ARG: &str = "out_file";
const DB_NAME_ARG: &str = "db_name";
const DB_USER_ARG: &str = "db_user";
const DB_PASS_ARG: &str = "db_pass";
const DB_TABLE_ARG: &str = "db_table";
const DB_HOST_ARG: &str = "db_host";
const DB_PORT_ARG: &str = "db_port";
const TIMEOUT_ARG: &str = "timeout";
const REQUEST_RETRIES_ARG: &str = "num_retries";
const DRY_RUN_ARG: &str = "dry_run";

const DEFAULT_MAX_TILES_STR: &str = "100";

pub struct Args {
    pub bounding_box: BoundingBox,
    pub zoom: Zoom,
    pub provider: Provider,
    pub workers: usize,
    pub max_tiles: usize,
    pub working_dir: Option<PathBuf>,
    pub output_format: OutputFormat,
    pub target: Target,
    pub retries: u8,
    pub timeout: Duration,
    pub dry_run: bool,
}

impl std::convert::From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            bounding_box: args.bounding_box,
            zoom: args.zoom,
            provider: args.provider,
            workers: args.workers,
            max_tiles: args.max_tiles,
            output_format: args.output_format,
            working_dir: args.working_dir,
            target: args.target,
            timeout: args.timeout,
            request_retries_amount: args.retries,
            show_progress: true,
        }
    }
}

impl Args {
    pub fn parse() -> Result<Self> {
        let matches = get_matches();

        let encoding: Encoding = value(&matches, ENCODING_ARG)?;
        let token = matches.value_of(TOKEN_ARG).map(str::to_owned);
        let url = match matches.value_of(URL_ARG) {
            Some(url) => url.to_owned(),
            None => match encoding {
                Encoding::TerrainRgb => MAPBOX_TERRAIN_RGB.to_owned(),
                Encoding::Terrarium => AWS_TERRARIUM.to_owned(),
            },
        };
        let provider = Provider {
            url: UrlFormat::new(url, token),
            encoding,
            tile_size: value(&matches, TILE_SIZE_ARG)?,
            ..Provider::mapbox(None)
        };

        let zoom = match matches.value_of(ZOOM_ARG) {
            // an explicit zoom wins over fitting the canvas
            Some(val) => Zoom::Explicit(val.parse().context("invalid zoom")?),
            None => Zoom::FitCanvas {
                width: value(&matches, WIDTH_ARG)?,
                height: value(&matches, HEIGHT_ARG)?,
            },
        };

        let bounding_box = BoundingBox::new(
            value(&matches, MIN_LAT_ARG)?,
            value(&matches, MAX_LAT_ARG)?,
            value(&matches, MIN_LNG_ARG)?,
            value(&matches, MAX_LNG_ARG)?,
        );

        let workers = match matches.value_of(WORKERS_ARG) {
            Some(val) => val.parse().context("invalid worker count")?,
            None => default_workers(),
        };

        let target = match matches.value_of(TARGET_ARG).unwrap_or("geotiff") {
            "geotiff" => Target::GeoTiff(value(&matches, OUT_FILE_ARG)?),
            "postgis" => Target::Postgis(Database {
                name: value(&matches, DB_NAME_ARG)?,
                user: value(&matches, DB_USER_ARG)?,
                password: matches.value_of(DB_PASS_ARG).unwrap_or_default().to_owned(),
                table: value(&matches, DB_TABLE_ARG)?,
                host: value(&matches, DB_HOST_ARG)?,
                port: value(&matches, DB_PORT_ARG)?,
            }),
            _ => Target::None,
        };

        Ok(Self {
            bounding_box,
            zoom,
            provider,
            workers,
            max_tiles: value(&matches, MAX_TILES_ARG)?,
            working_dir: matches.value_of(WORKDIR_ARG).map(PathBuf::from),
            output_format: value(&matches, FORMAT_ARG)?,
            target,
            retries: value(&matches, REQUEST_RETRIES_ARG)?,
            timeout: Duration::from_secs(value(&matches, TIMEOUT_ARG)?),
            dry_run: matches.is_present(DRY_RUN_ARG),
        })
    }
}

/// Parses a flag that has a default value or was checked by a validator.
fn value<T>(matches: &ArgMatches<'_>, name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = matches
        .value_of(name)
        .ok_or_else(|| anyhow!("missing value for --{}", name.replace('_', "-")))?;

    raw.parse()
        .map_err(|e| anyhow!("invalid value {:?} for --{}: {}", raw, name.replace('_', "-"), e))
}

fn get_matches() -> ArgMatches<'static> {
    app_from_crate!()
        .setting(AppSettings::GlobalVersion)
        .setting(AppSettings::VersionlessSubcommands)
        .arg(
            Arg::with_name(TOKEN_ARG)
                .help("Access token substituted for `{token}` in the tile URL")
                .env("MAPBOX_ACCESS_TOKEN")
                .takes_value(true)
                .long("token"),
        )
        .arg(
            Arg::with_name(URL_ARG)
                .help("The URL with format specifiers `{x}`, `{y}`, `{z}` and `{token}` to fetch the tiles from. Defaults to the endpoint matching --encoding.")
                .takes_value(true)
                .short("u")
                .long("url"),
        )
        .arg(
            Arg::with_name(ENCODING_ARG)
                .help("How elevations are encoded in tile pixels (terrain-rgb or terrarium)")
                .validator(is_encoding)
                .default_value("terrain-rgb")
                .takes_value(true)
                .long("encoding"),
        )
        .arg(
            Arg::with_name(TILE_SIZE_ARG)
                .help("Edge length of a tile in pixels")
                .validator(is_numeric_min(1))
                .default_value("256")
                .takes_value(true)
                .long("tile-size"),
        )
        .arg(
            Arg::with_name(MIN_LAT_ARG)
                .help("Latitude of the southern bounding box boundary (in degrees)")
                .validator(is_latitude)
                .default_value("-85")
                .takes_value(true)
                .allow_hyphen_values(true)
                .long("minlat"),
        )
        .arg(
            Arg::with_name(MAX_LAT_ARG)
                .help("Latitude of the northern bounding box boundary (in degrees)")
                .validator(is_latitude)
                .default_value("85")
                .takes_value(true)
                .allow_hyphen_values(true)
                .long("maxlat"),
        )
        .arg(
            Arg::with_name(MIN_LNG_ARG)
                .help("Longitude of the western bounding box boundary (in degrees)")
                .validator(is_longitude)
                .default_value("-175")
                .takes_value(true)
                .allow_hyphen_values(true)
                .long("minlng"),
        )
        .arg(
            Arg::with_name(MAX_LNG_ARG)
                .help("Longitude of the eastern bounding box boundary (in degrees)")
                .validator(is_longitude)
                .default_value("175")
                .takes_value(true)
                .allow_hyphen_values(true)
                .long("maxlng"),
        )
        .arg(
            Arg::with_name(ZOOM_ARG)
                .help("Zoom level to fetch. Calculated from --width and --height if not provided.")
                .validator(is_numeric_min(1))
                .takes_value(true)
                .short("z")
                .long("zoom"),
        )
        .arg(
            Arg::with_name(WIDTH_ARG)
                .help("Width (in pixels) of the canvas the zoom is fitted to")
                .validator(is_numeric_min(1))
                .default_value("1920")
                .takes_value(true)
                .long("width"),
        )
        .arg(
            Arg::with_name(HEIGHT_ARG)
                .help("Height (in pixels) of the canvas the zoom is fitted to")
                .validator(is_numeric_min(1))
                .default_value("1080")
                .takes_value(true)
                .long("height"),
        )
        .arg(
            Arg::with_name(WORKERS_ARG)
                .help("The amount of tiles fetched in parallel. Defaults to the number of CPUs.")
                .validator(is_numeric_min(1))
                .takes_value(true)
                .short("w")
                .long("workers"),
        )
        .arg(
            Arg::with_name(MAX_TILES_ARG)
                .help("Refuse to run if more tiles than this would be fetched")
                .validator(is_numeric_min(1))
                .default_value(DEFAULT_MAX_TILES_STR)
                .takes_value(true)
                .long("max-tiles"),
        )
        .arg(
            Arg::with_name(WORKDIR_ARG)
                .help("Directory for the per-tile files. They are kept after the run; without this a temporary directory is used.")
                .takes_value(true)
                .long("workdir"),
        )
        .arg(
            Arg::with_name(FORMAT_ARG)
                .help("Layout of the per-tile files (row-records or pixel-records)")
                .validator(is_output_format)
                .default_value("row-records")
                .takes_value(true)
                .long("format"),
        )
        .arg(
            Arg::with_name(TARGET_ARG)
                .help("What to assemble the tiles into")
                .possible_values(&["geotiff", "postgis", "none"])
                .default_value("geotiff")
                .takes_value(true)
                .long("target"),
        )
        .arg(
            Arg::with_name(OUT_FILE_ARG)
                .help("The GeoTIFF to write. `.tif` is appended if missing.")
                .default_value("out.tif")
                .takes_value(true)
                .short("o")
                .long("out-file"),
        )
        .arg(
            Arg::with_name(DB_NAME_ARG)
                .help("PostGIS database name")
                .default_value("geodev")
                .takes_value(true)
                .long("db-name"),
        )
        .arg(
            Arg::with_name(DB_USER_ARG)
                .help("PostGIS user")
                .default_value("geodev")
                .takes_value(true)
                .long("db-user"),
        )
        .arg(
            Arg::with_name(DB_PASS_ARG)
                .help("PostGIS password")
                .env("PGPASSWORD")
                .takes_value(true)
                .long("db-pass"),
        )
        .arg(
            Arg::with_name(DB_TABLE_ARG)
                .help("Table the rasters are imported into")
                .default_value("elevation")
                .takes_value(true)
                .long("db-table"),
        )
        .arg(
            Arg::with_name(DB_HOST_ARG)
                .help("PostGIS host")
                .default_value("localhost")
                .takes_value(true)
                .long("db-host"),
        )
        .arg(
            Arg::with_name(DB_PORT_ARG)
                .help("PostGIS port")
                .validator(is_numeric_min(1))
                .default_value("5432")
                .takes_value(true)
                .long("db-port"),
        )
        .arg(
            Arg::with_name(TIMEOUT_ARG)
                .help("The timeout (in seconds) for fetching a single tile. Pass 0 for no timeout.")
                .validator(is_numeric_min(0))
                .default_value("10")
                .takes_value(true)
                .short("t")
                .long("timeout"),
        )
        .arg(
            Arg::with_name(REQUEST_RETRIES_ARG)
                .help("The amount of times to retry a failed HTTP request.")
                .validator(is_numeric_min(0))
                .default_value("3")
                .takes_value(true)
                .long("retries"),
        )
        .arg(
            Arg::with_name(DRY_RUN_ARG)
                .help("Don't actually fetch anything, just determine how many tiles would be fetched.")
                .required(false)
                .takes_value(false)
                .long("dry-run"),
        )
        .get_matches()
}
