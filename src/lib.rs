//! grass-geoserver is a Command Line Interface (CLI) for publishing GRASS GIS
//! raster maps and space time raster datasets (STRDS) to
//! [GeoServer](https://geoserver.org) and styling them with GRASS color
//! tables.
//!
//! It talks to GeoServer's REST API and runs GRASS modules of the current
//! session, so it has to be started inside a GRASS GIS session (`GISRC` must
//! be set).
//!
//! # Usage
//!
//! View CLI help with `grass-geoserver help` or
//! `grass-geoserver help <subcommand>`.
//!
//! ## Configuration
//!
//! Connection settings are read, from lowest to highest priority, from:
//!
//! - a TOML file at `~/.config/grass-geoserver/config.toml` (optional) or
//!   given with `--config path/to/config.toml` (required then)
//! - environment variables prefixed with `GEOSERVER_`, e.g.
//!   `GEOSERVER_HOST=http://localhost`
//! - the global options `--host`, `--port`, `--user`, `--password`,
//!   `--workspace`, `--datapath`, `--outputfolder` and `--timeout`
//!
//! ```toml
//! host = "http://localhost"
//! port = 8080
//! user = "admin"
//! password = "geoserver"
//! workspace = "grass"
//! # Directory shared with GeoServer, as GeoServer sees it
//! datapath = "/opt/geoserver_data"
//! # The same directory, as seen locally
//! outputfolder = "/mnt/geoserver_data"
//! ```
//!
//! Without `datapath` exported files are uploaded to GeoServer instead.
//!
//! ## Commands
//!
//! ```grass-geoserver config```
//!
//! Echoes current config (with any overrides applied, password masked) and
//! exits.
//!
//! <br>
//!
//! ---
//!
//! ```grass-geoserver publish -i <input> --coveragestore <store> -l <layer> --gs-file-path <path>```
//!
//! Publishes a raster map or STRDS through the
//! [GRASS raster datastore](https://github.com/mundialis/geoserver-grass-raster-datastore)
//! plugin. `--gs-file-path` is the current mapset as GeoServer sees it and
//! has to end with the current location and mapset.
//!
//! <br>
//!
//! ---
//!
//! ```grass-geoserver style -l <layer> [-g <grassmap>] [-n]```
//!
//! Converts the color table of a GRASS map to SLD with `r.colors.out_sld`
//! (install it with `g.extension r.colors.out_sld`) and sets it as default
//! style of the layer. Cells with value 0 are rendered transparent unless
//! `-n` is given.
//!
//! <br>
//!
//! ---
//!
//! ```grass-geoserver export -i <input> -l <layer> [--outputformat COG]```
//!
//! Exports a raster map as (cloud optimized) GeoTIFF and publishes it as
//! GeoTIFF coverage store and layer.
//!
//! <br>
//!
//! ---
//!
//! ```grass-geoserver publish-strds -i <strds> (--layername-prefix <prefix> | --mosaic-layername <layer>) [--color <table>]```
//!
//! Publishes all maps of a STRDS, either as one layer per map or as a single
//! time-enabled ImageMosaic layer. With `--color` the maps are stretched to
//! a common value range and styled with the GRASS color table.
//!
//! ## Examples
//!
//! ```shell
//! # Publish the elevation raster of the North Carolina sample location
//! grass-geoserver publish -i elevation --coveragestore elev_store -l elevation \
//!     --gs-file-path /opt/grassdata/nc_spm_08_grass7/PERMANENT
//!
//! # Style it with its own color table
//! grass-geoserver style -l elevation
//!
//! # Publish monthly land surface temperatures as ImageMosaic, NDVI colored
//! grass-geoserver --workspace modis publish-strds -i LST_Day_monthly \
//!     --mosaic-layername lst --color ndvi
//! ```
//!
//! # Troubleshooting
//!
//! | Error                                 | Resolution                                                                                       |
//! |-                                      |-                                                                                                 |
//! | GISRC is not set                      | Run grass-geoserver inside a GRASS GIS session.                                                  |
//! | GeoServer host must include the URI scheme | Use e.g. `--host http://localhost` instead of `--host localhost`.                          |
//! | Connection refused                    | Make sure GeoServer is running and reachable at `<host>:<port>/geoserver`.                      |
//! | Directory ... is not empty!           | The ImageMosaic was probably published before; remove the directory or pick another layer name. |
//!
//! Log output is controlled with `RUST_LOG`, e.g. `RUST_LOG=debug` shows
//! every request and response.

#[cfg(not(debug_assertions))]
use human_panic::setup_panic;

mod app_config;
mod cli;
mod core;

use anyhow::Result;
use env_logger::Env;

#[doc(hidden)]
/// Main entrypoint
pub fn run() -> Result<()> {
    // Human Panic. Only enabled when *not* debugging.
    //
    // Example of what panic message looks like:
    // https://docs.rs/human-panic/1.0.3/human_panic/
    #[cfg(not(debug_assertions))]
    {
        setup_panic!();
    }

    // Better Panic. Only enabled *when* debugging.
    #[cfg(debug_assertions)]
    {
        better_panic::Settings::debug()
            .most_recent_first(false)
            .lineno_suffix(true)
            .verbosity(better_panic::Verbosity::Full)
            .install();
    }

    // Progress messages are logged at info level
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // Get CLI arguments and flags (one may have provided the config file to use)
    let cli_matches = cli::cli_config()?;

    let settings = app_config::load_config(
        cli_matches.get_one::<String>("config").map(String::as_str),
        &cli::config_overrides(&cli_matches),
    )?;

    // Match against CLI subcommands, which delegate to functions
    cli::cli_match(settings, cli_matches)
}
