// Copyright (c) 2021 Tangram Robotics Inc. - All Rights Reserved
// Unauthorized copying of this file, via any medium is strictly prohibited
// Proprietary and confidential
// ----------------------------

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString, EnumVariantNames, IntoStaticStr};

/// Default config file location, used when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "~/.config/grass-geoserver/config.toml";

/// Prefix of environment variables overriding the config file, e.g.
/// `GEOSERVER_HOST=http://localhost`.
pub const ENV_PREFIX: &str = "GEOSERVER";

/// Keys that may also be given as global CLI options.
pub const OVERRIDABLE_KEYS: [&str; 8] = [
    "host",
    "port",
    "user",
    "password",
    "workspace",
    "datapath",
    "outputfolder",
    "timeout",
];

/// Data set type of the input.
#[derive(
    AsRefStr, Display, EnumString, EnumVariantNames, IntoStaticStr, Clone, Copy, Debug, PartialEq, Eq,
)]
#[strum(serialize_all = "lowercase")]
pub enum DatasetType {
    Raster,
    Strds,
    Auto,
}

impl Default for DatasetType {
    fn default() -> Self {
        DatasetType::Auto
    }
}

/// GRASS color tables offered for styling a published STRDS.
#[derive(AsRefStr, Display, EnumString, EnumVariantNames, Clone, Copy, Debug, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum ColorTable {
    Bcyr,
    Bgyr,
    Blues,
    Byg,
    Byr,
    Default,
    Elevation,
    Evi,
    ForestCover,
    Grass,
    Greens,
    Grey,
    Gyr,
    Ndvi,
    Ndwi,
    Reds,
    Ryb,
    Ryg,
}

/// GDAL output format used when exporting rasters for GeoServer.
#[derive(
    AsRefStr, Display, EnumString, EnumVariantNames, IntoStaticStr, Clone, Copy, Debug, PartialEq, Eq,
)]
pub enum OutputFormat {
    #[strum(serialize = "GTiff")]
    GTiff,
    #[strum(serialize = "COG")]
    Cog,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::GTiff
    }
}

/// Connection and path settings, after merging config file, environment and
/// CLI options.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GeoServerSettings {
    /// GeoServer host including URI scheme, e.g. `http://localhost`
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Request timeout in seconds
    pub timeout: u64,
    /// Workspace used when a subcommand does not name one
    pub workspace: Option<String>,
    /// Directory shared with GeoServer, as seen from GeoServer. Data is
    /// uploaded instead of shared when unset.
    pub datapath: Option<String>,
    /// Local directory exports are written to
    pub outputfolder: Option<PathBuf>,
}

impl GeoServerSettings {
    /// Empty optional values count as unset, e.g. `GEOSERVER_DATAPATH=""`
    /// means there is no shared directory.
    pub fn from_config(config: config::Config) -> Result<Self> {
        let mut settings = config.try_deserialize::<GeoServerSettings>()?;
        settings.workspace = settings.workspace.filter(|w| !w.is_empty());
        settings.datapath = settings.datapath.filter(|p| !p.is_empty());
        settings.outputfolder = settings
            .outputfolder
            .filter(|p| !p.as_os_str().is_empty());
        Ok(settings)
    }

    pub fn workspace(&self) -> Result<&str> {
        self.workspace.as_deref().ok_or_else(|| {
            anyhow!("No workspace given, use --workspace or set GEOSERVER_WORKSPACE")
        })
    }

    /// Copy with the password replaced, for display.
    pub fn masked(&self) -> Self {
        Self {
            password: "********".to_owned(),
            ..self.clone()
        }
    }
}

/// Layers config file, environment and CLI overrides (in increasing
/// priority).
///
/// A config file passed explicitly must exist; the default one is optional.
pub fn load_config(
    config_file: Option<&str>,
    overrides: &[(&str, Option<String>)],
) -> Result<config::Config> {
    let file = match config_file {
        Some(path) => config::File::with_name(path).required(true),
        None => config::File::with_name(&shellexpand::tilde(DEFAULT_CONFIG_FILE)).required(false),
    };
    let mut builder = config::Config::builder()
        .set_default("timeout", 30_i64)?
        .add_source(file)
        .add_source(config::Environment::with_prefix(ENV_PREFIX).ignore_empty(true));
    for (key, value) in overrides {
        builder = builder.set_override_option(*key, value.clone())?;
    }
    Ok(builder.build()?)
}
