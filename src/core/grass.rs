// Copyright (c) 2021 Tangram Robotics Inc. - All Rights Reserved
// Unauthorized copying of this file, via any medium is strictly prohibited
// Proprietary and confidential
// ----------------------------

//! Running GRASS GIS modules and parsing what they print.
//!
//! Every GRASS interaction goes through the [`GrassRunner`] trait so command
//! flows can be exercised without a GRASS session.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use log::{debug, warn};

use super::error::GrassError;
use crate::app_config::DatasetType;

/// A single GRASS module invocation, e.g. `g.region -p raster=elevation`.
#[derive(Clone, Debug, PartialEq)]
pub struct GrassCommand {
    module: String,
    flags: String,
    params: Vec<(String, String)>,
}

impl GrassCommand {
    pub fn new(module: &str) -> Self {
        Self {
            module: module.to_owned(),
            flags: String::new(),
            params: Vec::new(),
        }
    }

    pub fn flags(mut self, flags: &str) -> Self {
        self.flags.push_str(flags);
        self
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.push((key.to_owned(), value.to_string()));
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Arguments as passed on the command line.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.params.len() + 1);
        if !self.flags.is_empty() {
            args.push(format!("-{}", self.flags));
        }
        args.extend(self.params.iter().map(|(k, v)| format!("{}={}", k, v)));
        args
    }
}

impl fmt::Display for GrassCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.module)?;
        for arg in self.args() {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Executes GRASS modules in the current session.
pub trait GrassRunner {
    /// Run a module and return its standard output.
    fn read(&self, cmd: &GrassCommand) -> Result<String>;

    /// Run a module, discarding its output.
    fn run(&self, cmd: &GrassCommand) -> Result<()> {
        self.read(cmd).map(|_| ())
    }

    /// Whether an (addon) module can be executed at all.
    fn has_module(&self, module: &str) -> bool;

    /// Path of the `GISRC` file describing the current session.
    fn gisrc(&self) -> Result<PathBuf> {
        std::env::var_os("GISRC")
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("GISRC is not set, run this tool inside a GRASS GIS session"))
    }
}

/// Runs GRASS modules as child processes, found on `PATH`.
pub struct GrassCli;

impl GrassRunner for GrassCli {
    fn read(&self, cmd: &GrassCommand) -> Result<String> {
        debug!("running {}", cmd);
        let output = Command::new(cmd.module())
            .args(cmd.args())
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Could not execute GRASS module {}", cmd.module()))?;
        if !output.status.success() {
            return Err(GrassError::ModuleFailed {
                module: cmd.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            }
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn has_module(&self, module: &str) -> bool {
        Command::new(module)
            .arg("--help")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

/// Name without the `@mapset` qualifier.
pub fn strip_mapset(name: &str) -> &str {
    name.split('@').next().unwrap_or(name)
}

/// Non-empty, trimmed output lines.
pub fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect()
}

/// `key=value` lines as printed by shell-style (`-g`) output.
pub fn parse_key_values(text: &str) -> BTreeMap<String, String> {
    parse_lines(text)
        .into_iter()
        .filter_map(|line| {
            let (k, v) = line.split_once('=')?;
            Some((k.trim().to_owned(), v.trim().to_owned()))
        })
        .collect()
}

/// The session variables we need from the `GISRC` file.
#[derive(Debug, PartialEq)]
pub struct Gisenv {
    pub location_name: String,
    pub mapset: String,
}

impl Gisenv {
    pub fn parse(text: &str) -> Result<Self> {
        let vars: BTreeMap<&str, &str> = text
            .lines()
            .filter_map(|line| {
                let (k, v) = line.split_once(':')?;
                Some((k.trim(), v.trim()))
            })
            .collect();
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.to_string())
                .ok_or_else(|| anyhow!("GISRC does not define {}", key))
        };
        Ok(Self {
            location_name: get("LOCATION_NAME")?,
            mapset: get("MAPSET")?,
        })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read GISRC file {}", path.display()))?;
        Self::parse(&text)
    }
}

/// EPSG code from `g.proj -g` output.
pub fn epsg_from_proj(proj: &BTreeMap<String, String>) -> Result<String> {
    if let Some(epsg) = proj.get("epsg") {
        return Ok(epsg.clone());
    }
    proj.get("srid")
        .and_then(|srid| srid.split("EPSG:").nth(1))
        .map(str::to_owned)
        .ok_or_else(|| anyhow!("Could not determine the EPSG code of the current location"))
}

/// Value range a GRASS color table is defined for.
#[derive(Clone, Debug, PartialEq)]
pub enum ColorRange {
    MapValues,
    Fixed(f64, f64),
}

/// Parses `r.colors -d` lines, e.g. `ndvi: NDVI colors [range: -1 to 1]`.
pub fn parse_color_rules(text: &str) -> Result<BTreeMap<String, ColorRange>> {
    let mut rules = BTreeMap::new();
    for line in parse_lines(text) {
        let name = line.split(':').next().unwrap_or_default().trim().to_owned();
        let range = match line.split("range: ").nth(1) {
            Some(range) => range.replace(']', ""),
            None => continue,
        };
        let range = range.trim();
        let parsed = if range == "map values" {
            ColorRange::MapValues
        } else {
            let (min, max) = range
                .split_once(" to ")
                .ok_or_else(|| anyhow!("Malformed color range for {}: {}", name, range))?;
            ColorRange::Fixed(
                min.trim().parse().with_context(|| format!("Bad minimum for {}", name))?,
                max.trim().parse().with_context(|| format!("Bad maximum for {}", name))?,
            )
        };
        rules.insert(name, parsed);
    }
    Ok(rules)
}

/// Parses `r.quantile` lines (`0:2.000000:123.45`) into the quantile values.
pub fn parse_quantiles(text: &str) -> Result<Vec<f64>> {
    parse_lines(text)
        .iter()
        .map(|line| {
            line.split(':')
                .nth(2)
                .ok_or_else(|| anyhow!("Unexpected r.quantile output: {}", line))?
                .trim()
                .parse::<f64>()
                .with_context(|| format!("Unexpected r.quantile output: {}", line))
        })
        .collect()
}

/// A map registered in a space time raster dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct RegisteredMap {
    pub name: String,
    pub start: NaiveDate,
}

/// Parses `t.rast.list -u columns=name,start_time separator=pipe`.
pub fn parse_registered_maps(text: &str) -> Result<Vec<RegisteredMap>> {
    parse_lines(text)
        .iter()
        .map(|line| {
            let (name, start) = line
                .split_once('|')
                .ok_or_else(|| anyhow!("Unexpected t.rast.list output: {}", line))?;
            let date = start.trim().get(..10).unwrap_or_default();
            Ok(RegisteredMap {
                name: name.trim().to_owned(),
                start: NaiveDate::parse_from_str(date, "%Y-%m-%d")
                    .with_context(|| format!("Bad start time for map {}: {}", name, start))?,
            })
        })
        .collect()
}

pub fn list_rasters(grass: &dyn GrassRunner) -> Result<Vec<String>> {
    let out = grass.read(&GrassCommand::new("g.list").param("type", "raster"))?;
    Ok(parse_lines(&out)
        .iter()
        .map(|r| strip_mapset(r).to_owned())
        .collect())
}

pub fn list_strds(grass: &dyn GrassRunner) -> Result<Vec<String>> {
    let out = grass.read(&GrassCommand::new("t.list").param("type", "strds"))?;
    Ok(parse_lines(&out)
        .iter()
        .map(|s| strip_mapset(s).to_owned())
        .collect())
}

pub fn projection_epsg(grass: &dyn GrassRunner) -> Result<String> {
    let out = grass.read(&GrassCommand::new("g.proj").flags("g"))?;
    epsg_from_proj(&parse_key_values(&out))
}

pub fn color_rules(grass: &dyn GrassRunner) -> Result<BTreeMap<String, ColorRange>> {
    parse_color_rules(&grass.read(&GrassCommand::new("r.colors").flags("d"))?)
}

/// The 2% and 98% percentiles of a raster map.
pub fn stretch_percentiles(grass: &dyn GrassRunner, map: &str) -> Result<(f64, f64)> {
    let out = grass.read(
        &GrassCommand::new("r.quantile")
            .param("input", map)
            .param("percentiles", "2,98"),
    )?;
    match parse_quantiles(&out)?.as_slice() {
        [low, high] => Ok((*low, *high)),
        other => bail!("Expected two percentiles for {}, got {:?}", map, other),
    }
}

pub fn registered_maps(grass: &dyn GrassRunner, strds: &str) -> Result<Vec<RegisteredMap>> {
    parse_registered_maps(
        &grass.read(
            &GrassCommand::new("t.rast.list")
                .flags("u")
                .param("input", strds)
                .param("columns", "name,start_time")
                .param("separator", "pipe"),
        )?,
    )
}

pub fn first_registered_map(grass: &dyn GrassRunner, strds: &str) -> Result<String> {
    let out = grass.read(
        &GrassCommand::new("t.rast.list")
            .flags("u")
            .param("input", strds)
            .param("columns", "name"),
    )?;
    parse_lines(&out)
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Space time raster dataset <{}> has no registered maps", strds))
}

/// Decides whether `name` is a raster or a STRDS in the current mapset.
///
/// Returns [`DatasetType::Raster`] or [`DatasetType::Strds`], never `Auto`.
pub fn resolve_dataset(
    grass: &dyn GrassRunner,
    name: &str,
    requested: DatasetType,
) -> Result<DatasetType> {
    let strds_exists = matches!(requested, DatasetType::Auto | DatasetType::Strds)
        && list_strds(grass)?.iter().any(|s| s == name);
    let raster_exists = matches!(requested, DatasetType::Auto | DatasetType::Raster)
        && list_rasters(grass)?.iter().any(|r| r == name);
    match (raster_exists, strds_exists) {
        (true, true) => Err(GrassError::AmbiguousDataset(name.to_owned()).into()),
        (false, false) => Err(GrassError::DatasetNotFound(name.to_owned()).into()),
        (true, false) => Ok(DatasetType::Raster),
        (false, true) => Ok(DatasetType::Strds),
    }
}

/// Temporary GRASS state that has to be removed however a command exits.
///
/// Dropping the guard removes registered rasters, then restores and deletes
/// the saved region.
pub struct SessionCleanup<'a> {
    grass: &'a dyn GrassRunner,
    region: Option<String>,
    rasters: Vec<String>,
}

impl<'a> SessionCleanup<'a> {
    pub fn new(grass: &'a dyn GrassRunner) -> Self {
        Self {
            grass,
            region: None,
            rasters: Vec::new(),
        }
    }

    /// Save the current computational region so it is restored on drop.
    pub fn save_region(&mut self, name: &str) -> Result<()> {
        self.grass
            .run(&GrassCommand::new("g.region").param("save", name))?;
        self.region = Some(name.to_owned());
        Ok(())
    }

    pub fn remove_raster_later(&mut self, name: &str) {
        self.rasters.push(name.to_owned());
    }
}

impl Drop for SessionCleanup<'_> {
    fn drop(&mut self) {
        for raster in &self.rasters {
            let cmd = GrassCommand::new("g.remove")
                .flags("f")
                .param("type", "raster")
                .param("name", raster);
            if let Err(e) = self.grass.run(&cmd) {
                warn!("Could not remove raster {}: {}", raster, e);
            }
        }
        if let Some(region) = &self.region {
            let restore = GrassCommand::new("g.region").param("region", region);
            let remove = GrassCommand::new("g.remove")
                .flags("f")
                .param("type", "region")
                .param("name", region);
            if let Err(e) = self.grass.run(&restore).and_then(|_| self.grass.run(&remove)) {
                warn!("Could not restore region {}: {}", region, e);
            }
        }
    }
}
