// Copyright (c) 2021 Tangram Robotics Inc. - All Rights Reserved
// Unauthorized copying of this file, via any medium is strictly prohibited
// Proprietary and confidential
// ----------------------------

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use uuid::Uuid;

use super::api::geoserver::{self, GeoServerApiConfig};
use super::error::{GeoServerError, GrassError};
use super::grass::{self, ColorRange, Gisenv, GrassCommand, GrassRunner, SessionCleanup};
use super::models::{CoverageSpec, CoverageStoreSpec, StoreType};
use super::{mosaic, sld};
use crate::app_config::{ColorTable, DatasetType, GeoServerSettings, OutputFormat};

/// Joins a path on the GeoServer host; always `/`-separated.
fn server_path(base: &str, parts: &[&str]) -> String {
    let mut path = base.trim_end_matches('/').to_owned();
    for part in parts {
        path.push('/');
        path.push_str(part);
    }
    path
}

/// Location and mapset named by a GeoServer-side mapset path
/// (`.../<location>/<mapset>`).
fn location_and_mapset(gs_file_path: &str) -> Result<(&str, &str)> {
    let mut parts = gs_file_path
        .trim_end_matches('/')
        .rsplit('/')
        .filter(|p| !p.is_empty());
    match (parts.next(), parts.next()) {
        (Some(mapset), Some(location)) => Ok((location, mapset)),
        _ => bail!(
            "<gs_file_path> must end with <location>/<mapset>: {}",
            gs_file_path
        ),
    }
}

/// Exports a raster with its own region as (cloud optimized) GeoTIFF.
fn export_geotiff(
    grass: &dyn GrassRunner,
    map: &str,
    output: &Path,
    format: OutputFormat,
) -> Result<()> {
    grass.run(&GrassCommand::new("g.region").param("raster", map))?;
    let mut cmd = GrassCommand::new("r.out.gdal")
        .flags("mc")
        .param("input", map)
        .param("output", output.display())
        .param("format", format)
        .param("createopt", "COMPRESS=LZW,TILED=YES");
    if format == OutputFormat::Cog {
        cmd = cmd.param("overviews", 5);
    }
    grass.run(&cmd)
}

/// `r.mapcalc` expression stretching `map` linearly from `min..max` to
/// `0.5..255`. 0 is avoided because GeoServer treats it as nodata.
fn rescale_expression(map: &str, output: &str, min: f64, max: f64) -> String {
    let stretch = format!(
        "(\"{map}\" - {min}) * 255.0 / ({max} - {min})",
        map = map,
        min = min,
        max = max
    );
    format!(
        "\"{out}\" = float(if(\"{map}\"<={min},0.5,if(\"{map}\">{max},255,{stretch})))",
        out = output,
        map = map,
        min = min,
        max = max,
        stretch = stretch
    )
}

/// `offset` and `scale` that map a color table's range onto `0..255`.
fn color_offset_scale(min: f64, max: f64) -> (f64, f64) {
    (-min, 255.0 / (max - min))
}

/// Options of [`publish`].
#[derive(Debug)]
pub struct PublishRequest {
    pub input: String,
    pub workspace: String,
    pub coveragestore: String,
    pub layername: String,
    pub title: Option<String>,
    /// The current mapset as seen by GeoServer
    pub gs_file_path: String,
    pub dataset_type: DatasetType,
}

/// Publish a raster map or STRDS through the GeoServer GRASS datastore.
pub async fn publish(
    api: &GeoServerApiConfig,
    grass: &dyn GrassRunner,
    req: &PublishRequest,
) -> Result<()> {
    let input = grass::strip_mapset(&req.input);
    let title = req.title.as_deref().unwrap_or(&req.layername);

    let (location, mapset) = location_and_mapset(&req.gs_file_path)?;
    let gisenv = Gisenv::read(&grass.gisrc()?)?;
    if location != gisenv.location_name {
        return Err(GrassError::LocationMismatch.into());
    }

    let epsg = grass::projection_epsg(grass)?;
    let dataset = grass::resolve_dataset(grass, input, req.dataset_type)?;
    let data_path = match dataset {
        DatasetType::Strds => server_path(&req.gs_file_path, &["tgis", "sqlite.db"]),
        _ => server_path(&req.gs_file_path, &["cellhd", input]),
    };

    geoserver::workspace_create(api, &req.workspace).await?;

    info!("Create coveragestore...");
    let store = CoverageStoreSpec {
        name: req.coveragestore.clone(),
        store_type: StoreType::Grass,
        workspace: req.workspace.clone(),
        path: data_path,
    };
    geoserver::coveragestore_create(api, &store).await?;

    info!("Create layer...");
    let mut coverage = CoverageSpec::grass(
        &req.layername,
        title,
        &req.workspace,
        &req.coveragestore,
        &epsg,
        format!("{}@{}", input, mapset),
    );
    if dataset == DatasetType::Strds {
        coverage = coverage
            .with_time()
            .with_dir_name(format!("{}_{}", req.coveragestore, req.layername));
    }
    geoserver::coverage_create(api, &coverage).await?;
    info!("Creation of coverage succeeded!");
    Ok(())
}

/// Options of [`style`].
#[derive(Debug)]
pub struct StyleRequest {
    pub workspace: String,
    pub layername: String,
    /// Map to take the color table from; defaults to the layer's native
    /// coverage
    pub grassmap: Option<String>,
    pub dataset_type: DatasetType,
    /// Render cells with value 0 transparent
    pub add_nodata: bool,
}

/// Publish the GRASS color table of a map as SLD and make it the layer's
/// default style.
pub async fn style(
    api: &GeoServerApiConfig,
    grass: &dyn GrassRunner,
    req: &StyleRequest,
) -> Result<()> {
    if !grass.has_module("r.colors.out_sld") {
        return Err(GrassError::ModuleMissing("r.colors.out_sld".to_owned()).into());
    }

    let mut layer = geoserver::layer_get(api, &req.workspace, &req.layername).await?;
    let map = match &req.grassmap {
        Some(map) => grass::strip_mapset(map).to_owned(),
        None => {
            info!("Find out GRASS mapname...");
            let coverage = geoserver::coverage_get(api, &layer.layer.resource.href).await?;
            coverage
                .coverage
                .native_coverage_name
                .as_deref()
                .map(|n| grass::strip_mapset(n).to_owned())
                .ok_or_else(|| GeoServerError::MissingNativeName(req.layername.clone()))?
        }
    };
    let map = match grass::resolve_dataset(grass, &map, req.dataset_type)? {
        DatasetType::Strds => grass::first_registered_map(grass, &map)?,
        _ => map,
    };

    info!("Generate SLD...");
    let sld = grass.read(&GrassCommand::new("r.colors.out_sld").param("map", &map))?;
    let sld = sld::prepare_style(&sld, req.add_nodata);

    info!("Create empty style...");
    geoserver::style_create(api, &req.workspace, &req.layername).await?;
    info!("Empty style created.");

    info!("Add content to empty style...");
    geoserver::style_put_sld(api, &req.workspace, &req.layername, sld).await?;
    info!("Added content to empty style.");

    info!("Attaching style to layer...");
    layer.layer.default_style.name = req.layername.clone();
    layer.layer.default_style.href = Some(api.style_href(&req.workspace, &req.layername));
    geoserver::layer_put(api, &req.workspace, &req.layername, &layer).await?;
    info!("Style attached.");
    Ok(())
}

/// Options of [`export`].
#[derive(Debug)]
pub struct ExportRequest {
    pub input: String,
    pub workspace: String,
    pub layername: String,
    pub title: Option<String>,
    /// Directory shared with GeoServer, as GeoServer sees the output folder.
    /// The file is uploaded when unset.
    pub geoserver_path: Option<String>,
    pub format: OutputFormat,
}

/// Export a raster map to `outputfolder` and publish it as GeoTIFF
/// coverage store and layer, both named after the layer.
pub async fn export(
    api: &GeoServerApiConfig,
    grass: &dyn GrassRunner,
    req: &ExportRequest,
    outputfolder: &Path,
) -> Result<()> {
    let input = grass::strip_mapset(&req.input);
    let title = req.title.as_deref().unwrap_or(&req.layername);
    let file_name = format!("{}.tif", req.layername);
    let tif = outputfolder.join(&file_name);

    {
        let mut cleanup = SessionCleanup::new(grass);
        cleanup.save_region(&format!("export_region_{}", std::process::id()))?;
        info!("Exporting {} to {}...", input, tif.display());
        export_geotiff(grass, input, &tif, req.format)?;
    }
    let epsg = grass::projection_epsg(grass)?;

    geoserver::workspace_create(api, &req.workspace).await?;
    let coverage = CoverageSpec::geotiff(
        &req.layername,
        title,
        &req.workspace,
        &req.layername,
        &epsg,
    );
    match &req.geoserver_path {
        Some(geoserver_path) => {
            info!("Create coveragestore...");
            let store = CoverageStoreSpec {
                name: req.layername.clone(),
                store_type: StoreType::GeoTiff,
                workspace: req.workspace.clone(),
                path: server_path(geoserver_path, &[file_name.as_str()]),
            };
            geoserver::coveragestore_create(api, &store).await?;
            info!("Create layer...");
            geoserver::coverage_create(api, &coverage).await?;
        }
        None => {
            geoserver::coveragestore_upload(
                api,
                &req.workspace,
                &req.layername,
                "geotiff",
                "image/tiff",
                &tif,
                &[("configure", "first"), ("coverageName", req.layername.as_str())],
            )
            .await?;
            geoserver::coverage_update(api, &req.layername, &coverage).await?;
        }
    }
    info!(
        "Published raster <{}> as layer {}:{}",
        input, req.workspace, req.layername
    );
    Ok(())
}

/// How the maps of a STRDS end up in GeoServer.
#[derive(Debug)]
pub enum StrdsTarget {
    /// One layer per map, named `<prefix>_<n>` (counting from 1)
    Layers { prefix: String },
    /// One time-enabled ImageMosaic layer
    Mosaic { layername: String },
}

/// Options of [`publish_strds`].
#[derive(Debug)]
pub struct StrdsPublishRequest {
    pub input: String,
    pub target: StrdsTarget,
    pub color: Option<ColorTable>,
    pub workspace: String,
    /// Directory shared with GeoServer, as seen by GeoServer
    pub datapath: Option<String>,
    /// The shared directory as seen locally; required with `datapath`
    pub outputfolder: Option<PathBuf>,
}

/// Publish all maps of a STRDS, optionally styled with a GRASS color table.
///
/// Returns the names of the published layers.
pub async fn publish_strds(
    api: &GeoServerApiConfig,
    grass: &dyn GrassRunner,
    req: &StrdsPublishRequest,
) -> Result<Vec<String>> {
    let color = req.color.filter(|c| *c != ColorTable::Default);
    let color_range = match color {
        Some(color) => Some(
            grass::color_rules(grass)?
                .remove(color.as_ref())
                .ok_or_else(|| anyhow!("Color range {} not known. Aborting...", color))?,
        ),
        None => None,
    };

    // Without a shared directory everything is uploaded, so exports may go
    // anywhere
    let temp_dir = match req.datapath {
        Some(_) => None,
        None => Some(tempfile::tempdir()?),
    };
    let outputfolder = match (&temp_dir, &req.outputfolder) {
        (Some(dir), _) => dir.path().to_owned(),
        (None, Some(folder)) => folder.clone(),
        (None, None) => bail!("An output folder is required when GEOSERVER_DATAPATH is set"),
    };

    let pid = std::process::id();
    let mut cleanup = SessionCleanup::new(grass);
    cleanup.save_region(&format!("cur_region_{}", pid))?;

    let maps = grass::registered_maps(grass, &req.input)?;
    info!("STRDS {} consists of {} maps.", req.input, maps.len());
    if maps.is_empty() {
        bail!("STRDS {} has no registered maps", req.input);
    }

    let mut published_maps = Vec::with_capacity(maps.len());
    if color_range.is_some() {
        // Stretch between the global 2% and 98% percentiles
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for map in &maps {
            grass.run(&GrassCommand::new("g.region").param("raster", &map.name))?;
            let (low, high) = grass::stretch_percentiles(grass, &map.name)?;
            min = min.min(low);
            max = max.max(high);
        }
        for map in &maps {
            let rescaled = format!("{}_255", map.name);
            cleanup.remove_raster_later(&rescaled);
            grass.run(&GrassCommand::new("g.region").param("raster", &map.name))?;
            grass.run(
                &GrassCommand::new("r.mapcalc")
                    .param("expression", rescale_expression(&map.name, &rescaled, min, max)),
            )?;
            published_maps.push(rescaled);
        }
    } else {
        published_maps.extend(maps.iter().map(|m| m.name.clone()));
    }

    let mut layernames = Vec::new();
    match &req.target {
        StrdsTarget::Layers { prefix } => {
            for (i, map) in published_maps.iter().enumerate() {
                let layername = format!("{}_{}", prefix, i + 1);
                info!("Publishing map {} as layer {}...", map, layername);
                let export_req = ExportRequest {
                    input: map.clone(),
                    workspace: req.workspace.clone(),
                    layername: layername.clone(),
                    title: None,
                    geoserver_path: req.datapath.clone(),
                    format: OutputFormat::Cog,
                };
                export(api, grass, &export_req, &outputfolder).await?;
                layernames.push(layername);
            }
        }
        StrdsTarget::Mosaic { layername } => {
            let mut target_dir = outputfolder.join("geodata").join(layername);
            if req.datapath.is_none() {
                target_dir = target_dir.join(Uuid::new_v4().to_string());
            }
            mosaic::prepare_dir(&target_dir)?;

            let progress = ProgressBar::new(maps.len() as u64);
            progress.set_style(
                ProgressStyle::default_bar()
                    .template("{msg} [{bar:40}] {pos}/{len}")
                    .progress_chars("=> "),
            );
            progress.set_message("Exporting granules");
            for (map, registered) in published_maps.iter().zip(&maps) {
                let tif = target_dir.join(mosaic::granule_file_name(map, registered.start));
                export_geotiff(grass, map, &tif, OutputFormat::Cog)?;
                progress.inc(1);
            }
            progress.finish_and_clear();
            mosaic::write_aux_files(&target_dir)?;

            let epsg = grass::projection_epsg(grass)?;
            let store = format!("{}_coverage_{}", layername, pid);
            let coverage =
                CoverageSpec::geotiff(layername, layername, &req.workspace, &store, &epsg)
                    .with_time();
            geoserver::workspace_create(api, &req.workspace).await?;

            match &req.datapath {
                Some(datapath) => {
                    info!("Creating ImageMosaic coveragestore...");
                    let store_spec = CoverageStoreSpec {
                        name: store.clone(),
                        store_type: StoreType::ImageMosaic,
                        workspace: req.workspace.clone(),
                        path: server_path(datapath, &["geodata", layername.as_str()]),
                    };
                    geoserver::coveragestore_create(api, &store_spec).await?;
                    info!("Creating ImageMosaic layer {}:{}...", req.workspace, layername);
                    geoserver::coverage_create(api, &coverage).await?;
                    info!("Creation of ImageMosaic layer succeeded!");
                }
                None => {
                    info!("Creating ImageMosaic Archive for upload...");
                    let archive = target_dir.with_extension("zip");
                    mosaic::zip_dir(&target_dir, &archive)?;
                    geoserver::coveragestore_upload(
                        api,
                        &req.workspace,
                        &store,
                        "imagemosaic",
                        "application/zip",
                        &archive,
                        &[],
                    )
                    .await?;
                    info!("Upload of ImageMosaic succeeded!");
                    info!("Updating ImageMosaic layer {}:{}...", req.workspace, store);
                    geoserver::coverage_update(api, &store, &coverage).await?;
                    info!("Updating of ImageMosaic layer succeeded!");
                }
            }
            layernames.push(layername.clone());
        }
    }

    if let (Some(color), Some(range)) = (color, color_range) {
        let reference = &published_maps[0];
        for layername in &layernames {
            info!(
                "Styling layer {} with GRASS color table {}...",
                layername, color
            );
            let mut cmd = GrassCommand::new("r.colors")
                .param("map", reference)
                .param("color", color);
            if let ColorRange::Fixed(min, max) = range {
                let (offset, scale) = color_offset_scale(min, max);
                cmd = cmd.param("offset", offset).param("scale", scale);
            }
            grass.run(&cmd)?;
            let style_req = StyleRequest {
                workspace: req.workspace.clone(),
                layername: layername.clone(),
                grassmap: Some(reference.clone()),
                dataset_type: DatasetType::Raster,
                add_nodata: false,
            };
            style(api, grass, &style_req).await?;
        }
    }

    info!(
        "Published layer/s {:?} from STRDS {}.",
        layernames, req.input
    );
    Ok(layernames)
}

/// Show the effective configuration, password masked.
pub fn print_config(settings: &GeoServerSettings) -> Result<()> {
    println!("{}", toml::to_string(&settings.masked())?);
    Ok(())
}
