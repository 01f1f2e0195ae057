// Copyright (c) 2021 Tangram Robotics Inc. - All Rights Reserved
// Unauthorized copying of this file, via any medium is strictly prohibited
// Proprietary and confidential
// ----------------------------

use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use clap::builder::PossibleValuesParser;
use clap::{crate_description, crate_version, Arg, ArgAction, ArgGroup, ArgMatches, Command};
use strum::VariantNames;

use crate::app_config::{
    ColorTable, DatasetType, GeoServerSettings, OutputFormat, OVERRIDABLE_KEYS,
};
use crate::core::api::geoserver::GeoServerApiConfig;
use crate::core::commands;
use crate::core::grass::GrassCli;

/// Required argument of a subcommand.
fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing argument --{}", name))
}

fn optional(matches: &ArgMatches, name: &str) -> Option<String> {
    matches.get_one::<String>(name).cloned()
}

fn dataset_type(matches: &ArgMatches) -> Result<DatasetType> {
    Ok(DatasetType::from_str(required(matches, "type")?)?)
}

/// `(key, value)` pairs of the global options, for overriding config values.
pub fn config_overrides(cli_matches: &ArgMatches) -> Vec<(&'static str, Option<String>)> {
    OVERRIDABLE_KEYS
        .iter()
        .map(|key| (*key, optional(cli_matches, key)))
        .collect()
}

/// Match commands
pub fn cli_match(config: config::Config, cli_matches: ArgMatches) -> Result<()> {
    let settings = GeoServerSettings::from_config(config)?;

    // Printing the config needs no GeoServer, and is helpful for debugging bad config!
    if let Some(("config", _config_matches)) = cli_matches.subcommand() {
        return commands::print_config(&settings);
    }

    let api_config = GeoServerApiConfig::new_with_params(
        &settings.host,
        settings.port,
        &settings.user,
        &settings.password,
        settings.timeout,
    )?;
    let grass = GrassCli;
    let runtime = tokio::runtime::Runtime::new()?;

    match cli_matches.subcommand() {
        Some(("publish", publish_matches)) => {
            let req = commands::PublishRequest {
                input: required(publish_matches, "input")?.to_owned(),
                workspace: settings.workspace()?.to_owned(),
                coveragestore: required(publish_matches, "coveragestore")?.to_owned(),
                layername: required(publish_matches, "layername")?.to_owned(),
                title: optional(publish_matches, "title"),
                gs_file_path: required(publish_matches, "gs_file_path")?.to_owned(),
                dataset_type: dataset_type(publish_matches)?,
            };
            runtime.block_on(commands::publish(&api_config, &grass, &req))?;
        }
        Some(("style", style_matches)) => {
            let req = commands::StyleRequest {
                workspace: settings.workspace()?.to_owned(),
                layername: required(style_matches, "layername")?.to_owned(),
                grassmap: optional(style_matches, "grassmap"),
                dataset_type: dataset_type(style_matches)?,
                add_nodata: !style_matches.get_flag("no_nodata"),
            };
            runtime.block_on(commands::style(&api_config, &grass, &req))?;
        }
        Some(("export", export_matches)) => {
            let geoserver_path =
                optional(export_matches, "geoserver_path").or_else(|| settings.datapath.clone());
            let temp_dir;
            let outputfolder = match (&settings.outputfolder, &geoserver_path) {
                (Some(folder), _) => folder.clone(),
                (None, None) => {
                    temp_dir = tempfile::tempdir()?;
                    temp_dir.path().to_owned()
                }
                (None, Some(_)) => bail!(
                    "--geoserver-path needs the same directory as local --outputfolder"
                ),
            };
            let req = commands::ExportRequest {
                input: required(export_matches, "input")?.to_owned(),
                workspace: settings.workspace()?.to_owned(),
                layername: required(export_matches, "layername")?.to_owned(),
                title: optional(export_matches, "title"),
                geoserver_path,
                format: OutputFormat::from_str(required(export_matches, "outputformat")?)?,
            };
            runtime.block_on(commands::export(&api_config, &grass, &req, &outputfolder))?;
        }
        Some(("publish-strds", strds_matches)) => {
            let target = match (
                optional(strds_matches, "layername_prefix"),
                optional(strds_matches, "mosaic_layername"),
            ) {
                (Some(prefix), None) => commands::StrdsTarget::Layers { prefix },
                (None, Some(layername)) => commands::StrdsTarget::Mosaic { layername },
                // Enforced by the argument group
                _ => bail!("Use exactly one of --layername-prefix and --mosaic-layername"),
            };
            let color = strds_matches
                .get_one::<String>("color")
                .map(|c| ColorTable::from_str(c))
                .transpose()?;
            let req = commands::StrdsPublishRequest {
                input: required(strds_matches, "input")?.to_owned(),
                target,
                color,
                workspace: settings.workspace()?.to_owned(),
                datapath: settings.datapath.clone(),
                outputfolder: settings.outputfolder.clone(),
            };
            runtime.block_on(commands::publish_strds(&api_config, &grass, &req))?;
        }
        _ => {
            // Arguments are required by default (in Clap).
            // This section should never execute.
            unreachable!("No matching subcommand!");
        }
    }
    Ok(())
}

fn global_arg(name: &'static str, value_name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_name(value_name)
        .help(help)
        .global(true)
}

fn type_arg() -> Arg {
    Arg::new("type")
        .short('t')
        .long("type")
        .value_name("TYPE")
        .help("Type of the input")
        .default_value(<&'static str>::from(DatasetType::default()))
        .value_parser(PossibleValuesParser::new(DatasetType::VARIANTS.iter().copied()))
}

fn input_arg(help: &'static str) -> Arg {
    Arg::new("input")
        .short('i')
        .long("input")
        .value_name("NAME")
        .help(help)
        .required(true)
}

fn layername_arg(help: &'static str) -> Arg {
    Arg::new("layername")
        .short('l')
        .long("layername")
        .value_name("LAYER")
        .help(help)
        .required(true)
}

/// Configure Clap
/// This function will configure clap and build the command tree
pub fn cli_command() -> Command {
    Command::new("grass-geoserver")
        .arg_required_else_help(true)
        .subcommand_required(true)
        .version(crate_version!())
        .about(crate_description!())
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Set a custom config file")
                .global(true),
        )
        .arg(global_arg("host", "URL", "GeoServer host with URI scheme, e.g. http://localhost"))
        .arg(global_arg("port", "PORT", "GeoServer port"))
        .arg(global_arg("user", "USER", "GeoServer admin user"))
        .arg(global_arg("password", "PASSWORD", "GeoServer admin password"))
        .arg(global_arg("workspace", "WORKSPACE", "GeoServer workspace"))
        .arg(global_arg(
            "datapath",
            "PATH",
            "Directory shared with GeoServer, as GeoServer sees it",
        ))
        .arg(global_arg(
            "outputfolder",
            "PATH",
            "Local directory exported files are written to",
        ))
        .arg(global_arg("timeout", "SECONDS", "HTTP request timeout"))
        .subcommand(
            Command::new("publish")
                .about("Publish a raster map or STRDS through the GeoServer GRASS datastore")
                .arg(input_arg("Raster map or STRDS to publish"))
                .arg(
                    Arg::new("coveragestore")
                        .long("coveragestore")
                        .value_name("STORE")
                        .help("Name of the coverage store to create")
                        .required(true),
                )
                .arg(layername_arg("Name of the layer to create"))
                .arg(
                    Arg::new("title")
                        .long("title")
                        .value_name("TITLE")
                        .help("Layer title, defaults to the layer name"),
                )
                .arg(
                    Arg::new("gs_file_path")
                        .long("gs-file-path")
                        .value_name("PATH")
                        .help("Current mapset as seen by GeoServer: .../<location>/<mapset>")
                        .required(true),
                )
                .arg(type_arg()),
        )
        .subcommand(
            Command::new("style")
                .about("Attach the GRASS color table of a map to a layer as SLD style")
                .arg(layername_arg("Layer to style"))
                .arg(
                    Arg::new("grassmap")
                        .short('g')
                        .long("grassmap")
                        .value_name("NAME")
                        .help("Map to take colors from, defaults to the layer's GRASS map"),
                )
                .arg(type_arg())
                .arg(
                    Arg::new("no_nodata")
                        .short('n')
                        .help("Do not render cells with value 0 transparent")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("export")
                .about("Export a raster map as GeoTIFF and publish it")
                .arg(input_arg("Raster map to export"))
                .arg(layername_arg("Name of the coverage store and layer to create"))
                .arg(
                    Arg::new("title")
                        .long("title")
                        .value_name("TITLE")
                        .help("Layer title, defaults to the layer name"),
                )
                .arg(
                    Arg::new("geoserver_path")
                        .long("geoserver-path")
                        .value_name("PATH")
                        .help("The output folder as seen by GeoServer; the file is uploaded if unset"),
                )
                .arg(
                    Arg::new("outputformat")
                        .long("outputformat")
                        .value_name("FORMAT")
                        .default_value(<&'static str>::from(OutputFormat::default()))
                        .value_parser(PossibleValuesParser::new(
                            OutputFormat::VARIANTS.iter().copied(),
                        )),
                ),
        )
        .subcommand(
            Command::new("publish-strds")
                .about("Publish all maps of a STRDS as layers or as one ImageMosaic layer")
                .arg(input_arg("STRDS to publish"))
                .arg(
                    Arg::new("layername_prefix")
                        .long("layername-prefix")
                        .value_name("PREFIX")
                        .help("Publish each map as layer <PREFIX>_<n>"),
                )
                .arg(
                    Arg::new("mosaic_layername")
                        .long("mosaic-layername")
                        .value_name("LAYER")
                        .help("Publish all maps as one time-enabled ImageMosaic layer"),
                )
                .group(
                    ArgGroup::new("target")
                        .args(["layername_prefix", "mosaic_layername"])
                        .required(true),
                )
                .arg(
                    Arg::new("color")
                        .long("color")
                        .value_name("COLOR")
                        .help("GRASS color table to style the layers with")
                        .value_parser(PossibleValuesParser::new(
                            ColorTable::VARIANTS.iter().copied(),
                        )),
                ),
        )
        .subcommand(Command::new("config").about("Show Configuration"))
}

/// Parse the process arguments.
pub fn cli_config() -> Result<ArgMatches> {
    let cli_matches = cli_command().get_matches();

    Ok(cli_matches)
}
