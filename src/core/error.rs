// Copyright (c) 2021 Tangram Robotics Inc. - All Rights Reserved
// Unauthorized copying of this file, via any medium is strictly prohibited
// Proprietary and confidential
// ----------------------------

use reqwest::StatusCode;
use thiserror::Error;

/// Failures reported by GeoServer itself (as opposed to transport errors,
/// which surface as [`reqwest::Error`]).
#[derive(Debug, Error)]
pub enum GeoServerError {
    #[error("{action} failed! \n <{status}> \n <{body}>")]
    UnexpectedStatus {
        action: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("Layer <{0}> has no native GRASS coverage name, pass --grassmap")]
    MissingNativeName(String),
}

/// Failures while talking to the GRASS GIS session.
#[derive(Debug, Error)]
pub enum GrassError {
    #[error("There is both a strds and a raster with name <{0}>")]
    AmbiguousDataset(String),
    #[error("Input <{0}> does not exist")]
    DatasetNotFound(String),
    #[error("The <gs_file_path> contains a location which is not the current location")]
    LocationMismatch,
    #[error("{module} failed with {status}: {stderr}")]
    ModuleFailed {
        module: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error(
        "The '{0}' module was not found, install it first:\n g.extension {0}"
    )]
    ModuleMissing(String),
}
