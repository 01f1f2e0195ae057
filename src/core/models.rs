// Copyright (c) 2021 Tangram Robotics Inc. - All Rights Reserved
// Unauthorized copying of this file, via any medium is strictly prohibited
// Proprietary and confidential
// ----------------------------

//! Serialization to/from GeoServer's REST API.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use strum_macros::{AsRefStr, Display};

/// Coverage store types we create.
#[derive(AsRefStr, Display, Clone, Copy, Debug, PartialEq)]
pub enum StoreType {
    /// Backed by the geoserver-grass-raster-datastore plugin.
    #[strum(serialize = "GRASS")]
    Grass,
    #[strum(serialize = "ImageMosaic")]
    ImageMosaic,
    #[strum(serialize = "GeoTIFF")]
    GeoTiff,
}

/// A coverage store to be created from a file path GeoServer can read.
#[derive(Clone, Debug, PartialEq)]
pub struct CoverageStoreSpec {
    pub name: String,
    pub store_type: StoreType,
    pub workspace: String,
    /// Path as seen by GeoServer (without the `file:` scheme).
    pub path: String,
}

impl CoverageStoreSpec {
    pub fn to_json(&self) -> Value {
        json!({
            "coverageStore": {
                "name": self.name,
                "type": self.store_type.as_ref(),
                "enabled": true,
                "workspace": {"name": self.workspace},
                "url": format!("file:{}", self.path),
            }
        })
    }
}

/// A coverage (and with it a layer) to be created in a coverage store.
#[derive(Clone, Debug, PartialEq)]
pub struct CoverageSpec {
    pub name: String,
    pub title: String,
    pub workspace: String,
    pub store: String,
    pub epsg: String,
    pub description: String,
    pub keywords: Vec<String>,
    /// `map@mapset` for coverages served by the GRASS datastore.
    pub native_coverage_name: Option<String>,
    /// Native format and name of exported (GeoTIFF) coverages.
    pub native_format: Option<String>,
    /// Enables the time dimension (STRDS and ImageMosaic).
    pub time_enabled: bool,
    /// `dirName` metadata entry of the GRASS datastore.
    pub dir_name: Option<String>,
}

impl CoverageSpec {
    /// Coverage read by the GRASS datastore plugin.
    pub fn grass(
        name: &str,
        title: &str,
        workspace: &str,
        store: &str,
        epsg: &str,
        native_coverage_name: String,
    ) -> Self {
        Self {
            name: name.to_owned(),
            title: title.to_owned(),
            workspace: workspace.to_owned(),
            store: store.to_owned(),
            epsg: epsg.to_owned(),
            description: "Generated from GRASS GIS".to_owned(),
            keywords: vec!["WCS".to_owned(), title.to_owned()],
            native_coverage_name: Some(native_coverage_name),
            native_format: None,
            time_enabled: false,
            dir_name: None,
        }
    }

    /// Coverage read from an exported GeoTIFF file or an ImageMosaic of them.
    pub fn geotiff(name: &str, title: &str, workspace: &str, store: &str, epsg: &str) -> Self {
        Self {
            name: name.to_owned(),
            title: title.to_owned(),
            workspace: workspace.to_owned(),
            store: store.to_owned(),
            epsg: epsg.to_owned(),
            description: "Generated from GRASS GIS".to_owned(),
            keywords: vec!["WMS".to_owned(), name.to_owned()],
            native_coverage_name: None,
            native_format: Some("GeoTIFF".to_owned()),
            time_enabled: false,
            dir_name: None,
        }
    }

    /// Enable the time dimension, as used for STRDS and ImageMosaic layers.
    pub fn with_time(mut self) -> Self {
        self.time_enabled = true;
        self
    }

    pub fn with_dir_name(mut self, dir_name: String) -> Self {
        self.dir_name = Some(dir_name);
        self
    }

    fn metadata(&self) -> Value {
        let mut entries = Vec::new();
        if self.time_enabled {
            entries.push(json!({"@key": "elevation", "dimensionInfo": {"enabled": false}}));
            entries.push(json!({
                "@key": "time",
                "dimensionInfo": {
                    "enabled": true,
                    "presentation": "LIST",
                    "units": "ISO8601",
                    "defaultValue": {
                        "strategy": "NEAREST",
                        "referenceValue": "CURRENT",
                    },
                    "nearestMatchEnabled": false,
                },
            }));
        }
        if let Some(dir_name) = &self.dir_name {
            entries.push(json!({"@key": "dirName", "$": dir_name}));
        }
        if entries.is_empty() {
            json!({})
        } else {
            json!({ "entry": entries })
        }
    }

    pub fn to_json(&self) -> Value {
        let srs = format!("EPSG:{}", self.epsg);
        let mut coverage = json!({
            "description": self.description,
            "enabled": true,
            "keywords": {"string": self.keywords},
            "name": self.name,
            "namespace": {"name": self.workspace},
            "metadata": self.metadata(),
            "srs": srs,
            "store": {
                "@class": "coverageStore",
                "name": format!("{}:{}", self.workspace, self.store),
            },
            "title": self.title,
        });
        if let Some(obj) = coverage.as_object_mut() {
            if let Some(native) = &self.native_coverage_name {
                obj.insert("nativeCoverageName".to_owned(), json!(native));
            }
            if let Some(format) = &self.native_format {
                obj.insert("nativeFormat".to_owned(), json!(format));
                obj.insert("nativeName".to_owned(), json!(self.name));
                obj.insert(
                    "defaultInterpolationMethod".to_owned(),
                    json!("nearest neighbor"),
                );
                obj.insert("requestSRS".to_owned(), json!({ "string": [srs] }));
                obj.insert("responseSRS".to_owned(), json!({ "string": [srs] }));
            }
        }
        json!({ "coverage": coverage })
    }
}

/// A style referenced by a layer.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct StyleRef {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// The resource (coverage) published by a layer.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ResourceRef {
    pub name: String,
    pub href: String,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Layer document as returned by `GET workspaces/<ws>/layers/<layer>`.
///
/// Unknown fields are kept so the document can be sent back unchanged apart
/// from the default style.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct LayerDocument {
    pub layer: Layer,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Layer {
    pub name: String,
    #[serde(rename = "defaultStyle", default)]
    pub default_style: StyleRef,
    pub resource: ResourceRef,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Coverage document as returned by GeoServer.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CoverageDocument {
    pub coverage: Coverage,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Coverage {
    pub name: String,
    #[serde(rename = "nativeCoverageName")]
    pub native_coverage_name: Option<String>,
}
