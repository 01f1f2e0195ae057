//! Interact with GeoServer's REST API.
//!
//! All endpoints live below `<host>:<port>/geoserver/rest`. Request bodies are
//! JSON except for style content (SLD) and uploaded coverage files.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use byte_unit::Byte;
use futures::stream::TryStreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use reqwest::{header, Body, Response, StatusCode};
use tokio_util::codec;
use url::Url;

use crate::core::error::GeoServerError;
use crate::core::models::{CoverageDocument, CoverageSpec, CoverageStoreSpec, LayerDocument};

const SLD_CONTENT_TYPE: &str = "application/vnd.ogc.sld+xml";

/// Configuration for interacting with a GeoServer instance.
pub struct GeoServerApiConfig {
    /// `<host>:<port>/geoserver/rest`
    pub base_url: Url,
    /// HTTP client, authenticating every request
    pub client: reqwest::Client,
}

impl GeoServerApiConfig {
    /// Configure HTTP client with basic auth, user-agent, and headers.
    pub fn new_with_params(
        host: &str,
        port: u16,
        user: &str,
        password: &str,
        timeout: u64,
    ) -> Result<Self> {
        let base_url = Url::parse(&format!(
            "{}:{}/geoserver/rest",
            host.trim_end_matches('/'),
            port
        ))
        .with_context(|| format!("GeoServer host must include the URI scheme: {}", host))?;
        if base_url.cannot_be_a_base() || base_url.host().is_none() {
            bail!("GeoServer host must include the URI scheme: {}", host);
        }

        let user_agent = format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        let mut auth = header::HeaderValue::from_str(&format!(
            "Basic {}",
            base64::encode(format!("{}:{}", user, password))
        ))?;
        auth.set_sensitive(true);
        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent(user_agent)
                .default_headers(headers)
                .timeout(Duration::from_secs(timeout))
                .build()?,
            base_url,
        })
    }

    pub fn new(host: &str, port: u16, user: &str, password: &str) -> Result<Self> {
        let timeout = 30;
        Self::new_with_params(host, port, user, password, timeout)
    }

    /// Endpoint below the REST root; segments are percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Link to a style as GeoServer reports it in layer documents.
    pub fn style_href(&self, workspace: &str, style: &str) -> String {
        self.endpoint(&["workspaces", workspace, "styles", &format!("{}.json", style)])
            .to_string()
    }
}

/// Outcome of creating a workspace.
#[derive(Debug, PartialEq)]
pub enum WorkspaceStatus {
    Created,
    AlreadyExists,
}

/// Turns any status but `expected` into a [`GeoServerError`].
async fn expect_status(
    response: Response,
    expected: StatusCode,
    action: &'static str,
) -> Result<()> {
    let status = response.status();
    debug!("status: {}", status);
    let content = response.text().await?;
    debug!("content: {}", content);
    if status != expected {
        return Err(GeoServerError::UnexpectedStatus {
            action,
            status,
            body: content,
        }
        .into());
    }
    Ok(())
}

/// Create a workspace unless it exists.
///
/// GeoServer answers 401 (older releases) or 409 for existing workspaces;
/// both count as success.
///
/// # Errors
///
/// Returns an error for any other non-201 response or if the server is
/// unreachable.
pub async fn workspace_create(
    configuration: &GeoServerApiConfig,
    workspace: &str,
) -> Result<WorkspaceStatus> {
    info!("Create workspace if not exists...");
    let api_url = configuration.endpoint(&["workspaces"]);
    let req_body = serde_json::json!({"workspace": {"name": workspace}});
    let response = configuration
        .client
        .post(api_url)
        .json(&req_body)
        .send()
        .await?;

    match response.status() {
        StatusCode::CREATED => {
            info!("Workspace did not exist and was created.");
            Ok(WorkspaceStatus::Created)
        }
        StatusCode::UNAUTHORIZED | StatusCode::CONFLICT => {
            info!("Workspace already exists");
            Ok(WorkspaceStatus::AlreadyExists)
        }
        status => Err(GeoServerError::UnexpectedStatus {
            action: "Creation of workspace",
            status,
            body: response.text().await?,
        }
        .into()),
    }
}

/// Create a coverage store pointing at a path GeoServer can read.
pub async fn coveragestore_create(
    configuration: &GeoServerApiConfig,
    store: &CoverageStoreSpec,
) -> Result<()> {
    debug!("building coveragestore post request for: {:?}", store);
    let api_url = configuration.endpoint(&["workspaces", &store.workspace, "coveragestores"]);
    let response = configuration
        .client
        .post(api_url)
        .json(&store.to_json())
        .send()
        .await?;
    expect_status(response, StatusCode::CREATED, "Creation of coveragestore").await
}

/// Create a coverage (and its layer) in an existing coverage store.
pub async fn coverage_create(
    configuration: &GeoServerApiConfig,
    coverage: &CoverageSpec,
) -> Result<()> {
    debug!("building coverage post request for: {:?}", coverage);
    let api_url = configuration.endpoint(&[
        "workspaces",
        &coverage.workspace,
        "coveragestores",
        &coverage.store,
        "coverages",
    ]);
    let response = configuration
        .client
        .post(api_url)
        .json(&coverage.to_json())
        .send()
        .await?;
    expect_status(response, StatusCode::CREATED, "Creation of coverage").await
}

/// Replace the configuration of coverage `existing` (e.g. one auto-configured
/// by an upload) with `coverage`.
pub async fn coverage_update(
    configuration: &GeoServerApiConfig,
    existing: &str,
    coverage: &CoverageSpec,
) -> Result<()> {
    debug!("building coverage put request for {}: {:?}", existing, coverage);
    let api_url = configuration.endpoint(&[
        "workspaces",
        &coverage.workspace,
        "coveragestores",
        &coverage.store,
        "coverages",
        existing,
    ]);
    let response = configuration
        .client
        .put(api_url)
        .json(&coverage.to_json())
        .send()
        .await?;
    expect_status(response, StatusCode::OK, "Updating of coverage").await
}

/// Upload a file to a coverage store, creating the store if needed.
///
/// `extension` selects how GeoServer reads the upload, e.g. `imagemosaic`
/// for a zipped mosaic or `geotiff` for a single file. The file is streamed
/// from disk.
pub async fn coveragestore_upload(
    configuration: &GeoServerApiConfig,
    workspace: &str,
    store: &str,
    extension: &str,
    content_type: &'static str,
    path: &Path,
    query: &[(&str, &str)],
) -> Result<()> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Could not open {} for upload", path.display()))?;
    let filesize = file.metadata().await?.len();
    info!(
        "Uploading {} ({})...",
        path.display(),
        Byte::from_bytes(filesize as u128).get_appropriate_unit(false)
    );

    let progress = ProgressBar::new(filesize);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40}] {bytes}/{total_bytes}")
            .progress_chars("=> "),
    );
    progress.set_message("Uploading");
    let progress_inc = progress.clone();
    let stream = codec::FramedRead::new(file, codec::BytesCodec::new())
        .inspect_ok(move |chunk| progress_inc.inc(chunk.len() as u64));

    let api_url = configuration.endpoint(&[
        "workspaces",
        workspace,
        "coveragestores",
        store,
        &format!("file.{}", extension),
    ]);
    let response = configuration
        .client
        .put(api_url)
        .query(query)
        .header(header::CONTENT_TYPE, content_type)
        // Required when body is a stream
        .header(header::CONTENT_LENGTH, filesize)
        .body(Body::wrap_stream(stream))
        .send()
        .await;
    progress.finish_and_clear();
    expect_status(response?, StatusCode::CREATED, "Upload of coverage file").await
}

/// Get a layer document.
///
/// # Errors
///
/// Returns an error if the layer does not exist (non-200 response) or the
/// returned data is malformed.
pub async fn layer_get(
    configuration: &GeoServerApiConfig,
    workspace: &str,
    layer: &str,
) -> Result<LayerDocument> {
    let api_url = configuration.endpoint(&["workspaces", workspace, "layers", layer]);
    let response = configuration.client.get(api_url).send().await?;
    response.error_for_status_ref()?;

    let content = response.text().await?;
    debug!("content: {}", content);
    let layer: LayerDocument = serde_json::from_str(&content)
        .with_context(|| format!("JSON from Layers API was malformed: {}", &content))?;
    Ok(layer)
}

/// Get the coverage a layer publishes, following the layer's resource href.
pub async fn coverage_get(
    configuration: &GeoServerApiConfig,
    href: &str,
) -> Result<CoverageDocument> {
    let response = configuration.client.get(href).send().await?;
    response.error_for_status_ref()?;

    let content = response.text().await?;
    debug!("content: {}", content);
    let coverage: CoverageDocument = serde_json::from_str(&content)
        .with_context(|| format!("JSON from Coverages API was malformed: {}", &content))?;
    Ok(coverage)
}

/// Replace a layer document.
pub async fn layer_put(
    configuration: &GeoServerApiConfig,
    workspace: &str,
    name: &str,
    layer: &LayerDocument,
) -> Result<()> {
    let api_url = configuration.endpoint(&["workspaces", workspace, "layers", name]);
    let response = configuration
        .client
        .put(api_url)
        .json(layer)
        .send()
        .await?;
    expect_status(response, StatusCode::OK, "Attaching of style").await
}

/// Create an empty style, to be filled with [`style_put_sld`].
pub async fn style_create(
    configuration: &GeoServerApiConfig,
    workspace: &str,
    style: &str,
) -> Result<()> {
    let api_url = configuration.endpoint(&["workspaces", workspace, "styles"]);
    let req_body = serde_json::json!({
        "style": {"name": style, "filename": format!("{}.sld", style)}
    });
    let response = configuration
        .client
        .post(api_url)
        .json(&req_body)
        .send()
        .await?;
    expect_status(response, StatusCode::CREATED, "Creation of style").await
}

/// Set the SLD content of a style.
pub async fn style_put_sld(
    configuration: &GeoServerApiConfig,
    workspace: &str,
    style: &str,
    sld: String,
) -> Result<()> {
    let api_url = configuration.endpoint(&["workspaces", workspace, "styles", style]);
    let response = configuration
        .client
        .put(api_url)
        .header(header::CONTENT_TYPE, SLD_CONTENT_TYPE)
        .body(sld)
        .send()
        .await?;
    expect_status(response, StatusCode::OK, "Adding content to empty style").await
}

#[cfg(test)]
mod tests {
    use httpmock::{
        Method::{GET, POST, PUT},
        MockServer,
    };
    use serde_json::json;

    use super::*;
    use crate::core::models::StoreType;

    // admin:geoserver
    const AUTH: &str = "Basic YWRtaW46Z2Vvc2VydmVy";

    fn test_config(server: &MockServer, timeout: u64) -> GeoServerApiConfig {
        GeoServerApiConfig::new_with_params(
            "http://127.0.0.1",
            server.port(),
            "admin",
            "geoserver",
            timeout,
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let config = GeoServerApiConfig::new("http://localhost/", 8080, "a", "b").unwrap();
        assert_eq!(
            config.endpoint(&["workspaces", "my ws", "layers"]).as_str(),
            "http://localhost:8080/geoserver/rest/workspaces/my%20ws/layers"
        );
        assert_eq!(
            config.style_href("ws", "elev"),
            "http://localhost:8080/geoserver/rest/workspaces/ws/styles/elev.json"
        );
    }

    #[test]
    fn test_host_without_scheme() {
        for host in ["localhost", "geoserver.example.org"] {
            let error = GeoServerApiConfig::new(host, 8080, "a", "b")
                .err()
                .expect("Expected error for host without scheme");
            assert_eq!(
                error.to_string(),
                format!("GeoServer host must include the URI scheme: {}", host)
            );
        }
    }

    #[tokio::test]
    async fn test_workspace_create_created() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/geoserver/rest/workspaces")
                .header("Authorization", AUTH)
                .header("content-type", "application/json")
                .json_body(json!({"workspace": {"name": "grass"}}));
            then.status(201).body("grass");
        });

        let status = workspace_create(&test_config(&server, 10), "grass")
            .await
            .unwrap();

        mock.assert();
        assert_eq!(status, WorkspaceStatus::Created);
    }

    #[tokio::test]
    async fn test_workspace_create_existing() {
        for code in [401, 409] {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST).path("/geoserver/rest/workspaces");
                then.status(code)
                    .body("Workspace 'grass' already exists");
            });

            let status = workspace_create(&test_config(&server, 10), "grass")
                .await
                .unwrap();

            mock.assert();
            assert_eq!(status, WorkspaceStatus::AlreadyExists);
        }
    }

    #[tokio::test]
    async fn test_workspace_create_failure() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/geoserver/rest/workspaces");
            then.status(500).body("boom");
        });

        let result = workspace_create(&test_config(&server, 10), "grass")
            .await
            .expect_err("Expected status error");

        mock.assert();
        match result.downcast_ref::<GeoServerError>() {
            Some(GeoServerError::UnexpectedStatus { status, body, .. }) => {
                assert_eq!(*status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "boom");
            }
            e => panic!("Unexpected error: {:?}", e),
        }
        assert!(result.to_string().starts_with("Creation of workspace failed!"));
    }

    #[tokio::test]
    async fn test_coveragestore_create() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/geoserver/rest/workspaces/ws/coveragestores")
                .header("Authorization", AUTH)
                .json_body(json!({
                    "coverageStore": {
                        "name": "cs",
                        "type": "ImageMosaic",
                        "enabled": true,
                        "workspace": {"name": "ws"},
                        "url": "file:/data/geodata/lst",
                    }
                }));
            then.status(201).body("cs");
        });
        let store = CoverageStoreSpec {
            name: "cs".to_owned(),
            store_type: StoreType::ImageMosaic,
            workspace: "ws".to_owned(),
            path: "/data/geodata/lst".to_owned(),
        };

        coveragestore_create(&test_config(&server, 10), &store)
            .await
            .unwrap();

        mock.assert();
    }

    #[tokio::test]
    async fn test_coverage_create_failure_reports_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/geoserver/rest/workspaces/ws/coveragestores/cs/coverages");
            then.status(500)
                .body("Could not read coverage elevation@PERMANENT");
        });
        let coverage = CoverageSpec::grass(
            "elev",
            "elev",
            "ws",
            "cs",
            "3358",
            "elevation@PERMANENT".to_owned(),
        );

        let result = coverage_create(&test_config(&server, 10), &coverage)
            .await
            .expect_err("Expected status error");

        mock.assert();
        assert!(result
            .to_string()
            .contains("<500 Internal Server Error> \n <Could not read coverage elevation@PERMANENT>"));
    }

    #[tokio::test]
    async fn test_coveragestore_upload() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("lst.zip");
        std::fs::write(&archive, b"PK-zip-bytes").unwrap();
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PUT)
                .path("/geoserver/rest/workspaces/ws/coveragestores/lst_cov/file.imagemosaic")
                .query_param("configure", "all")
                .header("content-type", "application/zip")
                .header("content-length", "12")
                .body("PK-zip-bytes");
            then.status(201);
        });

        coveragestore_upload(
            &test_config(&server, 10),
            "ws",
            "lst_cov",
            "imagemosaic",
            "application/zip",
            &archive,
            &[("configure", "all")],
        )
        .await
        .unwrap();

        mock.assert();
    }

    #[tokio::test]
    async fn test_coveragestore_upload_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PUT);
            then.status(201);
        });

        let result = coveragestore_upload(
            &test_config(&server, 10),
            "ws",
            "lst_cov",
            "imagemosaic",
            "application/zip",
            &dir.path().join("missing.zip"),
            &[],
        )
        .await
        .expect_err("Expected missing file error");

        mock.assert_hits(0);
        assert!(result.to_string().starts_with("Could not open"));
    }

    #[tokio::test]
    async fn test_layer_get_and_coverage_get() {
        let server = MockServer::start();
        let coverage_href = server.url("/geoserver/rest/workspaces/ws/coveragestores/cs/coverages/elev.json");
        let layer_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/geoserver/rest/workspaces/ws/layers/elev")
                .header("Authorization", AUTH);
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!({
                    "layer": {
                        "name": "elev",
                        "type": "RASTER",
                        "defaultStyle": {"name": "raster"},
                        "resource": {"@class": "coverage", "name": "ws:elev", "href": coverage_href},
                    }
                }));
        });
        let coverage_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/geoserver/rest/workspaces/ws/coveragestores/cs/coverages/elev.json");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!({
                    "coverage": {"name": "elev", "nativeCoverageName": "elevation@PERMANENT"}
                }));
        });

        let config = test_config(&server, 10);
        let layer = layer_get(&config, "ws", "elev").await.unwrap();
        let coverage = coverage_get(&config, &layer.layer.resource.href)
            .await
            .unwrap();

        layer_mock.assert();
        coverage_mock.assert();
        assert_eq!(layer.layer.default_style.name, "raster");
        assert_eq!(
            coverage.coverage.native_coverage_name.as_deref(),
            Some("elevation@PERMANENT")
        );
    }

    #[tokio::test]
    async fn test_layer_get_malformed_json() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/geoserver/rest/workspaces/ws/layers/elev");
            then.status(200).body("this isn't actually json");
        });

        let result = layer_get(&test_config(&server, 10), "ws", "elev")
            .await
            .expect_err("Expected json parsing error");
        let downcast = result.downcast_ref::<serde_json::Error>().unwrap();

        mock.assert();
        assert_eq!(downcast.classify(), serde_json::error::Category::Syntax);
        assert!(result
            .to_string()
            .contains("JSON from Layers API was malformed: this isn't actually json"));
    }

    #[tokio::test]
    async fn test_layer_get_404_response() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/geoserver/rest/workspaces/ws/layers/missing");
            then.status(404).body("No such layer: missing");
        });

        let result = layer_get(&test_config(&server, 10), "ws", "missing")
            .await
            .expect_err("Expected status code error");
        let downcast = result.downcast_ref::<reqwest::Error>().unwrap();

        mock.assert();
        assert_eq!(downcast.status().unwrap(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_style_create_and_put_sld() {
        let server = MockServer::start();
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/geoserver/rest/workspaces/ws/styles")
                .json_body(json!({"style": {"name": "elev", "filename": "elev.sld"}}));
            then.status(201);
        });
        let content = server.mock(|when, then| {
            when.method(PUT)
                .path("/geoserver/rest/workspaces/ws/styles/elev")
                .header("content-type", "application/vnd.ogc.sld+xml")
                .body_contains("<ColorMap>");
            then.status(200);
        });

        let config = test_config(&server, 10);
        style_create(&config, "ws", "elev").await.unwrap();
        style_put_sld(&config, "ws", "elev", "<ColorMap>\n</ColorMap>".to_owned())
            .await
            .unwrap();

        create.assert();
        content.assert();
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/geoserver/rest/workspaces");
            then.status(201)
                .delay(Duration::from_millis(1200))
                .body("Should never see this due to timeout");
        });

        let result = workspace_create(&test_config(&server, 1), "grass")
            .await
            .expect_err("Expected timeout error");
        let downcast = result.downcast_ref::<reqwest::Error>().unwrap();

        mock.assert();
        assert!(downcast.is_timeout());
    }
}
