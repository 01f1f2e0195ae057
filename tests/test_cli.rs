// Copyright (c) 2021 Tangram Robotics Inc. - All Rights Reserved
// Unauthorized copying of this file, via any medium is strictly prohibited
// Proprietary and confidential
// ----------------------------

#[cfg(test)]
extern crate assert_cmd;

use assert_cmd::prelude::*;
use predicates::prelude::*;

use std::fs;
use std::process::Command;

fn grass_geoserver() -> Command {
    let mut cmd = Command::cargo_bin("grass-geoserver").expect("Calling binary failed");
    for key in ["HOST", "PORT", "USER", "PASSWORD", "WORKSPACE", "DATAPATH", "OUTPUTFOLDER"] {
        cmd.env_remove(format!("GEOSERVER_{}", key));
    }
    cmd
}

#[test]
fn test_cli() {
    grass_geoserver().assert().failure();
}

#[test]
fn test_help() {
    grass_geoserver()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("publish-strds"));
}

#[test]
fn test_publish_requires_gs_file_path() {
    grass_geoserver()
        .args(&["publish", "-i", "elevation", "--coveragestore", "cs", "-l", "elev"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--gs-file-path"));
}

#[test]
fn test_missing_config_file() {
    grass_geoserver()
        .args(&["--config", "/nonexistent/grass-geoserver.toml", "config"])
        .assert()
        .failure();
}

#[test]
fn test_config_with_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(
        &config,
        "host = \"http://localhost\"\nport = 8080\nuser = \"admin\"\npassword = \"geoserver\"\n",
    )
    .unwrap();

    grass_geoserver()
        .env("GEOSERVER_WORKSPACE", "from_env")
        .arg("--config")
        .arg(&config)
        .args(&["config", "--port", "9090"])
        .assert()
        .success()
        .stdout(predicate::str::contains("port = 9090"))
        .stdout(predicate::str::contains("workspace = \"from_env\""))
        .stdout(predicate::str::contains("password = \"********\""));
}

#[test]
fn test_config_empty_datapath_is_unset() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(
        &config,
        "host = \"http://localhost\"\nport = 8080\nuser = \"admin\"\npassword = \"geoserver\"\n",
    )
    .unwrap();

    grass_geoserver()
        .env("GEOSERVER_DATAPATH", "")
        .arg("--config")
        .arg(&config)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("datapath").not());
}
