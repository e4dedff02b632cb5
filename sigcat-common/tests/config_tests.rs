//! Tests for configuration resolution
//!
//! Tests that touch SIGCAT_* environment variables are marked #[serial] so they
//! never race each other.

use serial_test::serial;
use sigcat_common::config::{
    resolve_config, ENV_CONFIG_PATH, ENV_DATABASE_PATH, ENV_IGDB_CLIENT_ID,
};
use sigcat_common::Error;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn clear_env() {
    env::remove_var(ENV_CONFIG_PATH);
    env::remove_var(ENV_DATABASE_PATH);
    env::remove_var(ENV_IGDB_CLIENT_ID);
}

#[test]
#[serial]
fn test_cli_config_file_is_loaded() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "database_path = \"/srv/sigcat/catalog.db\"\n[matcher]\nsync_timeout_seconds = 3\n",
    )
    .unwrap();

    let config = resolve_config(Some(&path), None).unwrap();
    assert_eq!(config.database_path, PathBuf::from("/srv/sigcat/catalog.db"));
    assert_eq!(config.matcher.sync_timeout_seconds, 3);
}

#[test]
#[serial]
fn test_explicit_missing_config_is_error() {
    clear_env();
    let result = resolve_config(Some(Path::new("/nonexistent/sigcat.toml")), None);
    assert!(matches!(result, Err(Error::ConfigMissing(_))));
}

#[test]
#[serial]
fn test_malformed_config_reports_path() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "database_path = [unterminated").unwrap();

    match resolve_config(Some(&path), None) {
        Err(Error::ConfigParse { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected parse error, got {:?}", other.map(|_| ())),
    }
}

#[test]
#[serial]
fn test_cli_database_beats_env_and_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "database_path = \"/from/file.db\"\n").unwrap();
    env::set_var(ENV_DATABASE_PATH, "/from/env.db");

    let config = resolve_config(Some(&path), Some(Path::new("/from/cli.db"))).unwrap();
    assert_eq!(config.database_path, PathBuf::from("/from/cli.db"));

    let config = resolve_config(Some(&path), None).unwrap();
    assert_eq!(config.database_path, PathBuf::from("/from/env.db"));

    clear_env();
}

#[test]
#[serial]
fn test_env_config_path_and_igdb_override() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("env.toml");
    std::fs::write(&path, "[igdb]\nclient_id = \"file-id\"\n").unwrap();
    env::set_var(ENV_CONFIG_PATH, path.to_str().unwrap());
    env::set_var(ENV_IGDB_CLIENT_ID, "env-id");

    let config = resolve_config(None, None).unwrap();
    assert_eq!(config.igdb.client_id.as_deref(), Some("env-id"));

    clear_env();
}
