//! Configuration loading and root folder resolution
//!
//! Tests that touch SHIPDOCS_ROOT_FOLDER are marked #[serial] so they never
//! race on the process environment.

use serial_test::serial;
use shipdocs_common::config::{
    load_toml_config, read_toml_config, write_toml_config, CompiledDefaults, LoggingConfig, RootFolderInitializer,
    RootFolderResolver, TomlConfig, ROOT_FOLDER_ENV,
};
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let root_folder = RootFolderResolver::new().resolve();

    assert_eq!(root_folder, CompiledDefaults::for_current_platform().root_folder);
}

#[test]
#[serial]
fn test_resolver_env_overrides_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/shipdocs-env-root");

    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/shipdocs-toml-root")),
        ..Default::default()
    };
    let root_folder = RootFolderResolver::new().with_toml(&toml).resolve();

    assert_eq!(root_folder, PathBuf::from("/tmp/shipdocs-env-root"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_cli_beats_everything() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/shipdocs-env-root");

    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/shipdocs-toml-root")),
        ..Default::default()
    };
    let root_folder = RootFolderResolver::new()
        .with_toml(&toml)
        .with_cli_arg(Some(PathBuf::from("/tmp/shipdocs-cli-root")))
        .resolve();

    assert_eq!(root_folder, PathBuf::from("/tmp/shipdocs-cli-root"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_toml_used_when_env_absent() {
    env::remove_var(ROOT_FOLDER_ENV);

    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/shipdocs-toml-root")),
        ..Default::default()
    };
    let root_folder = RootFolderResolver::new().with_toml(&toml).resolve();

    assert_eq!(root_folder, PathBuf::from("/tmp/shipdocs-toml-root"));
}

#[test]
fn test_missing_toml_file_falls_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = load_toml_config(&temp_dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_read_distinguishes_missing_from_present() {
    let temp_dir = TempDir::new().unwrap();
    assert!(read_toml_config(&temp_dir.path().join("absent.toml"))
        .unwrap()
        .is_none());

    let path = temp_dir.path().join("present.toml");
    std::fs::write(&path, "[pipeline]\nchunk_page_window = 8\n").unwrap();
    let config = read_toml_config(&path).unwrap().unwrap();
    assert_eq!(config.pipeline.chunk_page_window, 8);
}

#[test]
fn test_log_file_is_created_and_appended() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("logs").join("ingest.log");
    let logging = LoggingConfig {
        level: "info".to_string(),
        file: Some(path.clone()),
    };

    for line in ["first\n", "second\n"] {
        let mut file = logging.open_log_file().unwrap().unwrap();
        std::io::Write::write_all(&mut file, line.as_bytes()).unwrap();
    }

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
}

#[test]
fn test_no_log_file_configured() {
    assert!(LoggingConfig::default().open_log_file().unwrap().is_none());
}

#[test]
fn test_malformed_toml_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "[pipeline\nchunk_page_window = ").unwrap();

    assert!(load_toml_config(&path).is_err());
}

#[test]
fn test_write_then_load_preserves_fields() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("shipdocs-ingest.toml");

    let mut config = TomlConfig {
        root_folder: Some(PathBuf::from("/srv/shipdocs")),
        logging: LoggingConfig {
            level: "debug".to_string(),
            file: None,
        },
        ..Default::default()
    };
    config.analysis.endpoint = Some("https://ai.example.test".to_string());
    config.storage.api_key = Some("storage-secret".to_string());
    config.pipeline.chunk_page_window = 6;

    write_toml_config(&config, &path).unwrap();
    assert!(!path.with_extension("toml.tmp").exists());

    let loaded = load_toml_config(&path).unwrap();
    assert_eq!(loaded, config);
}

#[cfg(unix)]
#[test]
fn test_written_toml_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("secrets.toml");
    write_toml_config(&TomlConfig::default(), &path).unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn test_initializer_creates_root_folder() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("fleet");
    let init = RootFolderInitializer::new(root.clone());

    init.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert!(!init.database_exists());
}
