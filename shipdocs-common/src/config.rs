//! Bootstrap configuration and root folder resolution
//!
//! Configuration sources, highest priority first:
//! 1. Command-line argument
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default
//!
//! A missing TOML file falls back to defaults. A file that exists but cannot be read
//! or parsed is a configuration error and stops startup.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "SHIPDOCS_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "shipdocs.db";

/// Bootstrap configuration loaded from TOML
///
/// Every section is optional in the file; absent sections take their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Root folder holding the shared database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub server: ServerConfig,

    /// AI analysis boundary (analysis only, never storage)
    #[serde(default)]
    pub analysis: AnalysisBoundaryConfig,

    /// Storage boundary (write only, never analysis)
    #[serde(default)]
    pub storage: StorageBoundaryConfig,

    #[serde(default)]
    pub pipeline: PipelineSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also append logs to this file; stderr is always written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Open the configured log file for appending, creating parent folders
    pub fn open_log_file(&self) -> Result<Option<std::fs::File>> {
        let Some(path) = &self.file else {
            return Ok(None);
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::Config(format!("Open log file failed ({}): {}", path.display(), e)))?;
        Ok(Some(file))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// AI analysis boundary settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisBoundaryConfig {
    /// Proxy endpoint accepting analysis requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Bearer token for the proxy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Document processor identifier forwarded with each request
    #[serde(default = "default_processor_id")]
    pub processor_id: String,

    /// Summarisation model identifier
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Smaller reasoning model used for field extraction from summaries.
    /// When absent, fields are parsed locally from the summary text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_model_id: Option<String>,

    #[serde(default = "default_analysis_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_analysis_rate")]
    pub requests_per_second: u32,
}

impl Default for AnalysisBoundaryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            processor_id: default_processor_id(),
            model_id: default_model_id(),
            field_model_id: None,
            timeout_secs: default_analysis_timeout_secs(),
            requests_per_second: default_analysis_rate(),
        }
    }
}

/// Storage boundary settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageBoundaryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_storage_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_storage_rate")]
    pub requests_per_second: u32,
}

impl Default for StorageBoundaryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_secs: default_storage_timeout_secs(),
            requests_per_second: default_storage_rate(),
        }
    }
}

/// Pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineSettings {
    /// Pages per analysis window; documents at or below this are analysed in one pass
    #[serde(default = "default_chunk_page_window")]
    pub chunk_page_window: u32,

    /// Delay between document task launches in a batch
    #[serde(default = "default_batch_stagger_ms")]
    pub batch_stagger_ms: u64,

    /// Fraction of page height treated as the header band
    #[serde(default = "default_header_band")]
    pub header_band_ratio: f32,

    /// Fraction of page height treated as the footer band
    #[serde(default = "default_footer_band")]
    pub footer_band_ratio: f32,

    /// Disable to run AI-only extraction (no page rendering / OCR tools installed)
    #[serde(default = "default_true")]
    pub pattern_reader_enabled: bool,

    /// `pdftoppm` executable used to render first pages
    #[serde(default = "default_pdftoppm")]
    pub pdftoppm_path: String,

    /// `tesseract` executable used to read header/footer bands
    #[serde(default = "default_tesseract")]
    pub tesseract_path: String,

    /// Render resolution for first pages
    #[serde(default = "default_render_dpi")]
    pub render_dpi: u32,

    /// Deadline for rendering and recognising one chunk's bands
    #[serde(default = "default_pattern_timeout_secs")]
    pub pattern_timeout_secs: u64,

    /// Chunks whose bands may be rendered/recognised at the same time
    #[serde(default = "default_pattern_concurrency")]
    pub pattern_concurrency: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunk_page_window: default_chunk_page_window(),
            batch_stagger_ms: default_batch_stagger_ms(),
            header_band_ratio: default_header_band(),
            footer_band_ratio: default_footer_band(),
            pattern_reader_enabled: true,
            pdftoppm_path: default_pdftoppm(),
            tesseract_path: default_tesseract(),
            render_dpi: default_render_dpi(),
            pattern_timeout_secs: default_pattern_timeout_secs(),
            pattern_concurrency: default_pattern_concurrency(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5731
}

fn default_processor_id() -> String {
    "document-ocr".to_string()
}

fn default_model_id() -> String {
    "summary-large".to_string()
}

fn default_analysis_timeout_secs() -> u64 {
    120
}

fn default_analysis_rate() -> u32 {
    2
}

fn default_storage_timeout_secs() -> u64 {
    60
}

fn default_storage_rate() -> u32 {
    5
}

fn default_chunk_page_window() -> u32 {
    12
}

fn default_batch_stagger_ms() -> u64 {
    400
}

fn default_header_band() -> f32 {
    0.15
}

fn default_footer_band() -> f32 {
    0.12
}

fn default_true() -> bool {
    true
}

fn default_pdftoppm() -> String {
    "pdftoppm".to_string()
}

fn default_tesseract() -> String {
    "tesseract".to_string()
}

fn default_render_dpi() -> u32 {
    150
}

fn default_pattern_timeout_secs() -> u64 {
    60
}

fn default_pattern_concurrency() -> usize {
    4
}

/// Compiled defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let root_folder = dirs::data_local_dir()
            .map(|d| d.join("shipdocs"))
            .unwrap_or_else(|| PathBuf::from("./shipdocs_data"));

        Self {
            root_folder,
            log_level: default_log_level(),
        }
    }
}

/// Default location of a module's TOML file: `<config_dir>/shipdocs/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("shipdocs").join(format!("{}.toml", module_name)))
}

/// Load TOML configuration
///
/// A missing file yields defaults with a warning. A file that exists but does not
/// parse is a configuration error: silently ignoring a broken file would route
/// uploads with unintended settings.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    match read_toml_config(path)? {
        Some(config) => {
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        None => {
            warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            );
            Ok(TomlConfig::default())
        }
    }
}

/// [`load_toml_config`] without logging, for use before a subscriber is installed
///
/// `Ok(None)` when the file does not exist.
pub fn read_toml_config(path: &Path) -> Result<Option<TomlConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;
    Ok(Some(config))
}

/// Write TOML configuration atomically (temp file + rename)
///
/// On Unix the file is restricted to 0600 since it may carry boundary API keys.
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&tmp_path, path)?;
    debug!("Wrote configuration to {}", path.display());
    Ok(())
}

/// Root folder resolver
///
/// Priority: CLI argument → `SHIPDOCS_ROOT_FOLDER` → TOML `root_folder` → compiled default.
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_value = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            debug!("Root folder from command line: {}", path.display());
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                debug!("Root folder from {}: {}", ROOT_FOLDER_ENV, path);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_value {
            debug!("Root folder from TOML: {}", path.display());
            return path.clone();
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and locates the database inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            info!("Creating root folder {}", self.root_folder.display());
            std::fs::create_dir_all(&self.root_folder)?;
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.pipeline.chunk_page_window, 12);
        assert_eq!(config.analysis.timeout_secs, 120);
        assert_eq!(config.storage.timeout_secs, 60);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [pipeline]
            chunk_page_window = 8

            [analysis]
            endpoint = "https://ai.example.test/proxy"
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.chunk_page_window, 8);
        assert_eq!(config.pipeline.batch_stagger_ms, 400);
        assert_eq!(
            config.analysis.endpoint.as_deref(),
            Some("https://ai.example.test/proxy")
        );
        assert_eq!(config.analysis.processor_id, "document-ocr");
        assert!(config.storage.endpoint.is_none());
    }

    #[test]
    fn test_initializer_database_path() {
        let init = RootFolderInitializer::new(PathBuf::from("/tmp/shipdocs-root"));
        assert_eq!(
            init.database_path(),
            PathBuf::from("/tmp/shipdocs-root/shipdocs.db")
        );
    }
}
