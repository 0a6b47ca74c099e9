//! Configuration resolution for shipdocs-ingest
//!
//! Boundary endpoints and API keys resolve with ENV → TOML priority. Everything else
//! comes from the TOML file (or its defaults). The resolved [`IngestConfig`] is passed
//! explicitly into every component; nothing in the pipeline reads the environment.

use shipdocs_common::config::{
    AnalysisBoundaryConfig, PipelineSettings, StorageBoundaryConfig, TomlConfig,
};
use shipdocs_common::{Error, Result};
use std::time::Duration;
use tracing::{info, warn};

pub const ANALYSIS_ENDPOINT_ENV: &str = "SHIPDOCS_ANALYSIS_ENDPOINT";
pub const ANALYSIS_API_KEY_ENV: &str = "SHIPDOCS_ANALYSIS_API_KEY";
pub const STORAGE_ENDPOINT_ENV: &str = "SHIPDOCS_STORAGE_ENDPOINT";
pub const STORAGE_API_KEY_ENV: &str = "SHIPDOCS_STORAGE_API_KEY";

/// Fully resolved service configuration
#[derive(Debug, Clone, Default)]
pub struct IngestConfig {
    pub analysis: AnalysisBoundaryConfig,
    pub storage: StorageBoundaryConfig,
    pub pipeline: PipelineSettings,
}

impl IngestConfig {
    /// Resolve from the TOML file plus environment overrides, then validate
    pub fn resolve(toml_config: &TomlConfig) -> Result<Self> {
        let mut analysis = toml_config.analysis.clone();
        analysis.endpoint = resolve_value(
            "analysis endpoint",
            ANALYSIS_ENDPOINT_ENV,
            analysis.endpoint.as_deref(),
        );
        analysis.api_key = resolve_value(
            "analysis API key",
            ANALYSIS_API_KEY_ENV,
            analysis.api_key.as_deref(),
        );

        let mut storage = toml_config.storage.clone();
        storage.endpoint = resolve_value(
            "storage endpoint",
            STORAGE_ENDPOINT_ENV,
            storage.endpoint.as_deref(),
        );
        storage.api_key = resolve_value(
            "storage API key",
            STORAGE_API_KEY_ENV,
            storage.api_key.as_deref(),
        );

        let config = Self {
            analysis,
            storage,
            pipeline: toml_config.pipeline.clone(),
        };
        config.validate()?;

        if config.analysis.endpoint.is_none() {
            warn!("Analysis endpoint not configured; extraction will rely on the pattern reader");
        }
        if config.storage.endpoint.is_none() {
            warn!("Storage endpoint not configured; Phase 2 uploads will fail until it is set");
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.analysis.timeout_secs == 0
            || self.storage.timeout_secs == 0
            || self.pipeline.pattern_timeout_secs == 0
        {
            return Err(Error::Config(
                "boundary and pattern reader timeouts must be at least 1 second".to_string(),
            ));
        }
        if self.pipeline.pattern_concurrency == 0 {
            return Err(Error::Config(
                "pipeline.pattern_concurrency must be at least 1".to_string(),
            ));
        }
        if self.pipeline.chunk_page_window == 0 {
            return Err(Error::Config("pipeline.chunk_page_window must be at least 1".to_string()));
        }
        let bands = [
            ("header_band_ratio", self.pipeline.header_band_ratio),
            ("footer_band_ratio", self.pipeline.footer_band_ratio),
        ];
        for (name, ratio) in bands {
            if !(ratio > 0.0 && ratio < 0.5) {
                return Err(Error::Config(format!(
                    "pipeline.{} must be between 0 and 0.5, got {}",
                    name, ratio
                )));
            }
        }
        for (name, endpoint) in [
            ("analysis.endpoint", &self.analysis.endpoint),
            ("storage.endpoint", &self.storage.endpoint),
        ] {
            if let Some(url) = endpoint {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(Error::Config(format!(
                        "{} must be an http(s) URL, got '{}'",
                        name, url
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn batch_stagger(&self) -> Duration {
        Duration::from_millis(self.pipeline.batch_stagger_ms)
    }
}

/// ENV → TOML for one optional string value
fn resolve_value(label: &str, env_var: &str, toml_value: Option<&str>) -> Option<String> {
    let env_value = std::env::var(env_var).ok().filter(|v| is_valid_value(v));
    let toml_value = toml_value.filter(|v| is_valid_value(v));

    match (env_value, toml_value) {
        (Some(env_value), toml_value) => {
            if toml_value.is_some() {
                warn!("{} found in {} and TOML; using environment", label, env_var);
            } else {
                info!("{} loaded from environment variable", label);
            }
            Some(env_value.trim().to_string())
        }
        (None, Some(toml_value)) => {
            info!("{} loaded from TOML config", label);
            Some(toml_value.trim().to_string())
        }
        (None, None) => None,
    }
}

/// Non-empty, non-whitespace
pub fn is_valid_value(value: &str) -> bool {
    !value.trim().is_empty()
}
