//! TOML configuration
//!
//! ```toml
//! [service]
//! base_url = "https://godbolt.org"
//! min_request_interval_ms = 120
//!
//! [flags]
//! extra_gnu = "-fno-exceptions"
//! [flags.by_group]
//! "gcc|x86-64|x86-64 gcc" = "-O2"
//!
//! [[libraries]]
//! scope = "family"
//! target = "gcc"
//! id = "fmt"
//! version = "10.2.1"
//!
//! [flatten]
//! extra_include_dirs = ["../include"]
//! inline_once = true
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use ce_client::{ClientConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use tu_flatten::FlattenOptions;

use crate::error::CoreError;
use crate::flags::ExtraFlags;
use crate::libraries::{clean_rules, LibraryRule, RawLibraryRule};
use crate::Result;

/// `[service]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    pub min_request_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://godbolt.org".to_string(),
            min_request_interval_ms: 120,
            request_timeout_secs: 45,
            max_attempts: 6,
            initial_backoff_ms: 600,
            max_backoff_ms: 6000,
        }
    }
}

impl ServiceConfig {
    /// Apply `CETEST_BASE_URL` and `CETEST_MIN_INTERVAL_MS`.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("CETEST_BASE_URL") {
            if !url.trim().is_empty() {
                self.base_url = url.trim().to_string();
            }
        }
        if let Some(ms) = std::env::var("CETEST_MIN_INTERVAL_MS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            self.min_request_interval_ms = ms;
        }
    }

    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig::new(&self.base_url)
            .with_min_interval(Duration::from_millis(self.min_request_interval_ms))
            .with_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_retry(RetryPolicy {
                max_attempts: self.max_attempts.max(1),
                initial_backoff: Duration::from_millis(self.initial_backoff_ms),
                max_backoff: Duration::from_millis(self.max_backoff_ms),
            })
    }
}

/// File form of [`CetestConfig`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    service: ServiceConfig,
    flags: ExtraFlags,
    libraries: Vec<RawLibraryRule>,
    flatten: FlattenOptions,
}

/// Complete, validated configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CetestConfig {
    pub service: ServiceConfig,
    pub flags: ExtraFlags,
    pub libraries: Vec<LibraryRule>,
    pub flatten: FlattenOptions,
}

impl CetestConfig {
    /// Defaults with environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.service.apply_env();
        config
    }

    /// Parse TOML text. Flags are normalized and library rules cleaned.
    pub fn from_toml(text: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(text)?;
        if raw.service.base_url.trim().is_empty() {
            return Err(CoreError::Config("service.base_url is empty".into()));
        }
        Ok(Self {
            service: raw.service,
            flags: raw.flags.normalized(),
            libraries: clean_rules(&raw.libraries),
            flatten: raw.flatten,
        })
    }

    /// Load a file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut config = Self::from_toml(&text)?;
        config.service.apply_env();
        Ok(config)
    }

    /// [`Self::load`] when a path is given, [`Self::from_env`] otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::from_env()),
        }
    }

    pub fn to_client_config(&self) -> ClientConfig {
        self.service.to_client_config()
    }
}
