//! Pipeline configuration.
//!
//! Everything a [`crate::Pipeline`] needs to know about its environment is
//! passed in through one [`PipelineConfig`] value. Build it in code with
//! [`PipelineConfig::builder`] or load it from JSON; every field has a default,
//! so a config file only needs the fields it changes:
//!
//! ```json
//! {
//!   "piper_binary": "/opt/piper/piper",
//!   "host_engine": "espeak",
//!   "cache_dir": "/var/cache/tts-forge",
//!   "dry_run": false
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::cache::{DEFAULT_MAX_BYTES, DEFAULT_TTL};
use crate::engines::host::HostBackend;
use crate::error::PipelineError;

/// Which built-in synthesizer to use as the secondary engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostEngineChoice {
    /// `say` on macOS, `espeak-ng` elsewhere.
    #[default]
    Auto,
    Say,
    Espeak,
}

impl HostEngineChoice {
    pub fn resolve(self) -> HostBackend {
        match self {
            Self::Auto => HostBackend::for_platform(),
            Self::Say => HostBackend::Say,
            Self::Espeak => HostBackend::Espeak,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default, setter(into))]
#[serde(default)]
pub struct PipelineConfig {
    /// Model-driven engine executable.
    pub piper_binary: PathBuf,
    pub ffmpeg_binary: PathBuf,
    pub host_engine: HostEngineChoice,
    /// Overrides the `say` executable.
    #[builder(setter(into, strip_option))]
    pub say_binary: Option<PathBuf>,
    /// Overrides the `espeak-ng` executable.
    #[builder(setter(into, strip_option))]
    pub espeak_binary: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub cache_ttl_secs: u64,
    pub cache_max_bytes: u64,
    pub use_cache: bool,
    /// Parent of per-run scratch directories. The system temp dir if unset.
    #[builder(setter(into, strip_option))]
    pub scratch_root: Option<PathBuf>,
    /// Build every invocation but never spawn a process.
    pub dry_run: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            piper_binary: PathBuf::from("piper"),
            ffmpeg_binary: PathBuf::from("ffmpeg"),
            host_engine: HostEngineChoice::Auto,
            say_binary: None,
            espeak_binary: None,
            cache_dir: std::env::temp_dir().join("tts-forge-cache"),
            cache_ttl_secs: DEFAULT_TTL.as_secs(),
            cache_max_bytes: DEFAULT_MAX_BYTES,
            use_cache: true,
            scratch_root: None,
            dry_run: false,
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, PipelineError> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// The executable for the selected host backend.
    pub fn host_binary(&self, backend: HostBackend) -> PathBuf {
        let configured = match backend {
            HostBackend::Say => self.say_binary.as_ref(),
            HostBackend::Espeak => self.espeak_binary.as_ref(),
        };
        configured
            .cloned()
            .unwrap_or_else(|| PathBuf::from(backend.default_binary()))
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.piper_binary.as_os_str().is_empty() {
            return Err(PipelineError::Config("piper_binary is empty".into()));
        }
        if self.ffmpeg_binary.as_os_str().is_empty() {
            return Err(PipelineError::Config("ffmpeg_binary is empty".into()));
        }
        if self.use_cache {
            if self.cache_dir.as_os_str().is_empty() {
                return Err(PipelineError::Config("cache_dir is empty".into()));
            }
            if self.cache_ttl_secs == 0 {
                return Err(PipelineError::Config("cache_ttl_secs must be positive".into()));
            }
            if self.cache_max_bytes == 0 {
                return Err(PipelineError::Config("cache_max_bytes must be positive".into()));
            }
        }
        Ok(())
    }
}
