//! Error types for every stage of the pipeline.
//!
//! Only a validation failure, exhaustion of all engines, an encoding failure
//! or cancellation abort a run. Cache problems are logged and degrade the run
//! to "synthesized but not cached".

use std::path::PathBuf;

/// A parameter fell outside its allowed range.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {field}: got {value}, allowed {allowed}")]
pub struct ValidationError {
    /// Name of the offending field (e.g. `"speed"`).
    pub field: &'static str,
    /// The supplied value, formatted for display.
    pub value: String,
    /// The allowed range, formatted for display.
    pub allowed: String,
}

impl ValidationError {
    pub(crate) fn new(
        field: &'static str,
        value: impl ToString,
        allowed: impl Into<String>,
    ) -> Self {
        Self {
            field,
            value: value.to_string(),
            allowed: allowed.into(),
        }
    }
}

/// Failure of a single synthesis engine.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("{engine} is not available: {reason}")]
    NotAvailable { engine: &'static str, reason: String },
    #[error("voice model file not found: {}", .0.display())]
    ModelMissing(PathBuf),
    #[error("{engine} exited with code {code:?}: {diagnostic}")]
    Execution {
        engine: &'static str,
        code: Option<i32>,
        diagnostic: String,
    },
    #[error("{engine} produced no audio at {}", .path.display())]
    NoOutput { engine: &'static str, path: PathBuf },
    #[error("{engine} was cancelled")]
    Cancelled { engine: &'static str },
    #[error("I/O error while running {engine}: {source}")]
    Io {
        engine: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    /// True when the engine could not be used at all (as opposed to running and failing).
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::NotAvailable { .. } | Self::ModelMissing(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Terminal failure of the engine fallback sequence.
#[derive(thiserror::Error, Debug)]
pub enum FallbackError {
    /// The voice is built-in, so only the built-in engine was tried.
    #[error("built-in engine failed: {0}")]
    BuiltIn(#[source] EngineError),
    /// Both the primary and the secondary engine failed.
    #[error("primary engine failed ({primary}); fallback engine failed ({secondary})")]
    Exhausted {
        primary: EngineError,
        secondary: EngineError,
    },
    #[error("synthesis was cancelled")]
    Cancelled,
}

impl FallbackError {
    /// True when no engine could even be started.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::BuiltIn(e) => e.is_unavailable(),
            Self::Exhausted { primary, secondary } => {
                primary.is_unavailable() && secondary.is_unavailable()
            }
            Self::Cancelled => false,
        }
    }
}

/// Post-processing failure. Always fatal to the run.
#[derive(thiserror::Error, Debug)]
pub enum EncodingError {
    #[error("encoder is not available: {0}")]
    NotAvailable(String),
    #[error("raw artifact not found: {}", .0.display())]
    MissingInput(PathBuf),
    #[error("encoder exited with code {code:?}: {diagnostic}")]
    Execution {
        code: Option<i32>,
        diagnostic: String,
    },
    #[error("encoder produced an empty or missing file: {}", .0.display())]
    EmptyOutput(PathBuf),
    #[error("encoding was cancelled")]
    Cancelled,
    #[error("I/O error during encoding: {0}")]
    Io(#[from] std::io::Error),
}

/// Cache store failure. Never fatal to a run.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache index serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("cache index is corrupt: {0}")]
    Corrupt(String),
    #[error("cache artifact source not found: {}", .0.display())]
    MissingSource(PathBuf),
}

/// Top-level error returned by [`crate::Pipeline::run`].
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no synthesis engine is usable: {0}")]
    EngineNotAvailable(#[source] FallbackError),
    #[error("synthesis failed: {0}")]
    Engine(#[source] FallbackError),
    #[error("post-processing failed: {0}")]
    Encoding(#[from] EncodingError),
    #[error("run was cancelled")]
    Cancelled,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<FallbackError> for PipelineError {
    fn from(err: FallbackError) -> Self {
        match err {
            FallbackError::Cancelled => Self::Cancelled,
            e if e.is_unavailable() => Self::EngineNotAvailable(e),
            e => Self::Engine(e),
        }
    }
}
