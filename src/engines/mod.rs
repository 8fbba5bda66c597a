//! Speech synthesis engines.
//!
//! # Available Engines
//!
//! - [`piper::PiperEngine`] - model-driven primary engine (external `piper` process)
//! - [`host::HostEngine`] - the platform's built-in synthesizer (`say` on macOS,
//!   `espeak-ng` elsewhere), used for built-in voices and as the fallback
//!
//! Engines only produce a raw WAV artifact; resampling and encoding happen in
//! [`crate::encoder`].

pub mod host;
pub mod piper;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::{probe_wav, PcmClip};
use crate::command::Invocation;
use crate::error::EngineError;
use crate::params::SynthesisParams;
use crate::process::{CancellationToken, ProcessError, ProcessRunner};
use crate::voice::Gender;

/// Length of the silent placeholder written in dry-run mode.
pub const PLACEHOLDER_DURATION: Duration = Duration::from_millis(250);

/// Everything an engine needs for one synthesis call, except the voice.
#[derive(Debug, Clone, Copy)]
pub struct EngineJob<'a> {
    /// Full request text, streamed to the engine on stdin.
    pub text: &'a str,
    /// BCP-47 style language tag (e.g. `"en-US"`).
    pub language: &'a str,
    pub params: &'a SynthesisParams,
    /// Where the raw artifact must be written. Inside the run's scratch directory.
    pub output: &'a Path,
}

/// Voice selector for model-driven engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelVoice {
    pub path: PathBuf,
    pub sample_rate: u32,
}

/// Voice selector for built-in engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemVoice {
    pub name: String,
}

impl SystemVoice {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Unprocessed engine output.
#[derive(Debug, Clone, PartialEq)]
pub struct RawArtifact {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration: Duration,
    pub size_bytes: u64,
    /// Name of the engine that produced it.
    pub engine: &'static str,
}

impl RawArtifact {
    /// Describe a file an engine claims to have written.
    ///
    /// A missing or empty file is a failed synthesis. When the header cannot
    /// be read, `expected_rate` and mono are assumed.
    pub fn inspect(
        engine: &'static str,
        path: &Path,
        expected_rate: u32,
    ) -> Result<Self, EngineError> {
        let size_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if size_bytes == 0 {
            return Err(EngineError::NoOutput {
                engine,
                path: path.to_path_buf(),
            });
        }

        let (sample_rate, channels, duration) = match probe_wav(path) {
            Some(info) => (info.sample_rate, info.channels, info.duration),
            None => {
                log::debug!("{engine}: could not read WAV header of {}", path.display());
                (expected_rate, 1, Duration::ZERO)
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            sample_rate,
            channels,
            duration,
            size_bytes,
            engine,
        })
    }

    /// Write a silent placeholder instead of running an engine.
    pub fn placeholder(
        engine: &'static str,
        path: &Path,
        sample_rate: u32,
    ) -> Result<Self, EngineError> {
        PcmClip::silence(sample_rate, PLACEHOLDER_DURATION)
            .write_wav(path)
            .map_err(|e| EngineError::Io {
                engine,
                source: std::io::Error::other(e.to_string()),
            })?;
        Self::inspect(engine, path, sample_rate)
    }
}

/// Common interface for text-to-speech synthesis engines.
///
/// Each engine declares the kind of voice selector it understands.
pub trait SynthesisEngine: Send + Sync {
    /// Voice selector accepted by [`SynthesisEngine::synthesize`].
    type Voice;

    /// Short engine name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Cheap check that the engine can be started at all.
    fn check_available(&self) -> Result<(), EngineError>;

    /// Synthesize `job.text` into a raw artifact at `job.output`.
    ///
    /// Blocks until the engine finishes or `cancel` fires.
    fn synthesize(
        &self,
        job: &EngineJob<'_>,
        voice: &Self::Voice,
        cancel: &CancellationToken,
    ) -> Result<RawArtifact, EngineError>;
}

/// A platform engine that can pick its own voice when used as a fallback.
pub trait BuiltInEngine: SynthesisEngine<Voice = SystemVoice> {
    fn select_voice(&self, gender: Gender, language: &str) -> SystemVoice;
}

/// Run an engine process and turn its result into a [`RawArtifact`].
pub(crate) fn run_engine(
    engine: &'static str,
    runner: &ProcessRunner,
    invocation: &Invocation,
    job: &EngineJob<'_>,
    expected_rate: u32,
    cancel: &CancellationToken,
) -> Result<RawArtifact, EngineError> {
    let output = runner
        .run(invocation, Some(job.text), cancel)
        .map_err(|e| match e {
            ProcessError::NotFound(program) => EngineError::NotAvailable {
                engine,
                reason: format!("{program} not found"),
            },
            ProcessError::Cancelled => EngineError::Cancelled { engine },
            ProcessError::Spawn { source, .. } | ProcessError::Io(source) => {
                EngineError::Io { engine, source }
            }
        })?;

    if !output.success() {
        return Err(EngineError::Execution {
            engine,
            code: output.status.code(),
            diagnostic: output.diagnostic(),
        });
    }

    RawArtifact::inspect(engine, job.output, expected_rate)
}

/// Map a `which` lookup to availability.
pub(crate) fn locate(engine: &'static str, binary: &Path) -> Result<(), EngineError> {
    which::which(binary)
        .map(|_| ())
        .map_err(|e| EngineError::NotAvailable {
            engine,
            reason: format!("{}: {e}", binary.display()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspect_rejects_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.wav");
        assert!(matches!(
            RawArtifact::inspect("piper", &missing, 22_050),
            Err(EngineError::NoOutput { .. })
        ));

        let empty = dir.path().join("empty.wav");
        std::fs::write(&empty, b"").unwrap();
        assert!(matches!(
            RawArtifact::inspect("piper", &empty, 22_050),
            Err(EngineError::NoOutput { .. })
        ));
    }

    #[test]
    fn placeholder_is_a_valid_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.wav");
        let raw = RawArtifact::placeholder("piper", &path, 16_000).expect("placeholder");
        assert_eq!(raw.sample_rate, 16_000);
        assert_eq!(raw.channels, 1);
        assert_eq!(raw.duration, PLACEHOLDER_DURATION);
        assert!(raw.size_bytes > 44);
    }

    #[test]
    fn unreadable_header_falls_back_to_expected_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.aiff");
        std::fs::write(&path, b"FORM....AIFF").unwrap();
        let raw = RawArtifact::inspect("say", &path, 22_050).unwrap();
        assert_eq!(raw.sample_rate, 22_050);
        assert_eq!(raw.channels, 1);
    }
}
