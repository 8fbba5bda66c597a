//! The platform's built-in synthesizer.
//!
//! Serves voices tagged [`crate::VoiceSource::BuiltIn`] directly, and is the
//! secondary engine when the model-driven engine fails.

pub mod espeak;
pub mod say;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::command::Invocation;
use crate::engines::{
    locate, run_engine, BuiltInEngine, EngineJob, RawArtifact, SynthesisEngine, SystemVoice,
};
use crate::error::EngineError;
use crate::process::{CancellationToken, ProcessRunner};
use crate::voice::Gender;

/// Which built-in synthesizer to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostBackend {
    Say,
    Espeak,
}

impl HostBackend {
    /// `say` on macOS, `espeak-ng` everywhere else.
    pub fn for_platform() -> Self {
        if cfg!(target_os = "macos") {
            Self::Say
        } else {
            Self::Espeak
        }
    }

    pub fn default_binary(self) -> &'static str {
        match self {
            Self::Say => "say",
            Self::Espeak => "espeak-ng",
        }
    }

    fn engine_name(self) -> &'static str {
        self.default_binary()
    }

    fn sample_rate(self) -> u32 {
        match self {
            Self::Say => say::OUTPUT_SAMPLE_RATE,
            Self::Espeak => espeak::OUTPUT_SAMPLE_RATE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HostEngine {
    backend: HostBackend,
    binary: PathBuf,
    runner: ProcessRunner,
    dry_run: bool,
}

impl HostEngine {
    /// The platform's default backend, found on PATH.
    pub fn new(runner: ProcessRunner) -> Self {
        let backend = HostBackend::for_platform();
        Self::with_binary(backend, backend.default_binary(), runner)
    }

    pub fn with_binary(
        backend: HostBackend,
        binary: impl Into<PathBuf>,
        runner: ProcessRunner,
    ) -> Self {
        Self {
            backend,
            binary: binary.into(),
            runner,
            dry_run: false,
        }
    }

    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    pub fn backend(&self) -> HostBackend {
        self.backend
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// The invocation `synthesize` would run for this job.
    pub fn invocation(&self, job: &EngineJob<'_>, voice: &SystemVoice) -> Invocation {
        match self.backend {
            HostBackend::Say => say::say_invocation(
                &self.binary,
                voice,
                say::speaking_rate(job.language, job.params.speed),
                job.output,
            ),
            HostBackend::Espeak => espeak::espeak_invocation(
                &self.binary,
                voice,
                espeak::speaking_rate(job.params.speed),
                job.output,
            ),
        }
    }
}

impl SynthesisEngine for HostEngine {
    type Voice = SystemVoice;

    fn name(&self) -> &'static str {
        self.backend.engine_name()
    }

    fn check_available(&self) -> Result<(), EngineError> {
        if self.dry_run {
            return Ok(());
        }
        if self.backend == HostBackend::Say && !cfg!(target_os = "macos") {
            return Err(EngineError::NotAvailable {
                engine: self.name(),
                reason: "say is only available on macOS".to_string(),
            });
        }
        locate(self.name(), &self.binary)
    }

    fn synthesize(
        &self,
        job: &EngineJob<'_>,
        voice: &SystemVoice,
        cancel: &CancellationToken,
    ) -> Result<RawArtifact, EngineError> {
        let engine = self.name();
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled { engine });
        }

        let invocation = self.invocation(job, voice);
        if self.dry_run {
            log::debug!("dry run, not executing: {invocation}");
            return RawArtifact::placeholder(engine, job.output, self.backend.sample_rate());
        }

        log::info!(
            "Synthesizing {} chars with {engine} voice {}",
            job.text.len(),
            voice.name
        );
        run_engine(
            engine,
            &self.runner,
            &invocation,
            job,
            self.backend.sample_rate(),
            cancel,
        )
        .map_err(|e| match e {
            EngineError::Execution {
                engine,
                code,
                diagnostic,
            } => {
                // Built-in voice names only mean something to one backend.
                log::warn!(
                    "{engine} rejected voice {}; built-in voice names are backend specific",
                    voice.name
                );
                EngineError::Execution {
                    engine,
                    code,
                    diagnostic: format!("voice {}: {diagnostic}", voice.name),
                }
            }
            other => other,
        })
    }
}

impl BuiltInEngine for HostEngine {
    fn select_voice(&self, gender: Gender, language: &str) -> SystemVoice {
        match self.backend {
            HostBackend::Say => say::select_voice(gender, language),
            HostBackend::Espeak => espeak::select_voice(gender, language),
        }
    }
}
