use std::path::{Path, PathBuf};

use crate::command::{piper_invocation, Invocation};
use crate::error::EngineError;
use crate::process::{CancellationToken, ProcessRunner};

use crate::engines::{locate, run_engine, EngineJob, ModelVoice, RawArtifact, SynthesisEngine};

const ENGINE_NAME: &str = "piper";

/// Piper engine bound to one binary and one process runner.
#[derive(Debug, Clone)]
pub struct PiperEngine {
    binary: PathBuf,
    runner: ProcessRunner,
    dry_run: bool,
}

impl PiperEngine {
    /// Create an engine that uses `piper` from PATH.
    pub fn new(runner: ProcessRunner) -> Self {
        Self::with_binary("piper", runner)
    }

    /// Create an engine with an explicit binary path.
    pub fn with_binary(binary: impl Into<PathBuf>, runner: ProcessRunner) -> Self {
        Self {
            binary: binary.into(),
            runner,
            dry_run: false,
        }
    }

    /// In dry-run mode nothing is spawned; a silent placeholder is written instead.
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// The invocation `synthesize` would run for this job.
    pub fn invocation(&self, job: &EngineJob<'_>, voice: &ModelVoice) -> Invocation {
        piper_invocation(&self.binary, job.params, &voice.path, job.output)
    }
}

impl SynthesisEngine for PiperEngine {
    type Voice = ModelVoice;

    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn check_available(&self) -> Result<(), EngineError> {
        if self.dry_run {
            return Ok(());
        }
        locate(ENGINE_NAME, &self.binary)
    }

    fn synthesize(
        &self,
        job: &EngineJob<'_>,
        voice: &ModelVoice,
        cancel: &CancellationToken,
    ) -> Result<RawArtifact, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled {
                engine: ENGINE_NAME,
            });
        }

        let invocation = self.invocation(job, voice);

        if self.dry_run {
            log::debug!("dry run, not executing: {invocation}");
            return RawArtifact::placeholder(ENGINE_NAME, job.output, voice.sample_rate);
        }

        if !voice.path.is_file() {
            return Err(EngineError::ModelMissing(voice.path.clone()));
        }

        log::info!(
            "Synthesizing {} chars with piper model {}",
            job.text.len(),
            voice.path.display()
        );
        run_engine(
            ENGINE_NAME,
            &self.runner,
            &invocation,
            job,
            voice.sample_rate,
            cancel,
        )
    }
}
