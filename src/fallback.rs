//! Primary → secondary engine sequencing.
//!
//! ```text
//! SelectEngine ─┬─ model voice ──> AttemptPrimary ─┬─ ok ──> Success
//!               │                                  └─ err ─> AttemptSecondary ─┬─ ok ──> Success
//!               └─ built-in voice ─────────────────────────> AttemptSecondary  └─ err ─> Failed
//! ```
//!
//! There is exactly one fallback hop and no retries, so a fixed set of
//! available engines always yields the same path for the same request.
//! Cancellation stops the machine immediately and never triggers a fallback.

use crate::engines::{
    BuiltInEngine, EngineJob, ModelVoice, RawArtifact, SynthesisEngine, SystemVoice,
};
use crate::error::{EngineError, FallbackError};
use crate::process::CancellationToken;
use crate::voice::{Gender, VoiceDescriptor, VoiceSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackState {
    SelectEngine,
    AttemptPrimary,
    AttemptSecondary,
    Success,
    Failed,
}

/// Which engine produced the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineRoute {
    /// The model-driven engine.
    Primary,
    /// The built-in engine, after the primary failed.
    Fallback,
    /// The built-in engine, because the voice is built-in.
    BuiltIn,
}

#[derive(Debug)]
pub struct FallbackOutcome {
    pub artifact: RawArtifact,
    pub route: EngineRoute,
    /// The primary's error when the fallback was taken.
    pub primary_error: Option<EngineError>,
    /// States visited, in order.
    pub trace: Vec<FallbackState>,
}

pub struct FallbackCoordinator<P, S> {
    primary: P,
    secondary: S,
}

impl<P, S> FallbackCoordinator<P, S>
where
    P: SynthesisEngine<Voice = ModelVoice>,
    S: BuiltInEngine,
{
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn secondary(&self) -> &S {
        &self.secondary
    }

    /// Drive the state machine to `Success` or `Failed`.
    pub fn run(
        &self,
        job: &EngineJob<'_>,
        voice: &VoiceDescriptor,
        cancel: &CancellationToken,
    ) -> Result<FallbackOutcome, FallbackError> {
        let mut trace = vec![FallbackState::SelectEngine];

        let model = match &voice.source {
            VoiceSource::BuiltIn { engine_voice } => {
                log::info!(
                    "Voice {} is built-in, using {}",
                    voice.id,
                    self.secondary.name()
                );
                trace.push(FallbackState::AttemptSecondary);
                let system_voice = SystemVoice::named(engine_voice);
                return match attempt(&self.secondary, job, &system_voice, cancel) {
                    Ok(artifact) => {
                        trace.push(FallbackState::Success);
                        Ok(FallbackOutcome {
                            artifact,
                            route: EngineRoute::BuiltIn,
                            primary_error: None,
                            trace,
                        })
                    }
                    Err(e) if e.is_cancelled() => Err(FallbackError::Cancelled),
                    Err(e) => {
                        trace.push(FallbackState::Failed);
                        log::debug!("fallback trace: {trace:?}");
                        Err(FallbackError::BuiltIn(e))
                    }
                };
            }
            VoiceSource::ModelFile { path, sample_rate } => ModelVoice {
                path: path.clone(),
                sample_rate: *sample_rate,
            },
        };

        trace.push(FallbackState::AttemptPrimary);
        let primary_error = match attempt(&self.primary, job, &model, cancel) {
            Ok(artifact) => {
                trace.push(FallbackState::Success);
                return Ok(FallbackOutcome {
                    artifact,
                    route: EngineRoute::Primary,
                    primary_error: None,
                    trace,
                });
            }
            Err(e) if e.is_cancelled() => return Err(FallbackError::Cancelled),
            Err(e) => e,
        };

        log::warn!(
            "{} failed for voice {}: {primary_error}; falling back to {}",
            self.primary.name(),
            voice.id,
            self.secondary.name()
        );
        trace.push(FallbackState::AttemptSecondary);

        let gender = Gender::from_speaker_index(job.params.speaker_index);
        let system_voice = self.secondary.select_voice(gender, job.language);
        match attempt(&self.secondary, job, &system_voice, cancel) {
            Ok(artifact) => {
                trace.push(FallbackState::Success);
                Ok(FallbackOutcome {
                    artifact,
                    route: EngineRoute::Fallback,
                    primary_error: Some(primary_error),
                    trace,
                })
            }
            Err(e) if e.is_cancelled() => Err(FallbackError::Cancelled),
            Err(secondary_error) => {
                trace.push(FallbackState::Failed);
                log::debug!("fallback trace: {trace:?}");
                Err(FallbackError::Exhausted {
                    primary: primary_error,
                    secondary: secondary_error,
                })
            }
        }
    }
}

fn attempt<E: SynthesisEngine>(
    engine: &E,
    job: &EngineJob<'_>,
    voice: &E::Voice,
    cancel: &CancellationToken,
) -> Result<RawArtifact, EngineError> {
    engine.check_available()?;
    engine.synthesize(job, voice, cancel)
}
