//! Cache-wrapped synthesis runs.
//!
//! A run is strictly sequential:
//!
//! ```text
//! validate -> fingerprint -> cache lookup ─┬─ hit  ──────────────────────────────> deliver
//!                                          └─ miss -> engines (with fallback)
//!                                                  -> encode -> cache put -> deliver
//! ```
//!
//! Every run gets its own scratch directory, removed when the run ends
//! however it ends. Independent runs may share one [`Pipeline`] (and so one
//! cache) across threads.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tempfile::TempDir;

use crate::cache::{CacheEntry, CacheKey, CacheStore, Metadata};
use crate::config::PipelineConfig;
use crate::encoder::{EncodedArtifact, Encoder};
use crate::engines::host::HostEngine;
use crate::engines::piper::PiperEngine;
use crate::engines::{BuiltInEngine, EngineJob, ModelVoice, SynthesisEngine};
use crate::error::{EncodingError, PipelineError, ValidationError};
use crate::fallback::{EngineRoute, FallbackCoordinator, FallbackOutcome};
use crate::params::{self, AudioFormat, EncodingSpec, SynthesisParams};
use crate::process::{CancellationToken, ProcessRunner};
use crate::voice::VoiceDescriptor;

const RAW_FILE: &str = "raw.wav";

/// Normalized text to speak.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesisRequest {
    /// Sentences in reading order. Hashed verbatim into the cache key.
    pub sentences: Vec<String>,
    /// Language tag, e.g. `"en-US"` or `"el-GR"`.
    pub language: String,
    pub params: SynthesisParams,
}

impl SynthesisRequest {
    pub fn new<I, S>(sentences: I, language: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sentences: sentences.into_iter().map(Into::into).collect(),
            language: language.into(),
            params: SynthesisParams::default(),
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: SynthesisParams) -> Self {
        self.params = params;
        self
    }

    /// The text streamed to the engine: non-blank sentences joined by spaces.
    pub fn text(&self) -> String {
        self.sentences
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.sentences.iter().all(|s| s.trim().is_empty()) {
            return Err(ValidationError::new(
                "sentences",
                format!("{} blank", self.sentences.len()),
                "at least one non-blank sentence",
            ));
        }
        Ok(())
    }
}

/// Where a delivered artifact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactSource {
    Cache,
    Engine(EngineRoute),
}

/// The finished artifact at the caller's output path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactResult {
    pub path: PathBuf,
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration: Duration,
    pub size_bytes: u64,
    pub cache_key: CacheKey,
    pub source: ArtifactSource,
}

pub struct Pipeline<P = PiperEngine, S = HostEngine> {
    config: PipelineConfig,
    coordinator: FallbackCoordinator<P, S>,
    encoder: Encoder,
    cache: Option<Arc<CacheStore>>,
    runner: ProcessRunner,
}

impl Pipeline {
    /// A pipeline driving `piper`, the configured host engine and `ffmpeg`.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let runner = ProcessRunner::new();

        let primary = PiperEngine::with_binary(&config.piper_binary, runner.clone())
            .dry_run(config.dry_run);
        let backend = config.host_engine.resolve();
        let secondary =
            HostEngine::with_binary(backend, config.host_binary(backend), runner.clone())
                .dry_run(config.dry_run);

        Ok(Self::with_engines(config, primary, secondary, runner))
    }
}

impl<P, S> Pipeline<P, S>
where
    P: SynthesisEngine<Voice = ModelVoice>,
    S: BuiltInEngine,
{
    /// Assemble a pipeline around caller-supplied engines.
    ///
    /// If the configured cache cannot be opened the pipeline runs uncached.
    pub fn with_engines(
        config: PipelineConfig,
        primary: P,
        secondary: S,
        runner: ProcessRunner,
    ) -> Self {
        let encoder =
            Encoder::with_binary(&config.ffmpeg_binary, runner.clone()).dry_run(config.dry_run);
        let cache = if config.use_cache {
            open_cache(&config)
        } else {
            None
        };

        Self {
            config,
            coordinator: FallbackCoordinator::new(primary, secondary),
            encoder,
            cache,
            runner,
        }
    }

    /// Replace the cache, e.g. to share one store between pipelines.
    #[must_use]
    pub fn with_cache(mut self, cache: Option<Arc<CacheStore>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&Arc<CacheStore>> {
        self.cache.as_ref()
    }

    /// The runner shared by the engines and the encoder.
    pub fn process_runner(&self) -> &ProcessRunner {
        &self.runner
    }

    pub fn coordinator(&self) -> &FallbackCoordinator<P, S> {
        &self.coordinator
    }

    pub fn cache_key(
        &self,
        request: &SynthesisRequest,
        voice: &VoiceDescriptor,
        encoding: &EncodingSpec,
    ) -> CacheKey {
        CacheKey::generate(&request.sentences, &voice.id, &request.params, encoding)
    }

    /// Produce the artifact for `request` at `output`.
    ///
    /// Nothing is written anywhere if validation fails. A cancelled run
    /// returns [`PipelineError::Cancelled`] and is never cached.
    pub fn run(
        &self,
        request: &SynthesisRequest,
        voice: &VoiceDescriptor,
        encoding: &EncodingSpec,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<ArtifactResult, PipelineError> {
        request.validate()?;
        params::validate(&request.params, encoding)?;

        let key = self.cache_key(request, voice, encoding);
        if let Some(result) = self.deliver_cached(&key, encoding, output)? {
            return Ok(result);
        }

        let scratch = self.scratch_dir()?;
        let text = request.text();
        let raw_path = scratch.path().join(RAW_FILE);
        let job = EngineJob {
            text: &text,
            language: &request.language,
            params: &request.params,
            output: &raw_path,
        };

        log::info!(
            "Synthesizing {} sentence(s) with voice {} (key {key})",
            request.sentences.len(),
            voice.id
        );
        let outcome = self.coordinator.run(&job, voice, cancel)?;
        log::debug!("engine path: {:?}", outcome.trace);

        let encoded_path = scratch
            .path()
            .join(format!("encoded.{}", encoding.format.extension()));
        let encoded = self
            .encoder
            .encode(&outcome.artifact, &encoded_path, encoding, cancel)
            .map_err(|e| match e {
                EncodingError::Cancelled => PipelineError::Cancelled,
                e => PipelineError::Encoding(e),
            })?;

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        if let Some(cache) = &self.cache {
            let metadata = entry_metadata(request, voice, &outcome, &encoded);
            if let Err(e) = cache.put(&key, &encoded.path, metadata) {
                log::warn!("Synthesized {key} but could not cache it: {e}");
            }
        }

        let size_bytes = fs::copy(&encoded.path, output)?;
        Ok(ArtifactResult {
            path: output.to_path_buf(),
            format: encoded.format,
            sample_rate: encoded.sample_rate,
            channels: encoded.channels,
            duration: encoded.duration,
            size_bytes,
            cache_key: key,
            source: ArtifactSource::Engine(outcome.route),
        })
    }

    fn deliver_cached(
        &self,
        key: &CacheKey,
        encoding: &EncodingSpec,
        output: &Path,
    ) -> Result<Option<ArtifactResult>, PipelineError> {
        let Some(entry) = self.cache.as_ref().and_then(|cache| cache.get(key)) else {
            return Ok(None);
        };

        let size_bytes = match fs::copy(&entry.artifact_path, output) {
            Ok(size) => size,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // evicted between lookup and copy
                log::debug!("Cached artifact for {key} vanished, synthesizing");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        log::info!("Serving {key} from cache");
        Ok(Some(result_from_entry(&entry, encoding, output, size_bytes)))
    }

    fn scratch_dir(&self) -> Result<TempDir, PipelineError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("tts-forge-run-");
        let dir = match &self.config.scratch_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}

fn open_cache(config: &PipelineConfig) -> Option<Arc<CacheStore>> {
    match CacheStore::open(&config.cache_dir) {
        Ok(store) => Some(Arc::new(
            store
                .with_ttl(config.cache_ttl())
                .with_max_bytes(config.cache_max_bytes),
        )),
        Err(e) => {
            log::warn!(
                "Cache at {} is unusable, running uncached: {e}",
                config.cache_dir.display()
            );
            None
        }
    }
}

fn entry_metadata(
    request: &SynthesisRequest,
    voice: &VoiceDescriptor,
    outcome: &FallbackOutcome,
    encoded: &EncodedArtifact,
) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("voice_id".into(), voice.id.clone().into());
    metadata.insert("language".into(), request.language.clone().into());
    metadata.insert("engine".into(), outcome.artifact.engine.into());
    if let Ok(route) = serde_json::to_value(outcome.route) {
        metadata.insert("route".into(), route);
    }
    metadata.insert("sample_rate".into(), encoded.sample_rate.into());
    metadata.insert("channels".into(), encoded.channels.into());
    metadata.insert(
        "duration_ns".into(),
        (encoded.duration.as_nanos() as u64).into(),
    );
    metadata
}

fn result_from_entry(
    entry: &CacheEntry,
    encoding: &EncodingSpec,
    output: &Path,
    size_bytes: u64,
) -> ArtifactResult {
    let number = |field: &str| entry.metadata.get(field).and_then(|v| v.as_u64());

    ArtifactResult {
        path: output.to_path_buf(),
        format: encoding.format,
        sample_rate: number("sample_rate")
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(encoding.sample_rate),
        channels: number("channels")
            .and_then(|v| u16::try_from(v).ok())
            .unwrap_or(1),
        duration: Duration::from_nanos(number("duration_ns").unwrap_or(0)),
        size_bytes,
        cache_key: entry.key.clone(),
        source: ArtifactSource::Cache,
    }
}
