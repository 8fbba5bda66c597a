//! # tts-forge
//!
//! A Rust library that turns normalized sentences into finished,
//! loudness-normalized speech audio by driving external synthesis engines.
//!
//! ## Features
//!
//! - **Engine fallback**: a model-driven primary engine (`piper`) with the
//!   platform's built-in synthesizer (`say` / `espeak-ng`) as the fallback
//! - **Post-processing**: resampling, mono downmix, EBU R128 loudness
//!   normalization and MP3/WAV encoding via `ffmpeg`
//! - **Content-addressed cache**: identical requests are served from disk
//!   without re-synthesizing
//! - **Dry-run mode**: every command is built but no process is spawned
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! tts-forge = "2026.2"
//! ```
//!
//! ```rust,no_run
//! use std::path::Path;
//! use tts_forge::{
//!     CancellationToken, EncodingSpec, Pipeline, PipelineConfig, SynthesisRequest,
//!     VoiceDescriptor,
//! };
//!
//! let pipeline = Pipeline::new(PipelineConfig::default())?;
//! let voice = VoiceDescriptor::model_file(
//!     "en_us_ljspeech_medium",
//!     "voices/en_US-ljspeech-medium.onnx",
//!     22_050,
//! );
//! let request = SynthesisRequest::new(["Hello world."], "en-US");
//!
//! let result = pipeline.run(
//!     &request,
//!     &voice,
//!     &EncodingSpec::default(),
//!     Path::new("hello.mp3"),
//!     &CancellationToken::new(),
//! )?;
//! println!("{} bytes, {:?}", result.size_bytes, result.source);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
pub mod cache;
pub mod command;
pub mod config;
pub mod encoder;
pub mod engines;
pub mod error;
pub mod fallback;
pub mod params;
pub mod pipeline;
pub mod process;
pub mod voice;

pub use cache::{CacheKey, CacheStore};
pub use config::{HostEngineChoice, PipelineConfig};
pub use engines::{BuiltInEngine, SynthesisEngine};
pub use error::{
    CacheError, EncodingError, EngineError, FallbackError, PipelineError, ValidationError,
};
pub use fallback::EngineRoute;
pub use params::{AudioFormat, EncodingSpec, SynthesisParams};
pub use pipeline::{ArtifactResult, ArtifactSource, Pipeline, SynthesisRequest};
pub use process::{CancellationToken, ProcessRunner};
pub use voice::{Gender, LicenseInfo, VoiceDescriptor, VoiceSource};
