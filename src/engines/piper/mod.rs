//! Piper text-to-speech engine.
//!
//! The primary engine. Drives an external `piper` binary with a distributable
//! ONNX voice model; the request text is streamed on stdin and the engine
//! writes a WAV file at the model's native sample rate.
//!
//! # System Requirements
//!
//! **piper** must be on `PATH` (or configured explicitly):
//! - Releases: <https://github.com/rhasspy/piper/releases>
//!
//! # Model Layout
//!
//! ```text
//! voices/
//! ├── en_US-ljspeech-medium.onnx
//! └── en_US-ljspeech-medium.onnx.json
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use tts_forge::engines::{EngineJob, ModelVoice, SynthesisEngine};
//! use tts_forge::engines::piper::PiperEngine;
//! use tts_forge::{CancellationToken, ProcessRunner, SynthesisParams};
//!
//! let engine = PiperEngine::new(ProcessRunner::new());
//! let params = SynthesisParams::default();
//! let job = EngineJob {
//!     text: "Hello world.",
//!     language: "en-US",
//!     params: &params,
//!     output: Path::new("/tmp/hello.wav"),
//! };
//! let voice = ModelVoice {
//!     path: "voices/en_US-ljspeech-medium.onnx".into(),
//!     sample_rate: 22_050,
//! };
//! let raw = engine.synthesize(&job, &voice, &CancellationToken::new())?;
//! println!("{} bytes at {} Hz", raw.size_bytes, raw.sample_rate);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod engine;

pub use engine::PiperEngine;
