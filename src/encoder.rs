//! Post-processing of raw engine output with `ffmpeg`.
//!
//! Resample to the target rate, downmix to mono, normalize loudness (EBU R128
//! `loudnorm` with a fixed true-peak ceiling and loudness range), then encode
//! as 16-bit PCM WAV or constant-bitrate MP3.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::probe_wav;
use crate::command::Invocation;
use crate::engines::RawArtifact;
use crate::error::EncodingError;
use crate::params::{AudioFormat, EncodingSpec};
use crate::process::{CancellationToken, ProcessError, ProcessRunner};

/// True-peak ceiling in dBFS.
pub const TRUE_PEAK_DBFS: f32 = -1.0;
/// Loudness range target in LU.
pub const LOUDNESS_RANGE_LU: f32 = 7.0;

/// The finished, encoded file.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedArtifact {
    pub path: PathBuf,
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration: Duration,
    pub size_bytes: u64,
}

/// Filter graph: resample, downmix, normalize.
pub fn filter_chain(spec: &EncodingSpec) -> String {
    format!(
        "aresample={rate},aformat=channel_layouts=mono,loudnorm=I={i:.1}:TP={tp:.1}:LRA={lra:.1}",
        rate = spec.sample_rate,
        i = spec.loudness_lufs,
        tp = TRUE_PEAK_DBFS,
        lra = LOUDNESS_RANGE_LU,
    )
}

pub fn ffmpeg_invocation(
    binary: &Path,
    input: &Path,
    output: &Path,
    spec: &EncodingSpec,
) -> Invocation {
    let invocation = Invocation::new(binary)
        .arg("-hide_banner")
        .arg("-nostdin")
        .arg("-y")
        .flag("-i", input.display().to_string())
        .flag("-af", filter_chain(spec))
        .flag("-ac", "1");

    // loudnorm upsamples internally, so the output rate is pinned again here
    let invocation = match spec.format {
        AudioFormat::Mp3 => invocation
            .flag("-codec:a", "libmp3lame")
            .flag("-b:a", format!("{}k", spec.bitrate)),
        AudioFormat::Wav => invocation.flag("-codec:a", "pcm_s16le"),
    };

    invocation
        .flag("-ar", spec.sample_rate.to_string())
        .arg(output.display().to_string())
}

#[derive(Debug, Clone)]
pub struct Encoder {
    binary: PathBuf,
    runner: ProcessRunner,
    dry_run: bool,
}

impl Encoder {
    /// Create an encoder that uses `ffmpeg` from PATH.
    pub fn new(runner: ProcessRunner) -> Self {
        Self::with_binary("ffmpeg", runner)
    }

    pub fn with_binary(binary: impl Into<PathBuf>, runner: ProcessRunner) -> Self {
        Self {
            binary: binary.into(),
            runner,
            dry_run: false,
        }
    }

    /// In dry-run mode the raw artifact is copied through unchanged.
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    pub fn invocation(&self, input: &Path, output: &Path, spec: &EncodingSpec) -> Invocation {
        ffmpeg_invocation(&self.binary, input, output, spec)
    }

    /// Encode `raw` into `output`.
    ///
    /// Fails with [`EncodingError::EmptyOutput`] unless a non-empty file exists
    /// at `output` afterwards.
    pub fn encode(
        &self,
        raw: &RawArtifact,
        output: &Path,
        spec: &EncodingSpec,
        cancel: &CancellationToken,
    ) -> Result<EncodedArtifact, EncodingError> {
        if cancel.is_cancelled() {
            return Err(EncodingError::Cancelled);
        }
        if !raw.path.is_file() {
            return Err(EncodingError::MissingInput(raw.path.clone()));
        }

        let invocation = self.invocation(&raw.path, output, spec);

        if self.dry_run {
            log::debug!("dry run, not executing: {invocation}");
            fs::copy(&raw.path, output)?;
            let size_bytes = non_empty_size(output)?;
            return Ok(EncodedArtifact {
                path: output.to_path_buf(),
                format: spec.format,
                sample_rate: spec.sample_rate,
                channels: 1,
                duration: raw.duration,
                size_bytes,
            });
        }

        log::info!(
            "Encoding {} -> {} ({} @ {} Hz, {:.1} LUFS)",
            raw.path.display(),
            output.display(),
            spec.format,
            spec.sample_rate,
            spec.loudness_lufs
        );

        let result = self
            .runner
            .run(&invocation, None, cancel)
            .map_err(|e| match e {
                ProcessError::NotFound(program) => EncodingError::NotAvailable(program),
                ProcessError::Cancelled => EncodingError::Cancelled,
                ProcessError::Spawn { source, .. } | ProcessError::Io(source) => {
                    EncodingError::Io(source)
                }
            })?;

        if !result.success() {
            return Err(EncodingError::Execution {
                code: result.status.code(),
                diagnostic: last_lines(&result.diagnostic(), 5),
            });
        }

        let size_bytes = non_empty_size(output)?;
        let (sample_rate, channels, duration) = match spec.format {
            AudioFormat::Wav => probe_wav(output)
                .map(|info| (info.sample_rate, info.channels, info.duration))
                .unwrap_or((spec.sample_rate, 1, raw.duration)),
            AudioFormat::Mp3 => (spec.sample_rate, 1, raw.duration),
        };

        Ok(EncodedArtifact {
            path: output.to_path_buf(),
            format: spec.format,
            sample_rate,
            channels,
            duration,
            size_bytes,
        })
    }
}

fn non_empty_size(path: &Path) -> Result<u64, EncodingError> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => Ok(meta.len()),
        _ => Err(EncodingError::EmptyOutput(path.to_path_buf())),
    }
}

/// ffmpeg puts the actual error at the end of a long banner.
fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}
