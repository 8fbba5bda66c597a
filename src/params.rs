//! Synthesis and encoding parameters, and the validator that bounds them.
//!
//! Validation runs before anything touches the filesystem or spawns a
//! process. Fields are checked in a fixed order and the first violation wins.

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const SPEED_RANGE: RangeInclusive<f32> = 0.5..=2.0;
pub const NOISE_RANGE: RangeInclusive<f32> = 0.0..=1.0;
pub const SAMPLE_RATE_RANGE: RangeInclusive<u32> = 8_000..=192_000;
pub const MP3_BITRATE_RANGE: RangeInclusive<u32> = 64..=320;
pub const LOUDNESS_RANGE: RangeInclusive<f32> = -30.0..=-6.0;

/// Parameters handed to the synthesis engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynthesisParams {
    /// Speech speed multiplier. Range: 0.5–2.0.
    pub speed: f32,
    /// Phoneme noise for naturalness. Range: 0.0–1.0.
    pub noise: f32,
    /// Phoneme width noise. Range: 0.0–1.0.
    pub noise_width: f32,
    /// Speaker id for multi-speaker models.
    pub speaker_index: u32,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            speed: 1.03,
            noise: 0.667,
            noise_width: 0.8,
            speaker_index: 0,
        }
    }
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// How the raw engine output is post-processed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncodingSpec {
    pub format: AudioFormat,
    /// Target sample rate in Hz.
    pub sample_rate: u32,
    /// Constant bitrate in kbps. Only meaningful for mp3.
    pub bitrate: u32,
    /// Integrated loudness target in LUFS.
    pub loudness_lufs: f32,
}

impl Default for EncodingSpec {
    fn default() -> Self {
        Self {
            format: AudioFormat::Mp3,
            sample_rate: 48_000,
            bitrate: 192,
            loudness_lufs: -16.0,
        }
    }
}

fn range_text<T: fmt::Display>(range: &RangeInclusive<T>) -> String {
    format!("[{}, {}]", range.start(), range.end())
}

fn check_f32(
    field: &'static str,
    value: f32,
    range: &RangeInclusive<f32>,
) -> Result<(), ValidationError> {
    // NaN never lies inside a range
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::new(field, value, range_text(range)))
    }
}

/// Check synthesis parameters: speed, noise, noise width.
///
/// `speaker_index` is unsigned, so the `>= 0` bound holds by construction.
pub fn validate_synthesis(params: &SynthesisParams) -> Result<(), ValidationError> {
    check_f32("speed", params.speed, &SPEED_RANGE)?;
    check_f32("noise", params.noise, &NOISE_RANGE)?;
    check_f32("noise_width", params.noise_width, &NOISE_RANGE)?;
    Ok(())
}

/// Check encoding parameters: sample rate, bitrate (mp3 only), loudness.
pub fn validate_encoding(spec: &EncodingSpec) -> Result<(), ValidationError> {
    if !SAMPLE_RATE_RANGE.contains(&spec.sample_rate) {
        return Err(ValidationError::new(
            "sample_rate",
            spec.sample_rate,
            range_text(&SAMPLE_RATE_RANGE),
        ));
    }
    if spec.format == AudioFormat::Mp3 && !MP3_BITRATE_RANGE.contains(&spec.bitrate) {
        return Err(ValidationError::new(
            "bitrate",
            spec.bitrate,
            range_text(&MP3_BITRATE_RANGE),
        ));
    }
    check_f32("loudness_lufs", spec.loudness_lufs, &LOUDNESS_RANGE)
}

/// Validate everything a run needs, synthesis parameters first.
pub fn validate(params: &SynthesisParams, spec: &EncodingSpec) -> Result<(), ValidationError> {
    validate_synthesis(params)?;
    validate_encoding(spec)
}
