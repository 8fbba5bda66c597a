//! In-process WAV helpers.
//!
//! Used to write placeholder artifacts in dry-run mode and to read back the
//! format of whatever an engine produced.

use std::path::Path;
use std::time::Duration;

/// Raw mono audio samples.
#[derive(Debug)]
pub struct PcmClip {
    /// Raw audio samples as f32 values
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PcmClip {
    /// A clip of digital silence.
    pub fn silence(sample_rate: u32, duration: Duration) -> Self {
        let len = (duration.as_secs_f64() * sample_rate as f64).round() as usize;
        Self {
            samples: vec![0.0; len],
            sample_rate,
        }
    }

    /// Write the audio to a 16-bit PCM mono WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            let clamped = sample.clamp(-1.0, 1.0);
            writer.write_sample((clamped * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Format details read from a WAV header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub duration: Duration,
}

/// Read the header of a WAV file. `None` if the file is not a readable WAV.
pub fn probe_wav(path: &Path) -> Option<WavInfo> {
    let reader = hound::WavReader::open(path).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 || spec.channels == 0 {
        return None;
    }
    // `duration` counts frames, not interleaved samples
    let frames = reader.duration() as f64;
    Some(WavInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        duration: Duration::from_secs_f64(frames / spec.sample_rate as f64),
    })
}
