//! eSpeak NG, the built-in engine on Linux and Windows hosts.

use std::path::Path;

use crate::command::Invocation;
use crate::engines::SystemVoice;
use crate::voice::Gender;

pub const DEFAULT_RATE_WPM: f32 = 175.0;
/// espeak-ng writes WAV at 22.05 kHz.
pub const OUTPUT_SAMPLE_RATE: u32 = 22_050;

/// `<language>+<variant>`, e.g. `en-us+f3`.
pub fn select_voice(gender: Gender, language: &str) -> SystemVoice {
    let lang = if language.is_empty() {
        "en".to_string()
    } else {
        language.to_ascii_lowercase().replace('_', "-")
    };
    let variant = match gender {
        Gender::Male => "+m3",
        Gender::Female => "+f3",
        Gender::Neutral => "",
    };
    SystemVoice::named(format!("{lang}{variant}"))
}

pub fn speaking_rate(speed: f32) -> u32 {
    (DEFAULT_RATE_WPM * speed).round() as u32
}

pub fn espeak_invocation(
    binary: &Path,
    voice: &SystemVoice,
    rate: u32,
    output: &Path,
) -> Invocation {
    Invocation::new(binary)
        .flag("-v", voice.name.as_str())
        .flag("-s", rate.to_string())
        .flag("-w", output.display().to_string())
        .arg("--stdin")
}
