//! macOS `say`.
//!
//! `say` reads the text from stdin when no message or input file is given,
//! and can write a 16-bit little-endian WAV directly with `--file-format`.

use std::path::Path;

use crate::command::Invocation;
use crate::engines::SystemVoice;
use crate::voice::Gender;

/// Default speaking rate in words per minute.
pub const DEFAULT_RATE_WPM: f32 = 175.0;
/// Greek voices are slowed down for clearer pronunciation.
pub const GREEK_RATE_WPM: f32 = 160.0;
/// Sample rate requested from `say`.
pub const OUTPUT_SAMPLE_RATE: u32 = 22_050;

fn is_greek(language: &str) -> bool {
    language.to_ascii_lowercase().starts_with("el")
}

/// Pick a system voice. Greek always gets Melina.
pub fn select_voice(gender: Gender, language: &str) -> SystemVoice {
    let name = if is_greek(language) {
        "Melina"
    } else {
        match gender {
            Gender::Male => "Alex",
            Gender::Female | Gender::Neutral => "Samantha",
        }
    };
    SystemVoice::named(name)
}

/// Words per minute for `-r`, scaled by the speed multiplier.
pub fn speaking_rate(language: &str, speed: f32) -> u32 {
    let base = if is_greek(language) {
        GREEK_RATE_WPM
    } else {
        DEFAULT_RATE_WPM
    };
    (base * speed).round() as u32
}

pub fn say_invocation(binary: &Path, voice: &SystemVoice, rate: u32, output: &Path) -> Invocation {
    Invocation::new(binary)
        .flag("-v", voice.name.as_str())
        .flag("-r", rate.to_string())
        .flag("-o", output.display().to_string())
        .arg("--file-format=WAVE")
        .arg(format!("--data-format=LEI16@{OUTPUT_SAMPLE_RATE}"))
}
