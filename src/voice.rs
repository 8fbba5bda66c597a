//! Voice descriptors as produced by a catalog loader.
//!
//! A descriptor is loaded once per process and shared read-only. Whether a
//! voice needs a model file or is provided by the platform is an explicit
//! tag ([`VoiceSource`]); the fallback coordinator dispatches on it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Voice gender, used to pick a built-in fallback voice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[default]
    Female,
    Male,
    Neutral,
}

impl Gender {
    /// Multi-speaker models put the default (female) speaker at index 0.
    pub fn from_speaker_index(index: u32) -> Self {
        if index > 0 {
            Self::Male
        } else {
            Self::Female
        }
    }
}

/// Where the audio for a voice comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VoiceSource {
    /// A distributable model driven by the primary engine.
    ModelFile { path: PathBuf, sample_rate: u32 },
    /// A voice provided by the platform's built-in engine. The name is
    /// backend specific: `say` voice names such as `"Samantha"`, or
    /// `espeak-ng` voice codes such as `"en-us+f3"`.
    BuiltIn { engine_voice: String },
}

/// Licensing flags. Carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub commercial_use_allowed: bool,
    #[serde(default)]
    pub attribution_required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceDescriptor {
    /// Stable catalog id (e.g. `"en_us_ljspeech_medium"`). Part of the cache key.
    pub id: String,
    pub source: VoiceSource,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub license: LicenseInfo,
}

impl VoiceDescriptor {
    pub fn model_file(id: impl Into<String>, path: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self::with_source(
            id,
            VoiceSource::ModelFile {
                path: path.into(),
                sample_rate,
            },
        )
    }

    pub fn built_in(id: impl Into<String>, engine_voice: impl Into<String>) -> Self {
        Self::with_source(
            id,
            VoiceSource::BuiltIn {
                engine_voice: engine_voice.into(),
            },
        )
    }

    fn with_source(id: impl Into<String>, source: VoiceSource) -> Self {
        Self {
            id: id.into(),
            source,
            language: String::new(),
            gender: Gender::default(),
            style: None,
            license: LicenseInfo::default(),
        }
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    #[must_use]
    pub fn with_gender(mut self, gender: Gender) -> Self {
        self.gender = gender;
        self
    }

    pub fn is_built_in(&self) -> bool {
        matches!(self.source, VoiceSource::BuiltIn { .. })
    }

    /// Native sample rate of the model, if the voice has one.
    pub fn native_sample_rate(&self) -> Option<u32> {
        match self.source {
            VoiceSource::ModelFile { sample_rate, .. } => Some(sample_rate),
            VoiceSource::BuiltIn { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speaker_index_maps_to_fallback_gender() {
        assert_eq!(Gender::from_speaker_index(0), Gender::Female);
        assert_eq!(Gender::from_speaker_index(3), Gender::Male);
    }

    #[test]
    fn parses_tagged_catalog_entries() {
        let json = r#"[
            {"id": "en_us_ljspeech_medium", "language": "en-US", "gender": "female",
             "source": {"kind": "model_file", "path": "voices/ljspeech.onnx", "sample_rate": 22050},
             "license": {"name": "Public Domain", "commercial_use_allowed": true}},
            {"id": "mac_samantha",
             "source": {"kind": "built_in", "engine_voice": "Samantha"}}
        ]"#;
        let voices: Vec<VoiceDescriptor> = serde_json::from_str(json).expect("valid catalog");

        assert!(!voices[0].is_built_in());
        assert_eq!(voices[0].native_sample_rate(), Some(22050));
        assert!(voices[0].license.commercial_use_allowed);

        assert!(voices[1].is_built_in());
        assert_eq!(voices[1].native_sample_rate(), None);
        assert_eq!(voices[1].gender, Gender::Female);
    }

    #[test]
    fn dotted_built_in_name_is_still_built_in() {
        // No path-shape guessing: the tag decides.
        let voice = VoiceDescriptor::built_in("custom", "Voices/Some.Voice");
        assert!(voice.is_built_in());
    }
}
