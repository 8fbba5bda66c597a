use std::fmt;

use serde::{Deserialize, Serialize};

use crate::command::fixed3;
use crate::params::{EncodingSpec, SynthesisParams};

/// Bumped whenever the set or encoding of hashed fields changes.
const KEY_DOMAIN: &str = "tts-forge/cache-key/v1";

/// Content address of a finished artifact.
///
/// A hex BLAKE3 digest over exactly the fields that change the audio bytes:
/// the sentences (in order, verbatim), the voice id, speed, noise and noise
/// width, and the output format, sample rate and bitrate. Nothing else
/// participates, so output paths, languages and entry metadata never change
/// the key.
///
/// Floats are hashed through the same fixed 3-decimal rendering used on the
/// engine command line, so two requests that produce the same invocation
/// share a key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn generate(
        sentences: &[String],
        voice_id: &str,
        params: &SynthesisParams,
        spec: &EncodingSpec,
    ) -> Self {
        let mut hasher = blake3::Hasher::new();
        let mut field = |bytes: &[u8]| {
            // length prefix keeps ["ab", "c"] and ["a", "bc"] apart
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        };

        field(KEY_DOMAIN.as_bytes());
        field(&(sentences.len() as u64).to_le_bytes());
        for sentence in sentences {
            field(sentence.as_bytes());
        }
        field(voice_id.as_bytes());
        field(fixed3(params.speed).as_bytes());
        field(fixed3(params.noise).as_bytes());
        field(fixed3(params.noise_width).as_bytes());
        field(spec.format.extension().as_bytes());
        field(&spec.sample_rate.to_le_bytes());
        field(&spec.bitrate.to_le_bytes());

        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
