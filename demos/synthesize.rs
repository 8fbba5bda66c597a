use std::path::{Path, PathBuf};
use std::time::Instant;

use tts_forge::{
    CancellationToken, EncodingSpec, Pipeline, PipelineConfig, SynthesisRequest,
    VoiceDescriptor,
};

/// Usage: `cargo run --example synthesize [config.json]`
///
/// Without a config file the pipeline runs in dry-run mode, so no engine or
/// encoder needs to be installed.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => PipelineConfig::from_json_file(Path::new(&path))?,
        None => PipelineConfig::builder().dry_run(true).build()?,
    };
    println!("dry run: {}", config.dry_run);

    let pipeline = Pipeline::new(config)?;
    let voice = VoiceDescriptor::model_file(
        "en_us_ljspeech_medium",
        "voices/en_US-ljspeech-medium.onnx",
        22_050,
    )
    .with_language("en-US");
    let request = SynthesisRequest::new(
        [
            "Hello world.",
            "This sentence was synthesized, normalized and cached.",
        ],
        "en-US",
    );
    let encoding = EncodingSpec::default();
    let output = PathBuf::from("output.mp3");

    for attempt in 1..=2 {
        let start = Instant::now();
        let result = pipeline.run(
            &request,
            &voice,
            &encoding,
            &output,
            &CancellationToken::new(),
        )?;
        println!(
            "run {attempt}: {:?} in {:.2?}, {} bytes at {} Hz, key {}",
            result.source,
            start.elapsed(),
            result.size_bytes,
            result.sample_rate,
            result.cache_key
        );
    }
    println!("Saved to {}", output.display());

    if let Some(cache) = pipeline.cache() {
        let report = cache.prune()?;
        println!("prune: {}", serde_json::to_string(&report)?);
        println!("cache: {}", serde_json::to_string_pretty(&cache.stats())?);
    }
    println!("processes spawned: {}", pipeline.process_runner().spawn_count());

    Ok(())
}
