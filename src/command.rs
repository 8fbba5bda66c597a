//! Inspectable process invocations.
//!
//! An [`Invocation`] is built, compared and printed without ever being run,
//! so tests can assert on exact argument vectors. The same logical request
//! always yields a byte-identical invocation: every numeric argument uses a
//! fixed three-decimal format.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;

use crate::params::SynthesisParams;

/// Program plus ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Push a `--flag value` pair.
    pub fn flag(self, flag: &str, value: impl Into<String>) -> Self {
        self.arg(flag).arg(value)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Value following `flag`, if present.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// Single-line rendering for logs and diagnostics.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    pub(crate) fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Format a float argument with fixed three-decimal precision.
pub fn fixed3(value: f32) -> String {
    format!("{:.3}", value)
}

/// Inverse of speed: higher speed means shorter output.
pub fn length_scale(speed: f32) -> f32 {
    1.0 / speed
}

/// Build the model-driven engine invocation. Text is fed on stdin.
///
/// Expects parameters that already passed [`crate::params::validate_synthesis`].
pub fn piper_invocation(
    binary: &Path,
    params: &SynthesisParams,
    model_path: &Path,
    output_path: &Path,
) -> Invocation {
    let invocation = Invocation::new(binary)
        .flag("--model", model_path.display().to_string())
        .flag("--output_file", output_path.display().to_string())
        .flag("--length_scale", fixed3(length_scale(params.speed)))
        .flag("--noise_scale", fixed3(params.noise))
        .flag("--noise_w", fixed3(params.noise_width));

    if params.speaker_index > 0 {
        invocation.flag("--speaker", params.speaker_index.to_string())
    } else {
        invocation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(params: &SynthesisParams) -> Invocation {
        piper_invocation(
            Path::new("piper"),
            params,
            Path::new("/voices/en_us_ljspeech_medium.onnx"),
            Path::new("/tmp/out.wav"),
        )
    }

    #[test]
    fn golden_descriptor() {
        let params = SynthesisParams {
            speed: 1.0,
            noise: 0.5,
            noise_width: 0.8,
            speaker_index: 0,
        };
        assert_eq!(
            build(&params).command_line(),
            "piper --model /voices/en_us_ljspeech_medium.onnx --output_file /tmp/out.wav \
             --length_scale 1.000 --noise_scale 0.500 --noise_w 0.800"
        );
    }

    #[test]
    fn speed_becomes_inverse_length_scale() {
        let params = SynthesisParams {
            speed: 1.03,
            noise: 0.667,
            noise_width: 0.8,
            speaker_index: 0,
        };
        let inv = build(&params);
        assert_eq!(inv.value_of("--length_scale"), Some("0.971"));
        assert_eq!(inv.value_of("--noise_scale"), Some("0.667"));

        let fast = build(&SynthesisParams { speed: 2.0, ..params });
        assert_eq!(fast.value_of("--length_scale"), Some("0.500"));
        let slow = build(&SynthesisParams { speed: 0.5, ..params });
        assert_eq!(slow.value_of("--length_scale"), Some("2.000"));
    }

    #[test]
    fn identical_inputs_give_identical_descriptors() {
        let params = SynthesisParams::default();
        assert_eq!(build(&params), build(&params));
        assert_eq!(build(&params).command_line(), build(&params).command_line());
    }

    #[test]
    fn speaker_flag_only_for_nonzero_index() {
        let params = SynthesisParams::default();
        assert_eq!(build(&params).value_of("--speaker"), None);

        let multi = SynthesisParams {
            speaker_index: 4,
            ..params
        };
        assert_eq!(build(&multi).value_of("--speaker"), Some("4"));
    }
}
