// A small CLI to convert raw transcript text into subtitles on stdout.
//
// Useful for reformatting transcripts that came from somewhere else (or from a
// saved model response) without running the server.

use anyhow::{Context, Result};
use clap::Parser;

use std::io::{self, BufWriter, Read};

use subgen::cue_encoder::CueEncoder;
use subgen::formatter::{looks_like_srt, segment_lines};
use subgen::json_cue_encoder::JsonCueEncoder;
use subgen::opts::FormatOpts;
use subgen::output_type::OutputType;
use subgen::srt_encoder::SrtEncoder;

#[derive(Parser, Debug)]
#[command(name = "subgen-cli")]
#[command(about = "Convert raw transcript text to SRT or JSON cues")]
struct Params {
    /// Path to a transcript text file, or `-` for stdin.
    #[arg(short = 'i', long = "input", default_value = "-")]
    input: String,

    #[arg(
        short = 'o',
        long = "output-type",
        value_enum,
        default_value_t = OutputType::Srt
    )]
    output_type: OutputType,

    /// Per-cue duration (seconds) for the fixed-window fallback.
    #[arg(short = 'w', long = "window-seconds", default_value_t = 5.0, value_parser = parse_window_seconds)]
    window_seconds: f64,
}

/// Cue windows must be positive and finite, or every generated cue would
/// violate `end > start`.
fn parse_window_seconds(raw: &str) -> std::result::Result<f64, String> {
    let value: f64 = raw.parse().map_err(|err| format!("invalid number: {err}"))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err("window seconds must be greater than zero".to_owned())
    }
}

fn main() -> Result<()> {
    subgen::init_logging();
    let params = Params::parse();

    let text = read_input(&params.input)?;
    let opts = FormatOpts {
        window_seconds: params.window_seconds,
    };

    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());

    // Already-SRT input passes through untouched, same as the service does.
    if matches!(params.output_type, OutputType::Srt) && looks_like_srt(&text) {
        use std::io::Write;
        writer.write_all(text.as_bytes())?;
        writer.flush()?;
        return Ok(());
    }

    let cues = segment_lines(&text, &opts);

    let mut encoder: Box<dyn CueEncoder> = match params.output_type {
        OutputType::Srt => Box::new(SrtEncoder::new(writer)),
        OutputType::Json => Box::new(JsonCueEncoder::new(writer)),
    };

    for cue in &cues {
        encoder.write_cue(cue)?;
    }
    encoder.close()?;

    Ok(())
}

fn read_input(path: &str) -> Result<String> {
    if path == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("failed to read stdin")?;
        return Ok(text);
    }

    std::fs::read_to_string(path).with_context(|| format!("failed to read '{path}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_window_seconds_rejects_non_positive_values() {
        assert_eq!(parse_window_seconds("5"), Ok(5.0));
        assert!(parse_window_seconds("0").is_err());
        assert!(parse_window_seconds("-1.5").is_err());
        assert!(parse_window_seconds("NaN").is_err());
    }
}
