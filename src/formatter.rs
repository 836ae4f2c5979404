//! Conversion of raw model output into an SRT subtitle document.
//!
//! The upstream model is asked for SRT and sometimes returns it. When it does,
//! we pass its output through untouched. When it returns plain text instead,
//! we fall back to a naive fixed-window segmentation: each non-blank line
//! becomes one cue of `FormatOpts::window_seconds` duration.
//!
//! The fallback timing is a placeholder, not inferred from the audio. Callers
//! that need accurate timing need a provider that emits real timestamps.

use crate::cue::Cue;
use crate::cue_encoder::CueEncoder;
use crate::opts::FormatOpts;
use crate::srt_encoder::SrtEncoder;

/// Convert raw transcript text into an SRT document string.
///
/// Behavior:
/// - Already-SRT-shaped input (see [`looks_like_srt`]) is returned unchanged,
///   so the function is idempotent on its own output.
/// - Anything else is segmented line-by-line into fixed-width cues.
/// - Empty or all-blank input yields an empty string.
///
/// This function has no error conditions.
pub fn format_transcript(text: &str, opts: &FormatOpts) -> String {
    if looks_like_srt(text) {
        // The upstream model already produced SRT. We trust it without
        // re-validating individual cues.
        return text.to_owned();
    }

    let cues = segment_lines(text, opts);

    let mut out = Vec::new();
    let mut enc = SrtEncoder::new(&mut out);
    for cue in &cues {
        enc.write_cue(cue)
            .expect("writing to an in-memory buffer cannot fail");
    }
    enc.close()
        .expect("closing an in-memory buffer cannot fail");
    drop(enc);

    String::from_utf8(out).expect("SRT encoder emits UTF-8")
}

/// Whether `text` already looks like an SRT document.
///
/// Shape check only: the first non-empty line must be a bare integer (a cue
/// index) and the line immediately after it must contain the `-->` timing
/// arrow. Deeper validation is deliberately skipped.
pub fn looks_like_srt(text: &str) -> bool {
    let mut lines = text.lines().skip_while(|line| line.trim().is_empty());

    let Some(first) = lines.next() else {
        return false;
    };
    if first.trim().parse::<u64>().is_err() {
        return false;
    }

    matches!(lines.next(), Some(second) if second.contains("-->"))
}

/// Segment plain text into fixed-width cues.
///
/// Each non-blank line becomes one cue; survivor `i` (1-based) occupies
/// `[(i-1)*W, i*W)` seconds where `W` is `opts.window_seconds`. Indices are
/// contiguous among survivors, so blank lines in the input never leave gaps
/// in the cue numbering.
pub fn segment_lines(text: &str, opts: &FormatOpts) -> Vec<Cue> {
    let w = opts.window_seconds;

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, line)| {
            let index = i as u32 + 1;
            Cue {
                index,
                start_seconds: f64::from(index - 1) * w,
                end_seconds: f64::from(index) * w,
                text: line.to_owned(),
            }
        })
        .collect()
}
