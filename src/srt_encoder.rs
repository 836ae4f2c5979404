use anyhow::Result;
use std::io::Write;

use crate::cue::Cue;
use crate::cue_encoder::CueEncoder;

/// A `CueEncoder` that writes cues in SubRip (SRT) format.
///
/// Design:
/// - We stream output directly to a `Write` implementation.
/// - SRT has no file header; a blank line separates consecutive cues, so we
///   write the separator *before* every cue except the first. This keeps the
///   document free of a trailing blank line and makes `close` a pure flush.
pub struct SrtEncoder<W: Write> {
    /// The underlying writer we stream SRT into.
    w: W,

    /// Whether the next cue will be the first cue in the document.
    /// This lets us correctly place blank-line separators between cues.
    first: bool,

    /// Whether the encoder has been closed.
    closed: bool,
}

impl<W: Write> SrtEncoder<W> {
    /// Create a new SRT encoder that writes to the provided writer.
    pub fn new(w: W) -> Self {
        Self {
            w,
            first: true,
            closed: false,
        }
    }
}

impl<W: Write> CueEncoder for SrtEncoder<W> {
    /// Write a single cue in SRT format.
    fn write_cue(&mut self, cue: &Cue) -> Result<()> {
        if self.closed {
            anyhow::bail!("cannot write cue: encoder is already closed");
        }

        if !self.first {
            // Blank line separates cues.
            writeln!(&mut self.w)?;
        }
        self.first = false;

        // Cue index line (1-based).
        writeln!(&mut self.w, "{}", cue.index)?;

        // SRT timestamps use `HH:MM:SS,mmm`.
        let start = format_timestamp_srt(cue.start_seconds);
        let end = format_timestamp_srt(cue.end_seconds);

        // Cue timing line.
        writeln!(&mut self.w, "{start} --> {end}")?;

        // Cue text. (We write it verbatim; if we later want to sanitize/escape,
        // this is where we'd do it.)
        writeln!(&mut self.w, "{}", cue.text)?;

        // Flush so streaming consumers (stdout, pipes, sockets) see output promptly.
        self.w.flush()?;

        Ok(())
    }

    /// Flush the underlying writer. This is idempotent.
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        self.w.flush()?;
        self.closed = true;

        Ok(())
    }
}

/// Format seconds into an SRT timestamp (`HH:MM:SS,mmm`).
///
/// Rounding policy:
/// - We truncate (not round) any fractional remainder to the millisecond.
///   `1.4999` renders as `,499`, `1.5` as `,500`.
pub fn format_timestamp_srt(seconds: f64) -> String {
    let total_ms = (seconds * 1000.0) as u64;

    let ms = total_ms % 1000;
    let total_s = total_ms / 1000;

    let s = total_s % 60;
    let total_m = total_s / 60;

    let m = total_m % 60;
    let h = total_m / 60;

    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cue(index: u32, start: f64, end: f64, text: &str) -> Cue {
        Cue {
            index,
            start_seconds: start,
            end_seconds: end,
            text: text.to_string(),
        }
    }

    #[test]
    fn srt_close_without_cues_emits_nothing() -> anyhow::Result<()> {
        let mut out = Vec::new();
        let mut enc = SrtEncoder::new(&mut out);
        enc.close()?;
        assert_eq!(std::str::from_utf8(&out)?, "");
        Ok(())
    }

    #[test]
    fn srt_separates_cues_with_a_single_blank_line() -> anyhow::Result<()> {
        let mut out = Vec::new();
        let mut enc = SrtEncoder::new(&mut out);

        enc.write_cue(&cue(1, 0.0, 5.0, "hello"))?;
        enc.write_cue(&cue(2, 5.0, 10.0, "world"))?;
        enc.close()?;

        let s = std::str::from_utf8(&out)?;
        assert_eq!(
            s,
            "1\n00:00:00,000 --> 00:00:05,000\nhello\n\n2\n00:00:05,000 --> 00:00:10,000\nworld\n"
        );
        Ok(())
    }

    #[test]
    fn srt_format_timestamp_zero() {
        assert_eq!(format_timestamp_srt(0.0), "00:00:00,000");
    }

    #[test]
    fn srt_format_timestamp_truncates_milliseconds() {
        // Truncation, not rounding.
        assert_eq!(format_timestamp_srt(1.4999), "00:00:01,499");
        assert_eq!(format_timestamp_srt(1.5), "00:00:01,500");
        assert_eq!(format_timestamp_srt(0.9999), "00:00:00,999");
        assert_eq!(format_timestamp_srt(3661.5005), "01:01:01,500");
    }

    #[test]
    fn srt_format_timestamp_rolls_over_units() {
        assert_eq!(format_timestamp_srt(59.999), "00:00:59,999");
        assert_eq!(format_timestamp_srt(60.0), "00:01:00,000");
        assert_eq!(format_timestamp_srt(3600.0), "01:00:00,000");
    }

    #[test]
    fn srt_write_after_close_errors() -> anyhow::Result<()> {
        let mut out = Vec::new();
        let mut enc = SrtEncoder::new(&mut out);
        enc.close()?;
        let err = enc.write_cue(&cue(1, 0.0, 1.0, "nope")).unwrap_err();
        assert!(err.to_string().contains("already closed"));
        Ok(())
    }
}
