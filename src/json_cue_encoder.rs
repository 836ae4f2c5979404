use std::io::Write;

use anyhow::Result;

use crate::cue::Cue;
use crate::cue_encoder::CueEncoder;

/// A `CueEncoder` that emits cues as one JSON array.
///
/// Cues are serialized as they arrive rather than collected first, so the
/// encoder carries enough state to keep the array well-formed across calls:
/// the opening bracket is written lazily, commas go before every element
/// after the first, and `close` supplies the closing bracket. An encoder
/// that never sees a cue still closes to valid JSON (`[]`).
pub struct JsonCueEncoder<W: Write> {
    w: W,
    started: bool,
    first: bool,
    closed: bool,
}

impl<W: Write> JsonCueEncoder<W> {
    pub fn new(w: W) -> Self {
        Self {
            w,
            started: false,
            first: true,
            closed: false,
        }
    }

    fn start_if_needed(&mut self) -> Result<()> {
        if !self.started {
            self.w.write_all(b"[")?;
            self.started = true;
        }
        Ok(())
    }
}

impl<W: Write> CueEncoder for JsonCueEncoder<W> {
    fn write_cue(&mut self, cue: &Cue) -> Result<()> {
        if self.closed {
            anyhow::bail!("cannot write cue: encoder is already closed");
        }

        self.start_if_needed()?;

        if !self.first {
            self.w.write_all(b",")?;
        }
        self.first = false;

        serde_json::to_writer(&mut self.w, cue)?;
        self.w.flush()?;

        Ok(())
    }

    /// Terminate the array and flush. Idempotent; writes are rejected afterwards.
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        self.start_if_needed()?;
        self.w.write_all(b"]")?;
        self.w.flush()?;

        self.closed = true;
        Ok(())
    }
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
    fn json_close_without_cues_emits_empty_array() -> anyhow::Result<()> {
        let mut out = Vec::new();
        let mut enc = JsonCueEncoder::new(&mut out);
        enc.close()?;
        assert_eq!(std::str::from_utf8(&out)?, "[]");
        Ok(())
    }

    #[test]
    fn json_emits_comma_separated_elements() -> anyhow::Result<()> {
        let mut out = Vec::new();
        let mut enc = JsonCueEncoder::new(&mut out);

        enc.write_cue(&cue(1, 0.0, 5.0, "hello"))?;
        enc.write_cue(&cue(2, 5.0, 10.0, "world"))?;
        enc.close()?;

        let parsed: serde_json::Value = serde_json::from_slice(&out)?;
        let arr = parsed.as_array().expect("expected a JSON array");
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[0]["index"], 1);
        assert_eq!(arr[1]["text"], "world");
        Ok(())
    }

    #[test]
    fn json_close_is_idempotent() -> anyhow::Result<()> {
        let mut out = Vec::new();
        let mut enc = JsonCueEncoder::new(&mut out);
        enc.write_cue(&cue(1, 0.0, 5.0, "hello"))?;
        enc.close()?;
        enc.close()?;
        let parsed: serde_json::Value = serde_json::from_slice(&out)?;
        assert!(parsed.is_array());
        Ok(())
    }

    #[test]
    fn json_write_after_close_errors() -> anyhow::Result<()> {
        let mut out = Vec::new();
        let mut enc = JsonCueEncoder::new(&mut out);
        enc.close()?;
        let err = enc.write_cue(&cue(1, 0.0, 1.0, "nope")).unwrap_err();
        assert!(err.to_string().contains("already closed"));
        Ok(())
    }
}
