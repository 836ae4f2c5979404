use serde::Serialize;

/// One timed subtitle entry.
///
/// Cues are produced by the formatter's fixed-window segmentation and consumed
/// by the output encoders. Timestamps are elapsed seconds from the start of the
/// audio; `f64` so millisecond precision survives hour-scale offsets.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Cue {
    /// 1-based position of this cue in the document. Contiguous.
    pub index: u32,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub text: String,
}
