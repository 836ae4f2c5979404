/// Options that control how a raw transcript is formatted into subtitles.
///
/// This struct represents *library-level configuration*, not CLI flags directly.
/// The CLI and server are responsible for mapping user input into this type so that:
/// - the library remains reusable outside of a CLI context
/// - other frontends (APIs, tests, batch jobs) can construct options programmatically
#[derive(Debug, Clone, Copy)]
pub struct FormatOpts {
    /// Fixed duration, in seconds, assigned to each generated cue.
    ///
    /// Note:
    /// - This is a placeholder timing heuristic. The window is NOT derived
    ///   from the actual audio; generated timestamps will desynchronize from
    ///   real speech for any non-trivial input. It exists so that raw model
    ///   output still yields a well-formed SRT document.
    pub window_seconds: f64,
}

impl Default for FormatOpts {
    fn default() -> Self {
        Self {
            window_seconds: DEFAULT_WINDOW_SECONDS,
        }
    }
}

/// Default per-cue duration used by the fixed-window fallback.
pub const DEFAULT_WINDOW_SECONDS: f64 = 5.0;
