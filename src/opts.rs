use std::time::Duration;

/// Default upper bound on a single voice generation request.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Options that control generation and export.
///
/// This struct represents *library-level configuration*, not CLI flags directly.
/// The CLI maps user input into this type so other frontends (servers, tests)
/// can construct options programmatically.
#[derive(Debug, Clone)]
pub struct Opts {
    /// How long a single TTS request may run before the line is marked failed.
    pub generation_timeout: Duration,

    /// File name of the combined WAV export.
    pub combined_filename: String,

    /// Prefix for per-line fallback files (`<prefix>-<position>.<ext>`).
    pub individual_prefix: String,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            combined_filename: "complete-voice-skit.wav".to_owned(),
            individual_prefix: "voice-skit-line".to_owned(),
        }
    }
}
