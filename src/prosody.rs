//! Pick voice settings from the shape of a line and the line before it.
//!
//! The voice proxy uses this so a question sounds curious, the reply to a question sounds
//! confident and an exclamation sounds dramatic.

use serde::Serialize;

/// Conversational tone inferred from text shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Question,
    Response,
    Exclamation,
    Neutral,
}

impl Tone {
    /// Classify `text`, given the previous line when there is one.
    ///
    /// Precedence: question, then response, then exclamation.
    pub fn classify(text: &str, previous_text: Option<&str>) -> Self {
        if is_question(text) {
            Tone::Question
        } else if previous_text.is_some_and(|prev| prev.trim().ends_with('?')) {
            Tone::Response
        } else if text.contains('!') {
            Tone::Exclamation
        } else {
            Tone::Neutral
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tone::Question => "question",
            Tone::Response => "response",
            Tone::Exclamation => "exclamation",
            Tone::Neutral => "neutral",
        }
    }

    pub fn voice_settings(self) -> VoiceSettings {
        let (stability, similarity_boost, style) = match self {
            Tone::Question => (0.3, 0.7, 0.2),
            Tone::Response => (0.6, 0.8, 0.1),
            Tone::Exclamation => (0.2, 0.75, 0.4),
            Tone::Neutral => (0.5, 0.75, 0.0),
        };
        VoiceSettings {
            stability,
            similarity_boost,
            style,
            use_speaker_boost: true,
        }
    }
}

/// Provider voice settings sent with a synthesis request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

const QUESTION_WORDS: [&str; 6] = ["what", "why", "how", "when", "where", "who"];

// Substring match on purpose: "somehow" counts as a question.
fn is_question(text: &str) -> bool {
    if text.trim().ends_with('?') {
        return true;
    }
    let lower = text.to_lowercase();
    QUESTION_WORDS.iter().any(|w| lower.contains(w))
}
