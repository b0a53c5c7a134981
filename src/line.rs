use std::fmt;

use bytes::Bytes;
use uuid::Uuid;

/// Stable identifier of a dialogue line. Assigned once, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineId(Uuid);

impl LineId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where a line is in its generate lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Idle,
    Pending,
    Ready,
    Failed,
}

/// Which field `LineRegistry::update_line` replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineField {
    Text,
    Speaker,
}

/// One scripted utterance with an assigned speaker.
///
/// The generation state is derived from the stored fields so that `Ready` holds exactly
/// when a payload is visible:
/// - in flight → `Pending` (a payload from an earlier run is held back until it resolves)
/// - payload present → `Ready`
/// - last attempt failed and no payload → `Failed`
/// - otherwise `Idle`
#[derive(Debug, Clone)]
pub struct DialogueLine {
    id: LineId,
    pub(crate) text: String,
    pub(crate) speaker: String,
    pub(crate) payload: Option<Bytes>,
    pub(crate) pending: bool,
    pub(crate) last_error: Option<String>,
}

impl DialogueLine {
    /// A fresh `Idle` line.
    pub fn new(text: impl Into<String>, speaker: impl Into<String>) -> Self {
        Self {
            id: LineId::new(),
            text: text.into(),
            speaker: speaker.into(),
            payload: None,
            pending: false,
            last_error: None,
        }
    }

    /// A line that already carries generated audio.
    pub fn with_payload(
        text: impl Into<String>,
        speaker: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        let mut line = Self::new(text, speaker);
        line.payload = Some(payload.into());
        line
    }

    pub fn id(&self) -> LineId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn speaker(&self) -> &str {
        &self.speaker
    }

    /// The generated audio, visible only while the line is `Ready`.
    pub fn audio_payload(&self) -> Option<&Bytes> {
        if self.pending {
            return None;
        }
        self.payload.as_ref()
    }

    /// Message of the most recent failed attempt, cleared by the next success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn generation_state(&self) -> GenerationState {
        if self.pending {
            GenerationState::Pending
        } else if self.payload.is_some() {
            GenerationState::Ready
        } else if self.last_error.is_some() {
            GenerationState::Failed
        } else {
            GenerationState::Idle
        }
    }

    pub fn is_ready(&self) -> bool {
        self.generation_state() == GenerationState::Ready
    }

    pub(crate) fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}
