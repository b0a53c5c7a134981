//! The ordered list of dialogue lines and their generation/playback state.
//!
//! `LineRegistry` is built for a single-threaded, event-driven host: every method takes
//! `&self`, state lives behind a `RefCell`, and no borrow is ever held across an `.await`.
//! A generation therefore splits into three steps:
//! 1. `begin_generation` validates and marks the line `Pending` (synchronous)
//! 2. the TTS collaborator call is awaited (other UI events may run here)
//! 3. `finish_generation` stores the outcome (synchronous)
//!
//! Because step 1 refuses lines that are already `Pending`, a second generate on the same line
//! while the first one is suspended is guarded rather than duplicated.

use std::cell::RefCell;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::line::{DialogueLine, GenerationState, LineField, LineId};
use crate::opts::Opts;
use crate::sequencer::run_sequential;
use crate::tts::{TtsClient, TtsRequest};
use crate::voice::{DEFAULT_SPEAKER, VoiceTable};
use crate::{Error, Result};

/// Per-run summary of `LineRegistry::generate_all`.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Lines generated successfully, in script order.
    pub succeeded: Vec<LineId>,
    /// Lines whose generation failed, in script order.
    pub failed: Vec<(LineId, Error)>,
}

impl BatchReport {
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// True when no line was eligible.
    pub fn is_empty(&self) -> bool {
        self.attempted() == 0
    }
}

#[derive(Debug, Default)]
struct State {
    lines: Vec<DialogueLine>,
    playing: Option<LineId>,
}

impl State {
    fn index_of(&self, id: LineId) -> Option<usize> {
        self.lines.iter().position(|l| l.id() == id)
    }

    fn line_mut(&mut self, id: LineId) -> Option<&mut DialogueLine> {
        self.lines.iter_mut().find(|l| l.id() == id)
    }
}

/// Owns the script and drives per-line and bulk voice generation through `C`.
pub struct LineRegistry<C> {
    client: C,
    voices: RefCell<VoiceTable>,
    opts: Opts,
    state: RefCell<State>,
}

impl<C: TtsClient> LineRegistry<C> {
    pub fn new(client: C, voices: VoiceTable, opts: Opts) -> Self {
        Self {
            client,
            voices: RefCell::new(voices),
            opts,
            state: RefCell::new(State::default()),
        }
    }

    /// Append an empty line for the default speaker.
    pub fn add_line(&self) -> LineId {
        let speaker = self.default_speaker();
        self.push_line(String::new(), speaker)
    }

    /// Append a line with the given text and speaker key.
    pub fn push_line(&self, text: impl Into<String>, speaker: impl Into<String>) -> LineId {
        let line = DialogueLine::new(text, speaker);
        let id = line.id();
        self.state.borrow_mut().lines.push(line);
        id
    }

    /// Delete a line. Returns `false` when no such line exists.
    pub fn remove_line(&self, id: LineId) -> bool {
        let mut state = self.state.borrow_mut();
        let Some(idx) = state.index_of(id) else {
            return false;
        };
        state.lines.remove(idx);
        if state.playing == Some(id) {
            state.playing = None;
        }
        true
    }

    /// Replace a line's text or speaker. Returns `false` when no such line exists.
    ///
    /// Existing audio is kept: it stays stale until the line is regenerated.
    pub fn update_line(&self, id: LineId, field: LineField, value: impl Into<String>) -> bool {
        let mut state = self.state.borrow_mut();
        let Some(line) = state.line_mut(id) else {
            return false;
        };
        match field {
            LineField::Text => line.text = value.into(),
            LineField::Speaker => line.speaker = value.into(),
        }
        true
    }

    /// Snapshot of every line in script order.
    pub fn lines(&self) -> Vec<DialogueLine> {
        self.state.borrow().lines.clone()
    }

    pub fn line(&self, id: LineId) -> Option<DialogueLine> {
        let state = self.state.borrow();
        state.lines.iter().find(|l| l.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().lines.is_empty()
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn voices(&self) -> VoiceTable {
        self.voices.borrow().clone()
    }

    /// Mutate the voice table (add or remove custom voices).
    pub fn update_voices<R>(&self, f: impl FnOnce(&mut VoiceTable) -> R) -> R {
        f(&mut self.voices.borrow_mut())
    }

    /// Validate a line and mark it `Pending`, returning the request to send.
    ///
    /// On error nothing changes.
    pub fn begin_generation(&self, id: LineId) -> Result<TtsRequest> {
        let mut state = self.state.borrow_mut();
        let idx = state
            .index_of(id)
            .ok_or_else(|| Error::validation(format!("no line with id {id}")))?;

        let line = &state.lines[idx];
        if line.pending {
            return Err(Error::Pending(id));
        }
        if !line.has_text() {
            return Err(Error::validation("enter some text for this line first"));
        }
        let voice_id = self
            .voices
            .borrow()
            .resolve(line.speaker())
            .map(str::to_owned)
            .ok_or_else(|| {
                Error::validation(format!("no voice configured for speaker '{}'", line.speaker()))
            })?;

        let previous_text = idx
            .checked_sub(1)
            .map(|prev| &state.lines[prev])
            .filter(|prev| prev.has_text())
            .map(|prev| prev.text().to_owned());

        let request = TtsRequest {
            text: line.text().to_owned(),
            voice_id,
            previous_text,
        };

        state.lines[idx].pending = true;
        if state.playing == Some(id) {
            state.playing = None;
        }
        Ok(request)
    }

    /// Store the outcome of a generation started with `begin_generation`.
    ///
    /// A failure keeps any payload from an earlier successful run. Outcomes for lines that were
    /// removed in the meantime are dropped.
    pub fn finish_generation(&self, id: LineId, outcome: Result<Bytes>) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let Some(line) = state.line_mut(id) else {
            debug!(%id, "line removed while generating; dropping result");
            return outcome.map(|_| ());
        };

        line.pending = false;
        match outcome {
            Ok(payload) => {
                line.payload = Some(payload);
                line.last_error = None;
                Ok(())
            }
            Err(err) => {
                line.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Generate audio for one line.
    ///
    /// Validation failures leave the line untouched. Collaborator failures (including the
    /// configured timeout) leave the line `Failed`, or `Ready` with its previous audio.
    pub async fn generate_line(&self, id: LineId) -> Result<()> {
        let request = self.begin_generation(id)?;
        debug!(%id, voice_id = %request.voice_id, has_previous = request.previous_text.is_some(), "generating line");

        let timeout = self.opts.generation_timeout;
        let outcome = match tokio::time::timeout(timeout, self.client.synthesize(&request)).await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::collaborator(
                None,
                format!("timed out after {}s", timeout.as_secs_f32()),
            )),
        };

        if let Err(err) = &outcome {
            warn!(%id, error = %err, "line generation failed");
        }
        self.finish_generation(id, outcome)
    }

    /// Generate every line that has text and no audio, one at a time, in script order.
    ///
    /// Lines that are already `Ready` are skipped; regenerating them is a per-line action.
    /// A failing line never stops the run.
    pub async fn generate_all(&self) -> BatchReport {
        let eligible: Vec<LineId> = self
            .state
            .borrow()
            .lines
            .iter()
            .filter(|l| l.has_text() && l.generation_state() != GenerationState::Ready)
            .filter(|l| !l.pending)
            .map(DialogueLine::id)
            .collect();

        if eligible.is_empty() {
            info!("nothing to generate");
            return BatchReport::default();
        }

        let outcomes = run_sequential(eligible, |id| self.generate_line(id)).await;

        let mut report = BatchReport::default();
        for outcome in outcomes {
            match outcome.result {
                Ok(()) => report.succeeded.push(outcome.item),
                Err(err) => report.failed.push((outcome.item, err)),
            }
        }

        info!(
            attempted = report.attempted(),
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "bulk generation finished"
        );
        report
    }

    /// Toggle playback of a line. Starting one line stops whichever line was playing.
    ///
    /// Returns `true` if the line is now playing. Lines without audio never play.
    pub fn play_line(&self, id: LineId) -> bool {
        let mut state = self.state.borrow_mut();
        let has_audio = state
            .lines
            .iter()
            .any(|l| l.id() == id && l.audio_payload().is_some());
        if !has_audio {
            return false;
        }

        if state.playing == Some(id) {
            state.playing = None;
            return false;
        }
        state.playing = Some(id);
        true
    }

    /// Mark playback of `id` as finished (e.g. the audio reached its end).
    pub fn playback_finished(&self, id: LineId) {
        let mut state = self.state.borrow_mut();
        if state.playing == Some(id) {
            state.playing = None;
        }
    }

    pub fn stop_playback(&self) {
        self.state.borrow_mut().playing = None;
    }

    pub fn playing(&self) -> Option<LineId> {
        self.state.borrow().playing
    }

    fn default_speaker(&self) -> String {
        let voices = self.voices.borrow();
        if voices.get(DEFAULT_SPEAKER).is_some() {
            return DEFAULT_SPEAKER.to_owned();
        }
        voices
            .voices()
            .first()
            .map(|v| v.key.clone())
            .unwrap_or_else(|| DEFAULT_SPEAKER.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::time::Duration;

    use super::*;

    /// Returns the request text as the payload, or fails for texts containing "fail".
    #[derive(Default)]
    struct EchoTts {
        requests: RefCell<Vec<TtsRequest>>,
    }

    impl TtsClient for EchoTts {
        async fn synthesize(&self, request: &TtsRequest) -> Result<Bytes> {
            self.requests.borrow_mut().push(request.clone());
            tokio::task::yield_now().await;
            if request.text.contains("fail") {
                return Err(Error::collaborator(Some(500), "boom"));
            }
            Ok(Bytes::from(request.text.clone().into_bytes()))
        }
    }

    struct SlowTts;

    impl TtsClient for SlowTts {
        async fn synthesize(&self, _request: &TtsRequest) -> Result<Bytes> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Bytes::new())
        }
    }

    fn registry() -> LineRegistry<EchoTts> {
        LineRegistry::new(EchoTts::default(), VoiceTable::builtin(), Opts::default())
    }

    #[test]
    fn add_remove_keeps_relative_order() {
        let reg = registry();
        let a = reg.add_line();
        let b = reg.add_line();
        let c = reg.add_line();
        let d = reg.add_line();

        assert!(reg.remove_line(b));
        assert!(!reg.remove_line(b));
        let e = reg.add_line();
        assert!(reg.remove_line(d));

        let ids: Vec<_> = reg.lines().iter().map(DialogueLine::id).collect();
        assert_eq!(ids, vec![a, c, e]);
    }

    #[test]
    fn add_line_uses_default_speaker_and_empty_text() {
        let reg = registry();
        let id = reg.add_line();
        let line = reg.line(id).expect("line exists");
        assert_eq!(line.text(), "");
        assert_eq!(line.speaker(), "peter");
        assert_eq!(line.generation_state(), GenerationState::Idle);
    }

    #[test]
    fn update_line_ignores_unknown_ids() {
        let reg = registry();
        let id = reg.add_line();
        reg.remove_line(id);
        assert!(!reg.update_line(id, LineField::Text, "x"));
    }

    #[tokio::test]
    async fn blank_text_is_a_validation_error_and_state_is_unchanged() {
        let reg = registry();
        let id = reg.push_line("   \n", "peter");

        let err = reg.generate_line(id).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(
            reg.line(id).map(|l| l.generation_state()),
            Some(GenerationState::Idle)
        );
        assert!(reg.client.requests.borrow().is_empty());
    }

    #[tokio::test]
    async fn unknown_speaker_is_a_validation_error() {
        let reg = registry();
        let id = reg.push_line("Hello", "meg");
        assert!(matches!(
            reg.generate_line(id).await,
            Err(Error::Validation(_))
        ));
        assert_eq!(
            reg.line(id).map(|l| l.generation_state()),
            Some(GenerationState::Idle)
        );
    }

    #[tokio::test]
    async fn success_stores_payload_and_marks_ready() -> anyhow::Result<()> {
        let reg = registry();
        let id = reg.push_line("Hi?", "stewie");
        reg.generate_line(id).await?;

        let line = reg.line(id).expect("line exists");
        assert_eq!(line.generation_state(), GenerationState::Ready);
        assert_eq!(line.audio_payload().map(|b| b.as_ref()), Some(&b"Hi?"[..]));

        let requests = reg.client.requests.borrow();
        assert_eq!(requests[0].voice_id, "EsC6WC6aufrhentvDBpL");
        assert_eq!(requests[0].previous_text, None);
        Ok(())
    }

    #[tokio::test]
    async fn failure_marks_failed_without_payload() {
        let reg = registry();
        let id = reg.push_line("please fail", "peter");
        let err = reg.generate_line(id).await.unwrap_err();
        assert!(matches!(err, Error::Collaborator { status: Some(500), .. }));

        let line = reg.line(id).expect("line exists");
        assert_eq!(line.generation_state(), GenerationState::Failed);
        assert!(line.audio_payload().is_none());
        assert!(line.last_error().is_some());
    }

    #[tokio::test]
    async fn failed_regeneration_keeps_previous_payload() -> anyhow::Result<()> {
        let reg = registry();
        let id = reg.push_line("first take", "peter");
        reg.generate_line(id).await?;

        reg.update_line(id, LineField::Text, "now fail");
        assert!(reg.generate_line(id).await.is_err());

        let line = reg.line(id).expect("line exists");
        assert_eq!(line.generation_state(), GenerationState::Ready);
        assert_eq!(
            line.audio_payload().map(|b| b.as_ref()),
            Some(&b"first take"[..])
        );
        Ok(())
    }

    #[tokio::test]
    async fn editing_text_keeps_stale_audio() -> anyhow::Result<()> {
        let reg = registry();
        let id = reg.push_line("original", "peter");
        reg.generate_line(id).await?;
        reg.update_line(id, LineField::Text, "edited");
        reg.update_line(id, LineField::Speaker, "stewie");

        let line = reg.line(id).expect("line exists");
        assert_eq!(line.text(), "edited");
        assert_eq!(line.speaker(), "stewie");
        assert_eq!(
            line.audio_payload().map(|b| b.as_ref()),
            Some(&b"original"[..])
        );
        Ok(())
    }

    #[tokio::test]
    async fn second_generate_while_pending_is_guarded() {
        let reg = registry();
        let id = reg.push_line("Hello", "peter");

        let (first, second) = tokio::join!(reg.generate_line(id), async {
            assert_eq!(
                reg.line(id).map(|l| l.generation_state()),
                Some(GenerationState::Pending)
            );
            reg.generate_line(id).await
        });

        assert!(first.is_ok());
        assert!(matches!(second, Err(Error::Pending(p)) if p == id));
        assert_eq!(reg.client.requests.borrow().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_marks_line_failed() {
        let opts = Opts {
            generation_timeout: Duration::from_secs(5),
            ..Opts::default()
        };
        let reg = LineRegistry::new(SlowTts, VoiceTable::builtin(), opts);
        let id = reg.push_line("Hello", "peter");

        let err = reg.generate_line(id).await.unwrap_err();
        assert!(matches!(err, Error::Collaborator { status: None, .. }));
        assert_eq!(
            reg.line(id).map(|l| l.generation_state()),
            Some(GenerationState::Failed)
        );
    }

    #[tokio::test]
    async fn generate_all_skips_ready_and_blank_lines_and_continues_after_failure()
    -> anyhow::Result<()> {
        let reg = registry();
        let done = reg.push_line("done", "peter");
        reg.generate_line(done).await?;
        let blank = reg.push_line("", "stewie");
        let bad = reg.push_line("fail here", "peter");
        let good = reg.push_line("good", "stewie");
        reg.client.requests.borrow_mut().clear();

        let report = reg.generate_all().await;

        assert_eq!(report.attempted(), 2);
        assert_eq!(report.succeeded, vec![good]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, bad);

        let texts: Vec<_> = reg
            .client
            .requests
            .borrow()
            .iter()
            .map(|r| r.text.clone())
            .collect();
        assert_eq!(texts, vec!["fail here", "good"]);
        assert_eq!(
            reg.line(blank).map(|l| l.generation_state()),
            Some(GenerationState::Idle)
        );
        Ok(())
    }

    #[tokio::test]
    async fn generate_all_with_nothing_eligible_is_empty() {
        let reg = registry();
        reg.add_line();
        assert!(reg.generate_all().await.is_empty());
    }

    #[tokio::test]
    async fn previous_text_skips_blank_predecessor() -> anyhow::Result<()> {
        let reg = registry();
        reg.push_line("  ", "peter");
        let id = reg.push_line("Hi", "stewie");
        reg.generate_line(id).await?;
        assert_eq!(reg.client.requests.borrow()[0].previous_text, None);
        Ok(())
    }

    #[tokio::test]
    async fn playback_allows_one_line_at_a_time() -> anyhow::Result<()> {
        let reg = registry();
        let a = reg.push_line("a", "peter");
        let b = reg.push_line("b", "stewie");
        let silent = reg.push_line("c", "peter");
        reg.generate_line(a).await?;
        reg.generate_line(b).await?;

        assert!(!reg.play_line(silent));
        assert_eq!(reg.playing(), None);

        assert!(reg.play_line(a));
        assert!(reg.play_line(b));
        assert_eq!(reg.playing(), Some(b));

        // Toggling the playing line stops it.
        assert!(!reg.play_line(b));
        assert_eq!(reg.playing(), None);

        reg.play_line(a);
        reg.playback_finished(b);
        assert_eq!(reg.playing(), Some(a));
        reg.remove_line(a);
        assert_eq!(reg.playing(), None);
        Ok(())
    }

    #[test]
    fn custom_voices_can_be_added_through_the_registry() -> anyhow::Result<()> {
        let reg = registry();
        let key = reg.update_voices(|v| v.add_voice("Lois", "", "lois-id"))?;
        assert_eq!(reg.voices().resolve(&key), Some("lois-id"));
        Ok(())
    }
}
