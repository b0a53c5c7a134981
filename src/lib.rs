//! `skitvoice` — script a dialogue between character voices, synthesize each line through a
//! text-to-speech service, and export the whole skit as one WAV.
//!
//! This crate provides:
//! - An ordered line registry with per-line generation state and playback state
//! - A TTS collaborator seam (`TtsClient`) plus an HTTP implementation
//! - Audio assembly: decode payloads, concatenate PCM, encode 16-bit WAV
//! - A best-effort fallback that exports each line's original audio when combining fails
//!
//! The library targets single-threaded, event-driven hosts and bulk generation issues one TTS
//! request at a time. The only off-thread work is `assemble_async`, which hands decode and
//! encode to tokio's blocking pool; `assemble` itself runs on the caller's thread.

mod error;

pub use error::{Error, Result};

// Script model and generation state.
pub mod line;
pub mod registry;
pub mod script;
pub mod sequencer;
pub mod voice;

// Library-level configuration.
pub mod opts;

// TTS collaborator interface and prosody hints.
pub mod prosody;
pub mod tts;

// Audio decoding, assembly and encoding.
pub mod assembler;
pub mod decoder;
pub mod pcm;
pub mod wav;

// Logging configuration and control.
#[cfg(feature = "logging")]
pub mod logging;

pub use assembler::{Export, ExportFile, assemble, assemble_async};
pub use line::{DialogueLine, GenerationState, LineField, LineId};
pub use opts::Opts;
pub use registry::{BatchReport, LineRegistry};
pub use tts::{TtsClient, TtsRequest};
pub use voice::{Voice, VoiceTable};

#[cfg(feature = "http")]
pub use tts::HttpTtsClient;

#[cfg(feature = "logging")]
pub use logging::init as init_logging;
