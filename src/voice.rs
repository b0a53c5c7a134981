//! Speaker key → provider voice id resolution.
//!
//! Lines refer to speakers by a short key (`"peter"`, `"stewie"`). The TTS provider only
//! understands its own voice ids, so the registry resolves keys through a `VoiceTable`
//! handed to it at construction instead of consulting hardcoded globals.

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Speaker key assigned to newly added lines.
pub const DEFAULT_SPEAKER: &str = "peter";

/// One selectable character voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voice {
    /// Key stored on each line (`DialogueLine::speaker`).
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Provider-side voice identifier.
    pub voice_id: String,
}

/// Ordered set of voices, keyed by speaker key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VoiceTable {
    voices: Vec<Voice>,
}

impl VoiceTable {
    /// An empty table. Every line will fail validation until voices are added.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The two built-in character voices.
    pub fn builtin() -> Self {
        Self {
            voices: vec![
                Voice {
                    key: "peter".to_owned(),
                    name: "Peter Griffin".to_owned(),
                    description: "The bumbling father".to_owned(),
                    voice_id: "1P7KOzutBXxu64xIbUwT".to_owned(),
                },
                Voice {
                    key: "stewie".to_owned(),
                    name: "Stewie Griffin".to_owned(),
                    description: "The evil genius baby".to_owned(),
                    voice_id: "EsC6WC6aufrhentvDBpL".to_owned(),
                },
            ],
        }
    }

    /// Read a JSON array of voices (`[{"key", "name", "description", "voiceId"}]`).
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        let voices: Vec<Voice> = serde_json::from_reader(reader)?;
        let mut table = Self::empty();
        for voice in voices {
            table.insert(voice)?;
        }
        Ok(table)
    }

    /// Insert every voice from `other`, replacing entries that share a key.
    pub fn merge(&mut self, other: VoiceTable) {
        for voice in other.voices {
            self.upsert(voice);
        }
    }

    /// Resolve a speaker key to the provider voice id.
    pub fn resolve(&self, key: &str) -> Option<&str> {
        self.get(key).map(|v| v.voice_id.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&Voice> {
        self.voices.iter().find(|v| v.key == key)
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Add a custom voice and return its derived speaker key.
    ///
    /// The key is the trimmed name lowercased with whitespace runs replaced by `_`.
    /// An empty description becomes `"Custom voice"`.
    pub fn add_voice(&mut self, name: &str, description: &str, voice_id: &str) -> Result<String> {
        let name = name.trim();
        let voice_id = voice_id.trim();
        if name.is_empty() || voice_id.is_empty() {
            return Err(Error::validation(
                "both voice name and voice id are required",
            ));
        }

        let key = speaker_key(name);
        let description = match description.trim() {
            "" => "Custom voice".to_owned(),
            d => d.to_owned(),
        };

        self.upsert(Voice {
            key: key.clone(),
            name: name.to_owned(),
            description,
            voice_id: voice_id.to_owned(),
        });
        Ok(key)
    }

    /// Remove a voice by key. Unknown keys are ignored.
    pub fn remove_voice(&mut self, key: &str) -> Option<Voice> {
        let idx = self.voices.iter().position(|v| v.key == key)?;
        Some(self.voices.remove(idx))
    }

    fn insert(&mut self, voice: Voice) -> Result<()> {
        if voice.key.trim().is_empty() || voice.voice_id.trim().is_empty() {
            return Err(Error::validation(format!(
                "voice '{}' needs both a key and a voice id",
                voice.name
            )));
        }
        self.upsert(voice);
        Ok(())
    }

    fn upsert(&mut self, voice: Voice) {
        match self.voices.iter_mut().find(|v| v.key == voice.key) {
            Some(existing) => *existing = voice,
            None => self.voices.push(voice),
        }
    }
}

fn speaker_key(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}
