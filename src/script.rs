//! On-disk script format: a JSON array of `{"speaker": "...", "text": "..."}` entries.

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::line::LineId;
use crate::registry::LineRegistry;
use crate::tts::TtsClient;
use crate::voice::DEFAULT_SPEAKER;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptLine {
    #[serde(default = "default_speaker")]
    pub speaker: String,
    #[serde(default)]
    pub text: String,
}

fn default_speaker() -> String {
    DEFAULT_SPEAKER.to_owned()
}

pub fn read_script<R: Read>(reader: R) -> Result<Vec<ScriptLine>> {
    Ok(serde_json::from_reader(reader)?)
}

/// Append every script line to `registry`, in order.
pub fn load_into<C: TtsClient>(registry: &LineRegistry<C>, script: &[ScriptLine]) -> Vec<LineId> {
    script
        .iter()
        .map(|line| registry.push_line(line.text.clone(), line.speaker.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::opts::Opts;
    use crate::tts::TtsRequest;
    use crate::voice::VoiceTable;

    struct NoTts;

    impl TtsClient for NoTts {
        async fn synthesize(&self, _request: &TtsRequest) -> Result<Bytes> {
            Ok(Bytes::new())
        }
    }

    #[test]
    fn reads_script_with_default_speaker() -> anyhow::Result<()> {
        let json = r#"[
            {"speaker": "stewie", "text": "Because."},
            {"text": "Hi?"}
        ]"#;
        let script = read_script(json.as_bytes())?;
        assert_eq!(script[0].speaker, "stewie");
        assert_eq!(script[1].speaker, "peter");
        Ok(())
    }

    #[test]
    fn loads_lines_in_order() -> anyhow::Result<()> {
        let script = read_script(r#"[{"text": "a"}, {"text": "b"}]"#.as_bytes())?;
        let registry = LineRegistry::new(NoTts, VoiceTable::builtin(), Opts::default());
        let ids = load_into(&registry, &script);

        let texts: Vec<_> = registry.lines().iter().map(|l| l.text().to_owned()).collect();
        assert_eq!(texts, vec!["a", "b"]);
        assert_eq!(ids.len(), 2);
        Ok(())
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(read_script("{".as_bytes()).is_err());
    }
}
