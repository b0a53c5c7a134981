//! Combine the generated voice lines into one downloadable file.
//!
//! The happy path decodes every ready payload, concatenates the PCM back-to-back in script
//! order and encodes one WAV. If any step after filtering fails (a payload does not decode,
//! clips disagree on sample rate or channel layout, encoding fails) we do not fail the export:
//! we hand back each ready line's original payload as its own file instead.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::decoder::{decode_payload, sniff_extension};
use crate::line::DialogueLine;
use crate::opts::Opts;
use crate::pcm::PcmBuffer;
use crate::wav::encode_wav;
use crate::{Error, Result};

/// One file ready to be saved or offered as a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Bytes,
}

/// Result of an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Export {
    /// All ready lines concatenated into one WAV.
    Combined(ExportFile),
    /// Combining failed; each ready line's untouched payload, named by script position.
    Individual {
        files: Vec<ExportFile>,
        reason: String,
    },
}

impl Export {
    pub fn files(&self) -> &[ExportFile] {
        match self {
            Export::Combined(file) => std::slice::from_ref(file),
            Export::Individual { files, .. } => files,
        }
    }

    pub fn is_combined(&self) -> bool {
        matches!(self, Export::Combined(_))
    }

    /// Write every file into `dir` and return the paths written.
    pub fn write_to_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(self.files().len());
        for file in self.files() {
            let path = dir.join(&file.filename);
            std::fs::write(&path, &file.bytes)?;
            debug!(path = %path.display(), bytes = file.bytes.len(), "wrote export file");
            written.push(path);
        }
        Ok(written)
    }
}

// A ready line's 1-based script position and payload.
struct ReadyLine<'a> {
    position: usize,
    line: &'a DialogueLine,
    payload: &'a Bytes,
}

/// Assemble every `Ready` line, in order, into an export.
///
/// Fails only with `Error::NothingToExport` when no line has audio.
pub fn assemble(lines: &[DialogueLine], opts: &Opts) -> Result<Export> {
    let ready: Vec<ReadyLine<'_>> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.is_ready())
        .filter_map(|(idx, line)| {
            line.audio_payload().map(|payload| ReadyLine {
                position: idx + 1,
                line,
                payload,
            })
        })
        .collect();

    if ready.is_empty() {
        return Err(Error::NothingToExport);
    }

    match combine(&ready, opts) {
        Ok(file) => {
            info!(lines = ready.len(), bytes = file.bytes.len(), "combined export ready");
            Ok(Export::Combined(file))
        }
        Err(err) => {
            warn!(error = %err, "combined export failed; exporting lines individually");
            Ok(Export::Individual {
                files: individual_files(&ready, opts),
                reason: err.to_string(),
            })
        }
    }
}

/// Run `assemble` on the blocking pool so decode/encode does not stall the event loop.
pub async fn assemble_async(lines: Vec<DialogueLine>, opts: Opts) -> Result<Export> {
    tokio::task::spawn_blocking(move || assemble(&lines, &opts))
        .await
        .map_err(|err| Error::msg(format!("export task failed: {err}")))?
}

fn combine(ready: &[ReadyLine<'_>], opts: &Opts) -> Result<ExportFile> {
    let mut buffers = Vec::with_capacity(ready.len());
    for item in ready {
        let pcm = decode_payload(item.payload).map_err(|err| Error::Decode {
            line: item.line.id(),
            position: item.position,
            message: format!("{err:#}"),
        })?;
        buffers.push((item.position, pcm));
    }

    check_uniform_format(&buffers)?;

    let combined = PcmBuffer::concat(buffers.iter().map(|(_, pcm)| pcm))?;
    debug!(
        frames = combined.frames(),
        sample_rate = combined.sample_rate(),
        channels = combined.channel_count(),
        "concatenated voice lines"
    );

    let wav = encode_wav(&combined)?;
    Ok(ExportFile {
        filename: opts.combined_filename.clone(),
        content_type: "audio/wav",
        bytes: Bytes::from(wav),
    })
}

fn check_uniform_format(buffers: &[(usize, PcmBuffer)]) -> Result<()> {
    let Some((_, first)) = buffers.first() else {
        return Ok(());
    };
    for (position, pcm) in &buffers[1..] {
        if pcm.sample_rate() != first.sample_rate() || pcm.channel_count() != first.channel_count()
        {
            return Err(Error::FormatMismatch {
                position: *position,
                expected_rate: first.sample_rate(),
                expected_channels: first.channel_count(),
                found_rate: pcm.sample_rate(),
                found_channels: pcm.channel_count(),
            });
        }
    }
    Ok(())
}

fn individual_files(ready: &[ReadyLine<'_>], opts: &Opts) -> Vec<ExportFile> {
    ready
        .iter()
        .map(|item| {
            let ext = sniff_extension(item.payload);
            ExportFile {
                filename: format!("{}-{}.{ext}", opts.individual_prefix, item.position),
                content_type: content_type_for(ext),
                bytes: item.payload.clone(),
            }
        })
        .collect()
}

fn content_type_for(ext: &str) -> &'static str {
    match ext {
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        _ => "audio/mpeg",
    }
}
