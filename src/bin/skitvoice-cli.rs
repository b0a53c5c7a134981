use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

use skitvoice::script::{load_into, read_script};
use skitvoice::{Export, HttpTtsClient, LineRegistry, Opts, VoiceTable, assemble_async};

#[derive(Parser, Debug)]
#[command(name = "skitvoice-cli")]
#[command(about = "Generate every line of a dialogue script and export the skit as one WAV")]
struct Params {
    /// Script file: JSON array of `{"speaker": "...", "text": "..."}`.
    #[arg(short = 's', long = "script")]
    script_path: PathBuf,

    /// Directory the export is written into.
    #[arg(short = 'o', long = "out-dir", default_value = ".")]
    out_dir: PathBuf,

    /// Full URL of the voice generation endpoint.
    #[arg(
        short = 'e',
        long = "endpoint",
        default_value = "http://127.0.0.1:8080/v1/generate-voice"
    )]
    endpoint: String,

    /// Key sent as bearer token and `apikey` header.
    #[arg(long = "api-key", env = "SKITVOICE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Extra voices: JSON array of `{"key", "name", "description", "voiceId"}`.
    #[arg(long = "voices")]
    voices_path: Option<PathBuf>,

    /// Per-line generation timeout (seconds).
    #[arg(long = "timeout-secs", default_value_t = 30)]
    timeout_secs: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    skitvoice::init_logging();

    if let Err(err) = run(Params::parse()).await {
        error!(error = ?err, "skitvoice-cli failed");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(params: Params) -> Result<()> {
    let timeout = Duration::from_secs(params.timeout_secs);
    let opts = Opts {
        generation_timeout: timeout,
        ..Opts::default()
    };

    let mut voices = VoiceTable::builtin();
    if let Some(path) = &params.voices_path {
        let file = File::open(path)
            .with_context(|| format!("failed to open voices file: {}", path.display()))?;
        voices.merge(VoiceTable::from_json_reader(BufReader::new(file))?);
    }

    let script_file = File::open(&params.script_path).with_context(|| {
        format!(
            "failed to open script file: {}",
            params.script_path.display()
        )
    })?;
    let script = read_script(BufReader::new(script_file))?;

    let mut client = HttpTtsClient::new(&params.endpoint, timeout)?;
    if let Some(key) = params.api_key {
        client = client.with_api_key(key);
    }

    let registry = LineRegistry::new(client, voices, opts.clone());
    load_into(&registry, &script);

    let report = registry.generate_all().await;
    eprintln!(
        "generated {}/{} lines",
        report.succeeded.len(),
        report.attempted()
    );
    for (id, err) in &report.failed {
        let position = registry
            .lines()
            .iter()
            .position(|l| l.id() == *id)
            .map_or(0, |idx| idx + 1);
        eprintln!("  line {position}: {err}");
    }

    let export = assemble_async(registry.lines(), opts).await?;
    if let Export::Individual { reason, .. } = &export {
        eprintln!("could not combine lines ({reason}); writing them individually");
    }

    for path in export.write_to_dir(&params.out_dir)? {
        println!("{}", path.display());
    }
    Ok(())
}
