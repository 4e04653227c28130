#![deny(warnings)]

use anyhow::Context;
use clap::{ArgAction, Parser, ValueEnum};
use futures::{Stream, StreamExt};
use speechstream_core::config::{
    resolve_api_key, ApiKey, Env, StdEnv, StreamConfig, SynthesisOptions, DEFAULT_MAX_RETRIES,
    DEFAULT_MODEL, DEFAULT_QUEUE_TIMEOUT_MS, DEFAULT_SAMPLE_RATE_HZ, DEFAULT_SPEED,
    DEFAULT_VOICE_ID, ENV_API_KEY,
};
use speechstream_core::tts::{HttpSpeechClient, ToneSynthesizer};
use speechstream_core::TextToAudioStream;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Remote speech API.
    Http,
    /// Offline sine tone, useful for trying the pipeline without a key.
    Tone,
}

#[derive(Parser, Debug)]
#[command(name = "speechstream")]
#[command(about = "Stream text into speech as it arrives, writing raw 16-bit PCM")]
struct Args {
    /// Text source; defaults to stdin.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Raw audio destination; defaults to stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Backend::Http)]
    backend: Backend,

    #[arg(long)]
    api_key: Option<String>,

    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    #[arg(long, default_value = DEFAULT_VOICE_ID)]
    voice: String,

    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE_HZ)]
    sample_rate: u32,

    #[arg(long, default_value_t = DEFAULT_SPEED)]
    speed: f32,

    #[arg(long)]
    transliterate: bool,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    remove_extra_silence: bool,

    #[arg(long, default_value_t = DEFAULT_QUEUE_TIMEOUT_MS)]
    queue_timeout_ms: u64,

    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug)]
struct CliConfig {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    backend: Backend,
    api_key: Option<ApiKey>,
    options: SynthesisOptions,
    stream: StreamConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let env = StdEnv;
    let cfg = build_config(args, &env)?;

    tracing::info!(
        backend = ?cfg.backend,
        model = %cfg.options.model,
        voice = %cfg.options.voice_id,
        sample_rate_hz = cfg.options.sample_rate_hz,
        queue_timeout_ms = cfg.stream.queue_timeout.as_millis() as u64,
        max_retries = cfg.stream.max_retries,
        "config loaded"
    );

    run(cfg).await
}

async fn run(cfg: CliConfig) -> anyhow::Result<()> {
    let tts = match cfg.backend {
        Backend::Http => {
            let api_key = cfg
                .api_key
                .clone()
                .with_context(|| format!("--api-key or {ENV_API_KEY} is required"))?;
            let client = HttpSpeechClient::new(api_key, cfg.options.clone())?;
            TextToAudioStream::suspendable(client, cfg.stream)
        }
        Backend::Tone => {
            TextToAudioStream::blocking(ToneSynthesizer::new(cfg.options.clone())?, cfg.stream)
        }
    };
    tracing::debug!(unit_size = tts.unit_size(), "pipeline ready");

    let reader: Box<dyn AsyncRead + Unpin + Send> = match &cfg.input {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };
    let mut writer: Box<dyn AsyncWrite + Unpin + Send> = match &cfg.output {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let mut audio = tts.process(read_lines(reader));
    let mut chunks = 0usize;
    let mut bytes = 0usize;
    while let Some(chunk) = audio.next().await {
        let chunk = chunk.context("speech stream failed")?;
        writer.write_all(&chunk).await.context("failed to write audio")?;
        writer.flush().await?;
        chunks += 1;
        bytes += chunk.len();
    }

    tracing::info!(
        chunks,
        bytes,
        sample_rate_hz = cfg.options.sample_rate_hz,
        "audio stream written"
    );
    Ok(())
}

/// Each line becomes one fragment as soon as it has been read.
fn read_lines<R>(reader: R) -> impl Stream<Item = std::io::Result<String>> + Send + 'static
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async_stream::try_stream! {
        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            yield format!("{line}\n");
        }
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_config(args: Args, env: &impl Env) -> anyhow::Result<CliConfig> {
    let options = SynthesisOptions {
        model: args.model,
        voice_id: args.voice,
        sample_rate_hz: args.sample_rate,
        speed: args.speed,
        add_wav_header: false,
        transliterate: args.transliterate,
        remove_extra_silence: args.remove_extra_silence,
    };
    options.validate()?;

    let stream = StreamConfig::new(
        Duration::from_millis(args.queue_timeout_ms),
        args.max_retries,
    )?;

    let api_key = resolve_api_key(args.api_key, ENV_API_KEY, env)?;
    if args.backend == Backend::Http && api_key.is_none() {
        anyhow::bail!("the http backend needs --api-key or {ENV_API_KEY}");
    }

    Ok(CliConfig {
        input: args.input,
        output: args.output,
        backend: args.backend,
        api_key,
        options,
        stream,
    })
}
