use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "https://waves-api.smallest.ai/api/v1";
pub const DEFAULT_MODEL: &str = "lightning";
pub const LARGE_MODEL: &str = "lightning-large";
pub const DEFAULT_VOICE_ID: &str = "emily";
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 24_000;
pub const DEFAULT_SPEED: f32 = 1.0;
pub const DEFAULT_UNIT_SIZE: usize = 250;
pub const LARGE_MODEL_UNIT_SIZE: usize = 140;
pub const DEFAULT_QUEUE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_IDLE_BACKOFF_MS: u64 = 100;
pub const ENV_API_KEY: &str = "SMALLEST_API_KEY";

pub const MIN_SAMPLE_RATE_HZ: u32 = 8_000;
pub const MAX_SAMPLE_RATE_HZ: u32 = 24_000;
pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        Ok(Self(v))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(**redacted**)")
    }
}

/// Options understood by a synthesis backend.
///
/// The streaming pipeline reads `model` to pick its unit size and always
/// clears `add_wav_header`: raw chunks are concatenated into one stream and a
/// per-chunk container header would corrupt it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SynthesisOptions {
    pub model: String,
    pub voice_id: String,
    pub sample_rate_hz: u32,
    pub speed: f32,
    pub add_wav_header: bool,
    pub transliterate: bool,
    pub remove_extra_silence: bool,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_owned(),
            voice_id: DEFAULT_VOICE_ID.to_owned(),
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            speed: DEFAULT_SPEED,
            add_wav_header: true,
            transliterate: false,
            remove_extra_silence: true,
        }
    }
}

impl SynthesisOptions {
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = model.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel);
        }
        if self.voice_id.trim().is_empty() {
            return Err(ConfigError::EmptyVoice);
        }
        if !(MIN_SAMPLE_RATE_HZ..=MAX_SAMPLE_RATE_HZ).contains(&self.sample_rate_hz) {
            return Err(ConfigError::SampleRateOutOfRange(self.sample_rate_hz));
        }
        if !(MIN_SPEED..=MAX_SPEED).contains(&self.speed) {
            return Err(ConfigError::SpeedOutOfRange(self.speed));
        }
        Ok(())
    }

    pub fn is_large_model(&self) -> bool {
        self.model == LARGE_MODEL
    }
}

/// Pacing knobs for the text-to-audio stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// Bounded wait for the next unit before re-checking whether text is done.
    pub queue_timeout: Duration,
    /// Extra attempts after the first failed synthesis call.
    pub max_retries: u32,
    /// Pause after an empty wait while the producer is still alive.
    pub idle_backoff: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            queue_timeout: Duration::from_millis(DEFAULT_QUEUE_TIMEOUT_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            idle_backoff: Duration::from_millis(DEFAULT_IDLE_BACKOFF_MS),
        }
    }
}

impl StreamConfig {
    pub fn new(queue_timeout: Duration, max_retries: u32) -> Result<Self, ConfigError> {
        if queue_timeout.is_zero() {
            return Err(ConfigError::ZeroQueueTimeout);
        }
        Ok(Self {
            queue_timeout,
            max_retries,
            ..Default::default()
        })
    }

    pub fn with_idle_backoff(mut self, idle_backoff: Duration) -> Self {
        self.idle_backoff = idle_backoff;
        self
    }

    pub fn unit_size_for(options: &SynthesisOptions) -> usize {
        if options.is_large_model() {
            LARGE_MODEL_UNIT_SIZE
        } else {
            DEFAULT_UNIT_SIZE
        }
    }
}

pub fn parse_base_url(value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidBaseUrl(e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidBaseUrl(value.to_owned()));
    }
    Ok(url)
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("api key must not be empty")]
    EmptyApiKey,
    #[error("model must not be empty")]
    EmptyModel,
    #[error("voice id must not be empty")]
    EmptyVoice,
    #[error("sample rate {0} Hz outside 8000..=24000")]
    SampleRateOutOfRange(u32),
    #[error("speed {0} outside 0.5..=2.0")]
    SpeedOutOfRange(f32),
    #[error("queue timeout must be > 0")]
    ZeroQueueTimeout,
    #[error("unit size must be > 0")]
    ZeroUnitSize,
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_api_key(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Result<Option<ApiKey>, ConfigError> {
    match cli_value {
        Some(v) => Ok(Some(ApiKey::new(v)?)),
        None => match env.var(env_key) {
            Some(v) => Ok(Some(ApiKey::new(v)?)),
            None => Ok(None),
        },
    }
}
