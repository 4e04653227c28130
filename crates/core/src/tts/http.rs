use crate::config::{parse_base_url, ApiKey, ConfigError, SynthesisOptions, DEFAULT_API_BASE_URL};
use crate::tts::{SpeechSynthesizer, SynthesisError};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;
use url::Url;

const LOG_TARGET: &str = "tts::http";

#[derive(Clone)]
pub struct HttpSpeechClient {
    client: Client,
    api_key: ApiKey,
    base_url: Url,
    options: SynthesisOptions,
}

impl HttpSpeechClient {
    pub fn new(api_key: ApiKey, options: SynthesisOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self {
            client: Client::new(),
            api_key,
            base_url: parse_base_url(DEFAULT_API_BASE_URL)?,
            options,
        })
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}/get_speech",
            self.base_url.as_str().trim_end_matches('/'),
            self.options.model
        )
    }

    fn request_for(&self, text: String) -> SpeechRequest<'_> {
        SpeechRequest {
            text,
            sample_rate: self.options.sample_rate_hz,
            voice_id: &self.options.voice_id,
            add_wav_header: self.options.add_wav_header,
            speed: self.options.speed,
            model: &self.options.model,
            transliterate: self.options.transliterate,
            remove_extra_silence: self.options.remove_extra_silence,
        }
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: String,
    sample_rate: u32,
    voice_id: &'a str,
    add_wav_header: bool,
    speed: f32,
    model: &'a str,
    transliterate: bool,
    remove_extra_silence: bool,
}

impl SpeechSynthesizer for HttpSpeechClient {
    fn synthesize(&self, text: String) -> BoxFuture<'_, Result<Bytes, SynthesisError>> {
        async move {
            let text = clean_text(&text);
            if text.is_empty() {
                return Err(SynthesisError::InvalidInput("text must not be empty".into()));
            }

            let url = self.endpoint();
            tracing::debug!(target: LOG_TARGET, %url, chars = text.chars().count(), "requesting speech");

            let response = self
                .client
                .post(&url)
                .bearer_auth(self.api_key.expose())
                .json(&self.request_for(text))
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(SynthesisError::HttpStatus(status.as_u16(), body));
            }

            Ok(response.bytes().await?)
        }
        .boxed()
    }

    fn options(&self) -> &SynthesisOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut SynthesisOptions {
        &mut self.options
    }
}

/// Dashes, tabs and newlines to spaces, whitespace runs collapsed.
fn clean_text(text: &str) -> String {
    let spaced: String = text
        .chars()
        .map(|c| match c {
            '\n' | '\t' | '-' | '\u{2013}' | '\u{2014}' => ' ',
            other => other,
        })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}
