mod http;
mod retrying;
mod tone;

use crate::config::SynthesisOptions;
use bytes::Bytes;
use futures::future::BoxFuture;

pub use http::HttpSpeechClient;
pub use retrying::RetryingSynthesizer;
pub use tone::ToneSynthesizer;

#[derive(thiserror::Error, Debug)]
pub enum SynthesisError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("http error {0}: {1}")]
    HttpStatus(u16, String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("synthesis worker failed: {0}")]
    Worker(String),
}

impl SynthesisError {
    /// Transport and HTTP failures are worth another attempt; bad input and
    /// a crashed worker are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::HttpStatus(..))
    }
}

/// A backend whose calls suspend instead of blocking the thread.
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(&self, text: String) -> BoxFuture<'_, Result<Bytes, SynthesisError>>;

    fn options(&self) -> &SynthesisOptions;

    fn options_mut(&mut self) -> &mut SynthesisOptions;
}

/// A backend whose calls block the calling thread until audio is ready.
pub trait BlockingSpeechSynthesizer: Send + Sync {
    fn synthesize_blocking(&self, text: &str) -> Result<Bytes, SynthesisError>;

    fn options(&self) -> &SynthesisOptions;

    fn options_mut(&mut self) -> &mut SynthesisOptions;
}
