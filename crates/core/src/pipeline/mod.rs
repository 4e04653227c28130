//! Text-to-audio streaming.
//!
//! [`TextToAudioStream::process`] runs two tasks over one queue: a producer
//! that segments incoming text into speakable units, and a consumer that
//! synthesizes those units in order and yields raw audio. Audio for the first
//! sentence is available while later text is still being generated.

mod consumer;
mod producer;
mod state;

use crate::config::{ConfigError, StreamConfig, SynthesisOptions};
use crate::segment::{SegmenterConfig, SentenceSegmenter};
use crate::tts::{BlockingSpeechSynthesizer, RetryingSynthesizer, SpeechSynthesizer};
use bytes::Bytes;
use consumer::Consumer;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use producer::Producer;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use state::{SharedState, StreamState};

const LOG_TARGET: &str = "pipeline";

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("upstream text stream failed: {0}")]
    Upstream(#[source] BoxError),

    #[error("unit queue closed before the producer finished")]
    QueueClosed,

    #[error("producer task failed: {0}")]
    Producer(String),
}

/// Aborts the producer if the audio stream is dropped before it ends.
struct AbortOnDrop(JoinHandle<Result<(), PipelineError>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct TextToAudioStream {
    synthesizer: Arc<RetryingSynthesizer>,
    segmenter: SegmenterConfig,
    config: StreamConfig,
}

impl TextToAudioStream {
    /// Unit size comes from the synthesizer's model.
    pub fn new(synthesizer: RetryingSynthesizer, config: StreamConfig) -> Self {
        let segmenter = SegmenterConfig::for_options(synthesizer.options());
        Self {
            synthesizer: Arc::new(synthesizer),
            segmenter,
            config,
        }
    }

    pub fn suspendable<S>(backend: S, config: StreamConfig) -> Self
    where
        S: SpeechSynthesizer + 'static,
    {
        Self::new(
            RetryingSynthesizer::suspendable(backend, config.max_retries),
            config,
        )
    }

    pub fn blocking<B>(backend: B, config: StreamConfig) -> Self
    where
        B: BlockingSpeechSynthesizer + 'static,
    {
        Self::new(
            RetryingSynthesizer::blocking(backend, config.max_retries),
            config,
        )
    }

    pub fn with_unit_size(mut self, max_chars: usize) -> Result<Self, ConfigError> {
        let terminators = std::mem::take(&mut self.segmenter.terminators);
        self.segmenter = SegmenterConfig::new(max_chars)?.with_terminators(terminators);
        Ok(self)
    }

    pub fn unit_size(&self) -> usize {
        self.segmenter.max_chars
    }

    pub fn synthesis_options(&self) -> &SynthesisOptions {
        self.synthesizer.options()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Turn a stream of text fragments into a stream of raw audio buffers.
    ///
    /// Nothing runs until the returned stream is first polled; that poll must
    /// happen inside a Tokio runtime. Units that fail synthesis are skipped.
    /// An upstream error ends the stream with [`PipelineError::Upstream`]
    /// after the units queued before it have been played out.
    pub fn process<S, E>(&self, text: S) -> BoxStream<'static, Result<Bytes, PipelineError>>
    where
        S: Stream<Item = Result<String, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let synthesizer = Arc::clone(&self.synthesizer);
        let segmenter = SentenceSegmenter::new(self.segmenter.clone());
        let config = self.config;

        let audio_stream = async_stream::try_stream! {
            let (tx, rx) = mpsc::unbounded_channel();
            let state = SharedState::new();

            let producer = Producer::new(segmenter, tx, state.clone());
            let mut handle = AbortOnDrop(tokio::spawn(producer.run(text)));

            let audio = Consumer::new(rx, state, synthesizer, config).into_stream();
            futures::pin_mut!(audio);
            let mut chunks = 0usize;
            while let Some(chunk) = audio.next().await {
                chunks += 1;
                yield chunk;
            }

            let outcome = (&mut handle.0)
                .await
                .map_err(|e| PipelineError::Producer(e.to_string()))?;
            if let Err(e) = &outcome {
                tracing::warn!(target: LOG_TARGET, error = %e, chunks, "stream ended abnormally");
            } else {
                tracing::debug!(target: LOG_TARGET, chunks, "stream complete");
            }
            outcome?;
        };
        audio_stream.boxed()
    }

    /// [`process`](Self::process) for an upstream that cannot fail.
    pub fn process_text<S>(&self, text: S) -> BoxStream<'static, Result<Bytes, PipelineError>>
    where
        S: Stream<Item = String> + Send + 'static,
    {
        self.process(text.map(Ok::<_, Infallible>))
    }
}
