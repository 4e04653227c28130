use crate::config::StreamConfig;
use crate::pipeline::state::SharedState;
use crate::tts::RetryingSynthesizer;
use bytes::Bytes;
use futures::Stream;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, timeout};

const LOG_TARGET: &str = "pipeline::consumer";

/// Pulls units off the queue and synthesizes them one at a time.
pub(crate) struct Consumer {
    queue: UnboundedReceiver<String>,
    state: SharedState,
    synthesizer: Arc<RetryingSynthesizer>,
    config: StreamConfig,
}

impl Consumer {
    pub(crate) fn new(
        queue: UnboundedReceiver<String>,
        state: SharedState,
        synthesizer: Arc<RetryingSynthesizer>,
        config: StreamConfig,
    ) -> Self {
        Self {
            queue,
            state,
            synthesizer,
            config,
        }
    }

    /// Audio in queue order. Unit N is synthesized and yielded before unit
    /// N+1 is taken off the queue.
    ///
    /// Ends once the producer is done and a bounded wait finds the queue
    /// empty, or as soon as the producer side of the queue is gone.
    pub(crate) fn into_stream(self) -> impl Stream<Item = Bytes> + Send + 'static {
        let Consumer {
            mut queue,
            state,
            synthesizer,
            config,
        } = self;

        async_stream::stream! {
            let mut index = 0usize;
            while !state.is_done() || !queue.is_empty() {
                match timeout(config.queue_timeout, queue.recv()).await {
                    Ok(Some(unit)) => {
                        tracing::debug!(target: LOG_TARGET, index, unit = %unit, "synthesizing");
                        match synthesizer.synthesize(&unit).await {
                            Some(audio) if !audio.is_empty() => {
                                yield audio;
                            }
                            Some(_) => {
                                tracing::debug!(target: LOG_TARGET, index, "backend returned no audio");
                            }
                            None => {}
                        }
                        index += 1;
                    }
                    Ok(None) => break,
                    Err(_) => {
                        if state.is_done() {
                            break;
                        }
                        tracing::trace!(target: LOG_TARGET, "queue idle, producer still running");
                        sleep(config.idle_backoff).await;
                    }
                }
            }
            tracing::debug!(target: LOG_TARGET, units = index, "audio stream finished");
        }
    }
}
