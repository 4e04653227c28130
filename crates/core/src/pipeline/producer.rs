use crate::pipeline::state::{SharedState, StreamState};
use crate::pipeline::{BoxError, PipelineError};
use crate::segment::SentenceSegmenter;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc::UnboundedSender;

const LOG_TARGET: &str = "pipeline::producer";

/// Drains the upstream text, segments it and queues every unit as soon as it
/// is complete.
pub(crate) struct Producer {
    segmenter: SentenceSegmenter,
    queue: UnboundedSender<String>,
    state: SharedState,
    enqueued: usize,
}

/// Marks the stream done however the producer exits.
struct DoneGuard(SharedState);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.advance(StreamState::Done);
    }
}

impl Producer {
    pub(crate) fn new(
        segmenter: SentenceSegmenter,
        queue: UnboundedSender<String>,
        state: SharedState,
    ) -> Self {
        Self {
            segmenter,
            queue,
            state,
            enqueued: 0,
        }
    }

    pub(crate) async fn run<S, E>(mut self, text: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<String, E>> + Send,
        E: Into<BoxError>,
    {
        let _guard = DoneGuard(self.state.clone());
        futures::pin_mut!(text);

        while let Some(fragment) = text.next().await {
            let fragment = fragment.map_err(|e| {
                let error: BoxError = e.into();
                tracing::error!(target: LOG_TARGET, error = %error, "upstream text stream failed");
                PipelineError::Upstream(error)
            })?;
            for unit in self.segmenter.feed(&fragment) {
                self.push(unit)?;
            }
        }

        self.state.advance(StreamState::Draining);
        if let Some(unit) = self.segmenter.finish() {
            self.push(unit)?;
        }
        self.state.advance(StreamState::Done);

        tracing::debug!(target: LOG_TARGET, units = self.enqueued, "text stream exhausted");
        Ok(())
    }

    fn push(&mut self, unit: String) -> Result<(), PipelineError> {
        if self.state.is_done() {
            tracing::warn!(target: LOG_TARGET, unit = %unit, "unit produced after stream end, discarded");
            return Ok(());
        }
        tracing::trace!(target: LOG_TARGET, unit = %unit, "queued");
        self.queue
            .send(unit)
            .map_err(|_| PipelineError::QueueClosed)?;
        self.enqueued += 1;
        Ok(())
    }
}
