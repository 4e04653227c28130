use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle of one text stream. Only ever moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum StreamState {
    Accumulating = 0,
    Draining = 1,
    Done = 2,
}

impl StreamState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Accumulating,
            1 => Self::Draining,
            _ => Self::Done,
        }
    }
}

/// [`StreamState`] shared between the producer and the consumer.
#[derive(Clone, Debug)]
pub struct SharedState(Arc<AtomicU8>);

impl SharedState {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(StreamState::Accumulating as u8)))
    }

    pub fn get(&self) -> StreamState {
        StreamState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn is_done(&self) -> bool {
        self.get() == StreamState::Done
    }

    /// Move to `next` unless already past it; returns the resulting state.
    pub fn advance(&self, next: StreamState) -> StreamState {
        let prev = self.0.fetch_max(next as u8, Ordering::AcqRel);
        StreamState::from_u8(prev.max(next as u8))
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
