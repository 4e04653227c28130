#![deny(warnings)]

pub mod config;
pub mod pipeline;
pub mod segment;
pub mod tts;
pub mod util;

pub use pipeline::{PipelineError, TextToAudioStream};
