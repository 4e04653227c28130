use crate::config::{ConfigError, SynthesisOptions};
use crate::tts::{BlockingSpeechSynthesizer, SynthesisError};
use bytes::{BufMut, Bytes, BytesMut};
use std::f32::consts::PI;

const MS_PER_CHAR: usize = 60;
const MIN_DURATION_MS: usize = 200;
const BASE_FREQ_HZ: f32 = 440.0;
const AMPLITUDE: f32 = 0.3;

/// Offline backend emitting a sine tone as raw 16-bit little-endian mono PCM.
///
/// Duration tracks the text length and is scaled by `speed`, which makes it
/// handy for exercising the pipeline without network access.
#[derive(Clone, Debug, Default)]
pub struct ToneSynthesizer {
    options: SynthesisOptions,
}

impl ToneSynthesizer {
    pub fn new(options: SynthesisOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn samples_for(&self, text: &str) -> usize {
        let chars = text.trim().chars().count();
        let duration_ms = (chars * MS_PER_CHAR).max(MIN_DURATION_MS) as f32 / self.options.speed;
        (duration_ms * self.options.sample_rate_hz as f32 / 1000.0) as usize
    }
}

impl BlockingSpeechSynthesizer for ToneSynthesizer {
    fn synthesize_blocking(&self, text: &str) -> Result<Bytes, SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::InvalidInput("text must not be empty".into()));
        }

        let sample_rate_hz = self.options.sample_rate_hz as f32;
        let samples = self.samples_for(text);
        let mut pcm = BytesMut::with_capacity(samples * 2);
        for i in 0..samples {
            let t = i as f32 / sample_rate_hz;
            let amplitude = (2.0 * PI * BASE_FREQ_HZ * t).sin() * AMPLITUDE;
            pcm.put_i16_le((amplitude * i16::MAX as f32) as i16);
        }
        Ok(pcm.freeze())
    }

    fn options(&self) -> &SynthesisOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut SynthesisOptions {
        &mut self.options
    }
}
