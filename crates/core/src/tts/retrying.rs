use crate::config::SynthesisOptions;
use crate::tts::{BlockingSpeechSynthesizer, SpeechSynthesizer, SynthesisError};
use crate::util::{retry, RetryConfig};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;

const LOG_TARGET: &str = "tts::retry";

/// How a single synthesis call is executed. Picked once when the
/// [`RetryingSynthesizer`] is built.
trait CallStrategy: Send + Sync {
    fn call(&self, text: String) -> BoxFuture<'_, Result<Bytes, SynthesisError>>;
}

/// Suspendable backend, awaited on the caller's task.
struct Inline<S>(S);

impl<S: SpeechSynthesizer> CallStrategy for Inline<S> {
    fn call(&self, text: String) -> BoxFuture<'_, Result<Bytes, SynthesisError>> {
        self.0.synthesize(text)
    }
}

/// Blocking backend, run on the blocking worker pool one call at a time.
struct Offloaded<B>(Arc<B>);

impl<B: BlockingSpeechSynthesizer + 'static> CallStrategy for Offloaded<B> {
    fn call(&self, text: String) -> BoxFuture<'_, Result<Bytes, SynthesisError>> {
        let backend = Arc::clone(&self.0);
        async move {
            tokio::task::spawn_blocking(move || backend.synthesize_blocking(&text))
                .await
                .map_err(|e| SynthesisError::Worker(e.to_string()))?
        }
        .boxed()
    }
}

/// Wraps one backend with a bounded, immediate retry.
///
/// Construction clears the backend's `add_wav_header` flag so every chunk is
/// raw audio that can be concatenated.
pub struct RetryingSynthesizer {
    strategy: Box<dyn CallStrategy>,
    options: SynthesisOptions,
    retry: RetryConfig,
}

impl RetryingSynthesizer {
    pub fn suspendable<S>(mut backend: S, max_retries: u32) -> Self
    where
        S: SpeechSynthesizer + 'static,
    {
        backend.options_mut().add_wav_header = false;
        let options = backend.options().clone();
        Self {
            strategy: Box::new(Inline(backend)),
            options,
            retry: RetryConfig::new(max_retries),
        }
    }

    pub fn blocking<B>(mut backend: B, max_retries: u32) -> Self
    where
        B: BlockingSpeechSynthesizer + 'static,
    {
        backend.options_mut().add_wav_header = false;
        let options = backend.options().clone();
        Self {
            strategy: Box::new(Offloaded(Arc::new(backend))),
            options,
            retry: RetryConfig::new(max_retries),
        }
    }

    pub fn options(&self) -> &SynthesisOptions {
        &self.options
    }

    pub fn max_retries(&self) -> u32 {
        self.retry.max_retries
    }

    /// Synthesize one unit, or `None` once every attempt has failed.
    ///
    /// A dropped unit is logged and never re-queued.
    pub async fn synthesize(&self, unit: &str) -> Option<Bytes> {
        let strategy = self.strategy.as_ref();
        let result = retry(
            &self.retry,
            move || strategy.call(unit.to_owned()),
            SynthesisError::is_recoverable,
        )
        .await;

        match result {
            Ok(audio) => Some(audio),
            Err(exhausted) => {
                tracing::warn!(
                    target: LOG_TARGET,
                    unit,
                    attempts = exhausted.attempts,
                    error = %exhausted.error,
                    "synthesis failed, dropping unit"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::ToneSynthesizer;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyBackend {
        options: SynthesisOptions,
        calls: Arc<AtomicU32>,
        failures: u32,
        recoverable: bool,
    }

    impl FlakyBackend {
        fn new(failures: u32) -> Self {
            Self {
                options: SynthesisOptions::default(),
                calls: Arc::new(AtomicU32::new(0)),
                failures,
                recoverable: true,
            }
        }

        fn next(&self, text: &str) -> Result<Bytes, SynthesisError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                if self.recoverable {
                    Err(SynthesisError::HttpStatus(503, "unavailable".into()))
                } else {
                    Err(SynthesisError::InvalidInput("nope".into()))
                }
            } else {
                Ok(Bytes::copy_from_slice(text.as_bytes()))
            }
        }
    }

    impl SpeechSynthesizer for FlakyBackend {
        fn synthesize(&self, text: String) -> BoxFuture<'_, Result<Bytes, SynthesisError>> {
            async move { self.next(&text) }.boxed()
        }

        fn options(&self) -> &SynthesisOptions {
            &self.options
        }

        fn options_mut(&mut self) -> &mut SynthesisOptions {
            &mut self.options
        }
    }

    impl BlockingSpeechSynthesizer for FlakyBackend {
        fn synthesize_blocking(&self, text: &str) -> Result<Bytes, SynthesisError> {
            self.next(text)
        }

        fn options(&self) -> &SynthesisOptions {
            &self.options
        }

        fn options_mut(&mut self) -> &mut SynthesisOptions {
            &mut self.options
        }
    }

    #[tokio::test]
    async fn exhausted_retries_drop_the_unit() {
        let backend = FlakyBackend::new(u32::MAX);
        let calls = Arc::clone(&backend.calls);
        let synth = RetryingSynthesizer::suspendable(backend, 3);

        assert_eq!(synth.synthesize("Hello. ").await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn recovers_within_budget() {
        let backend = FlakyBackend::new(2);
        let calls = Arc::clone(&backend.calls);
        let synth = RetryingSynthesizer::suspendable(backend, 3);

        let audio = synth.synthesize("Hello. ").await.expect("audio");
        assert_eq!(&audio[..], b"Hello. ");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unrecoverable_error_is_not_retried() {
        let mut backend = FlakyBackend::new(1);
        backend.recoverable = false;
        let calls = Arc::clone(&backend.calls);
        let synth = RetryingSynthesizer::suspendable(backend, 3);

        assert_eq!(synth.synthesize("Hello. ").await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blocking_backend_runs_offloaded_with_same_retry_budget() {
        let backend = FlakyBackend::new(u32::MAX);
        let calls = Arc::clone(&backend.calls);
        let synth = RetryingSynthesizer::blocking(backend, 2);

        assert_eq!(synth.synthesize("Hello. ").await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn construction_forces_raw_audio() {
        let tone = ToneSynthesizer::default();
        assert!(BlockingSpeechSynthesizer::options(&tone).add_wav_header);

        let synth = RetryingSynthesizer::blocking(tone, 3);
        assert!(!synth.options().add_wav_header);
        assert_eq!(synth.max_retries(), 3);

        let audio = synth.synthesize("Tone check. ").await.expect("tone audio");
        assert!(!audio.is_empty());
        assert_ne!(&audio[..4], b"RIFF");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn blocking_backend_leaves_runtime_free() {
        struct Slow(SynthesisOptions);

        impl BlockingSpeechSynthesizer for Slow {
            fn synthesize_blocking(&self, text: &str) -> Result<Bytes, SynthesisError> {
                std::thread::sleep(std::time::Duration::from_millis(200));
                Ok(Bytes::copy_from_slice(text.as_bytes()))
            }

            fn options(&self) -> &SynthesisOptions {
                &self.0
            }

            fn options_mut(&mut self) -> &mut SynthesisOptions {
                &mut self.0
            }
        }

        let ticks = Arc::new(AtomicU32::new(0));
        let ticker = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        let synth = RetryingSynthesizer::blocking(Slow(SynthesisOptions::default()), 0);
        let audio = synth.synthesize("Slow one. ").await.expect("audio");
        ticker.abort();

        assert_eq!(&audio[..], b"Slow one. ");
        // the single runtime thread kept serving the ticker during the call
        assert!(ticks.load(Ordering::SeqCst) >= 5);
    }

    #[tokio::test]
    async fn panicking_backend_is_dropped_not_propagated() {
        struct Panics(SynthesisOptions);

        impl BlockingSpeechSynthesizer for Panics {
            fn synthesize_blocking(&self, _text: &str) -> Result<Bytes, SynthesisError> {
                panic!("backend bug");
            }

            fn options(&self) -> &SynthesisOptions {
                &self.0
            }

            fn options_mut(&mut self) -> &mut SynthesisOptions {
                &mut self.0
            }
        }

        let synth = RetryingSynthesizer::blocking(Panics(SynthesisOptions::default()), 3);
        assert_eq!(synth.synthesize("Hello. ").await, None);
    }
}
