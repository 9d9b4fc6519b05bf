//! Speech Side Channel - narrates agent output for the viewers
//!
//! Information Hiding:
//! - Synthesis backend hidden behind `SpeechSynthesizer`
//! - Retry/backoff policy hidden in `RetryingSynthesizer`
//! - Failures never reach the conversation: text goes out without audio

pub mod gemini;
pub mod wav;

use crate::actors::channels::send_or_drop;
use crate::actors::messages::GatewayMessage;
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Renders `text` to an audio file and returns its path.
    async fn synthesize(&self, text: &str) -> Result<PathBuf>;
}

/// Retries a synthesizer with exponential backoff.
pub struct RetryingSynthesizer<S> {
    inner: S,
    max_attempts: u32,
    base_delay_ms: u64,
}

impl<S: SpeechSynthesizer> RetryingSynthesizer<S> {
    pub fn new(inner: S, max_attempts: u32) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay_ms: 100,
        }
    }

    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    fn calculate_backoff(&self, attempt: u32) -> u64 {
        let max_delay = 5000;
        (self.base_delay_ms * 2_u64.pow(attempt - 1)).min(max_delay)
    }
}

#[async_trait]
impl<S: SpeechSynthesizer> SpeechSynthesizer for RetryingSynthesizer<S> {
    async fn synthesize(&self, text: &str) -> Result<PathBuf> {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                tracing::warn!(
                    "Retrying speech synthesis (attempt {}/{})",
                    attempt + 1,
                    self.max_attempts
                );
                sleep(Duration::from_millis(self.calculate_backoff(attempt))).await;
            }

            match self.inner.synthesize(text).await {
                Ok(path) => return Ok(path),
                Err(e) => {
                    tracing::warn!("Speech synthesis failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(anyhow::anyhow!(
            "Speech synthesis failed after {} attempts: {}",
            self.max_attempts,
            last_error.map(|e| e.to_string()).unwrap_or_else(|| "Unknown error".to_string())
        ))
    }
}

/// Sits between an actor and its gateway, attaching an audio clip to each
/// text message. Runs until the actor side closes or `cancel` fires.
pub async fn narration_tap(
    name: String,
    mut from_actor: Receiver<GatewayMessage>,
    to_gateway: Sender<GatewayMessage>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    cancel: CancellationToken,
) {
    tracing::info!(gateway = %name, "Narration started");
    let link = format!("{}-narration->gateway", name);

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = from_actor.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let Some(text) = message.text.clone().filter(|t| !t.is_empty()) else {
            send_or_drop(&to_gateway, message, &link);
            continue;
        };

        let narrated = tokio::select! {
            _ = cancel.cancelled() => break,
            clip = synthesizer.synthesize(&text) => match clip {
                Ok(path) => message.with_audio(path.display().to_string()),
                Err(e) => {
                    tracing::warn!(gateway = %name, error = %e, "Sending text without audio");
                    message
                }
            },
        };

        send_or_drop(&to_gateway, narrated, &link);
    }

    tracing::info!(gateway = %name, "Narration stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::mpsc::channel;

    struct FlakySpeech {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl SpeechSynthesizer for FlakySpeech {
        async fn synthesize(&self, text: &str) -> Result<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                anyhow::bail!("transient");
            }
            Ok(PathBuf::from(format!("/tmp/{}.wav", text.len())))
        }
    }

    fn flaky(failures: u32) -> FlakySpeech {
        FlakySpeech {
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let speech = RetryingSynthesizer::new(flaky(2), 3).with_base_delay_ms(1);
        let path = speech.synthesize("hello").await.unwrap();

        assert_eq!(path, PathBuf::from("/tmp/5.wav"));
        assert_eq!(speech.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_is_bounded() {
        let speech = RetryingSynthesizer::new(flaky(10), 3).with_base_delay_ms(1);
        let err = speech.synthesize("hello").await.unwrap_err();

        assert!(err.to_string().contains("after 3 attempts"));
        assert_eq!(speech.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_tap_attaches_audio_or_passes_text_through() {
        let (actor_tx, actor_rx) = channel(4);
        let (gateway_tx, mut gateway_rx) = channel(4);
        let cancel = CancellationToken::new();
        let synthesizer: Arc<dyn SpeechSynthesizer> = Arc::new(flaky(1));

        let tap = tokio::spawn(narration_tap(
            "alice".to_string(),
            actor_rx,
            gateway_tx,
            synthesizer,
            cancel.clone(),
        ));

        actor_tx.send(GatewayMessage::text("first")).await.unwrap();
        actor_tx.send(GatewayMessage::text("second")).await.unwrap();

        let first = gateway_rx.recv().await.unwrap();
        assert_eq!(first.text.as_deref(), Some("first"));
        assert_eq!(first.audio, None);

        let second = gateway_rx.recv().await.unwrap();
        assert_eq!(second.audio.as_deref(), Some("/tmp/6.wav"));

        cancel.cancel();
        tap.await.unwrap();
    }
}
