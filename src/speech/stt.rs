//! Transcription contract and clients.
//!
//! A finished capture yields a WAV artifact; something has to turn that
//! into text. The trait keeps the conversation engine ignorant of which
//! recognizer runs behind it, and the timeout wrapper bounds a turn even
//! when the recognizer wedges on a long utterance.

use crate::defaults;
use crate::error::{Result, VocoachError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Speech-to-text over a finished capture artifact.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the WAV at `artifact` using the given model size
    /// ("tiny", "base", "small", ...).
    async fn transcribe(&self, artifact: &Path, model: &str) -> Result<String>;
}

/// Bound a transcription to `timeout`; on expiry the attempt is abandoned
/// and reported as a timeout, not left running the turn open.
pub async fn transcribe_with_timeout(
    transcriber: &dyn Transcriber,
    artifact: &Path,
    model: &str,
    timeout: Duration,
) -> Result<String> {
    match tokio::time::timeout(timeout, transcriber.transcribe(artifact, model)).await {
        Ok(result) => result,
        Err(_) => Err(VocoachError::TranscriptionTimeout {
            timeout_secs: timeout.as_secs(),
        }),
    }
}

/// Client for the speech-understanding sidecar's HTTP endpoint.
pub struct HttpTranscriber {
    client: reqwest::Client,
    base_url: String,
}

#[derive(serde::Deserialize)]
struct TranscriptResponse {
    text: String,
}

impl HttpTranscriber {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("http://{}:{}", host, port),
        }
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, artifact: &Path, model: &str) -> Result<String> {
        let audio = tokio::fs::read(artifact).await?;
        let response = self
            .client
            .post(format!("{}/transcribe", self.base_url))
            .query(&[("model", model)])
            .header("content-type", "audio/wav")
            .body(audio)
            .timeout(defaults::TRANSCRIPTION_TIMEOUT)
            .send()
            .await
            .map_err(|e| VocoachError::Transcription {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(VocoachError::Transcription {
                message: format!("recognizer returned {}", response.status()),
            });
        }

        let body: TranscriptResponse =
            response
                .json()
                .await
                .map_err(|e| VocoachError::Transcription {
                    message: e.to_string(),
                })?;
        Ok(body.text)
    }
}

/// Scripted transcriber for tests.
pub struct MockTranscriber {
    transcripts: Mutex<VecDeque<Result<String>>>,
    delay: Option<Duration>,
}

impl MockTranscriber {
    pub fn new() -> Self {
        Self {
            transcripts: Mutex::new(VecDeque::new()),
            delay: None,
        }
    }

    /// Queue a transcript to return on the next call.
    pub fn with_transcript(self, text: &str) -> Self {
        self.transcripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(text.to_string()));
        self
    }

    /// Queue a failure to return on the next call.
    pub fn with_failure(self, message: &str) -> Self {
        self.transcripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(VocoachError::Transcription {
                message: message.to_string(),
            }));
        self
    }

    /// Sleep this long before answering, to exercise timeout paths.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Default for MockTranscriber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _artifact: &Path, _model: &str) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .transcripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        next.unwrap_or_else(|| {
            Err(VocoachError::Transcription {
                message: "no scripted transcript".to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn mock_returns_scripted_transcripts_in_order() {
        let transcriber = MockTranscriber::new()
            .with_transcript("first answer")
            .with_transcript("second answer");
        let path = PathBuf::from("/tmp/none.wav");
        assert_eq!(
            transcriber.transcribe(&path, "base").await.unwrap(),
            "first answer"
        );
        assert_eq!(
            transcriber.transcribe(&path, "base").await.unwrap(),
            "second answer"
        );
        assert!(transcriber.transcribe(&path, "base").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_transcription_times_out() {
        let transcriber = MockTranscriber::new()
            .with_transcript("too late")
            .with_delay(Duration::from_secs(120));
        let path = PathBuf::from("/tmp/none.wav");

        let result =
            transcribe_with_timeout(&transcriber, &path, "base", Duration::from_secs(60)).await;
        assert!(matches!(
            result,
            Err(VocoachError::TranscriptionTimeout { timeout_secs: 60 })
        ));
    }

    #[tokio::test]
    async fn fast_transcription_passes_through_the_wrapper() {
        let transcriber = MockTranscriber::new().with_transcript("on time");
        let path = PathBuf::from("/tmp/none.wav");
        let text = transcribe_with_timeout(&transcriber, &path, "base", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(text, "on time");
    }

    #[tokio::test]
    async fn scripted_failures_surface_as_errors() {
        let transcriber = MockTranscriber::new().with_failure("model not loaded");
        let path = PathBuf::from("/tmp/none.wav");
        let err = transcriber.transcribe(&path, "base").await.unwrap_err();
        assert!(matches!(err, VocoachError::Transcription { .. }));
    }
}
