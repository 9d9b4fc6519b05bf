//! Gemini TTS client
//!
//! Information Hiding:
//! - REST request/response shapes hidden
//! - Base64 PCM decoding and WAV packaging internalized

use super::wav::{write_wav, PcmFormat};
use super::SpeechSynthesizer;
use crate::config::AudioConfig;
use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}

pub struct GeminiSpeech {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    voice: String,
    output_dir: PathBuf,
    prefix: String,
    counter: AtomicU64,
}

impl GeminiSpeech {
    pub fn new(api_key: String, config: &AudioConfig, voice: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            voice: voice.into(),
            output_dir: PathBuf::from(&config.output_dir),
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }

    fn next_path(&self) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let stamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        self.output_dir
            .join(format!("{}-{}-{}.wav", self.prefix, stamp, n))
    }

    async fn fetch_pcm(&self, text: &str) -> Result<Vec<u8>> {
        // The pause keeps back-to-back clips from running together.
        let prompt = format!("\"{}\", wait 2 seconds after speaking", text);
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": self.voice }
                    }
                }
            }
        });

        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.api_base, self.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("Speech API error {}: {}", status, error_text);
        }

        let parsed: GenerateResponse = response.json().await?;
        let data = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.inline_data)
            .ok_or_else(|| anyhow::anyhow!("No audio in speech response"))?;

        let pcm = base64::engine::general_purpose::STANDARD.decode(data.data)?;
        if pcm.is_empty() {
            anyhow::bail!("Empty audio data received");
        }
        Ok(pcm)
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiSpeech {
    async fn synthesize(&self, text: &str) -> Result<PathBuf> {
        let pcm = self.fetch_pcm(text).await?;
        let path = self.next_path();
        write_wav(&path, &pcm, PcmFormat::default()).await?;
        tracing::debug!(path = %path.display(), bytes = pcm.len(), "Speech clip written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use tempfile::tempdir;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer, dir: &std::path::Path) -> AudioConfig {
        let mut config = Settings::defaults().unwrap().audio;
        config.api_base = server.uri();
        config.model = "tts-model".to_string();
        config.output_dir = dir.display().to_string();
        config
    }

    #[tokio::test]
    async fn test_synthesize_writes_wav() {
        let mock_server = MockServer::start().await;
        let dir = tempdir().unwrap();
        let pcm = base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3, 4]);

        Mock::given(method("POST"))
            .and(path("/models/tts-model:generateContent"))
            .and(header("x-goog-api-key", "speech-key"))
            .and(body_partial_json(json!({
                "generationConfig": {"speechConfig": {"voiceConfig": {"prebuiltVoiceConfig": {"voiceName": "Kore"}}}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"inlineData": {"mimeType": "audio/pcm", "data": pcm}}]}}]
            })))
            .mount(&mock_server)
            .await;

        let speech = GeminiSpeech::new(
            "speech-key".to_string(),
            &config_for(&mock_server, dir.path()),
            "Kore",
            "alice",
        );
        let clip = speech.synthesize("Rivers are waterways.").await.unwrap();

        assert!(clip.starts_with(dir.path()));
        let bytes = std::fs::read(&clip).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[44..], &[1u8, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_missing_audio_is_an_error() {
        let mock_server = MockServer::start().await;
        let dir = tempdir().unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&mock_server)
            .await;

        let speech = GeminiSpeech::new(
            "speech-key".to_string(),
            &config_for(&mock_server, dir.path()),
            "Puck",
            "bob",
        );
        assert!(speech.synthesize("hello").await.is_err());
    }
}
