use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use crate::config::Settings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Text-generation service seen by the agent actors.
///
/// Stateless per call: the caller passes the whole history every time.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        model: &str,
    ) -> Result<String>;
}

/// Builds a generator on first use. `LazyGenerator` calls it at most once.
pub type GeneratorFactory = Arc<dyn Fn() -> Result<Arc<dyn Generator>> + Send + Sync>;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

pub struct LLMClient {
    client: Client,
    api_key: String,
    settings: Settings,
    base_delay_ms: u64,
}

impl LLMClient {
    pub fn new(api_key: String, settings: Settings) -> Self {
        Self {
            client: Client::new(),
            api_key,
            settings,
            base_delay_ms: 1000,
        }
    }

    /// Overrides the first retry delay (doubles on each further attempt).
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Factory that reads the API key when the first turn needs a client.
    pub fn factory(settings: Settings) -> GeneratorFactory {
        Arc::new(move || -> Result<Arc<dyn Generator>> {
            let api_key = Settings::api_key()?;
            Ok(Arc::new(LLMClient::new(api_key, settings.clone())))
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.llm.api_base.trim_end_matches('/')
        )
    }

    pub async fn chat(&self, messages: Vec<ChatMessage>, model: &str) -> Result<String> {
        let request = ChatRequest {
            model,
            messages,
            max_tokens: self.settings.llm.max_tokens,
            temperature: self.settings.llm.temperature,
            stream: false,
        };

        const MAX_RETRIES: u32 = 3;

        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = self.base_delay_ms * 2_u64.pow(attempt - 1);
                tracing::warn!(
                    "[LLMClient] Retrying API call (attempt {}/{}) after {}ms delay",
                    attempt + 1,
                    MAX_RETRIES,
                    delay
                );
                tokio::time::sleep(tokio::time::Duration::from_millis(delay)).await;
            }

            let response_result = self
                .client
                .post(self.endpoint())
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&request)
                .send()
                .await;

            let response = match response_result {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!("[LLMClient] HTTP request failed: {}", e);
                    last_error = Some(anyhow::anyhow!("HTTP request failed: {}", e));
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
                tracing::warn!(
                    "[LLMClient] API returned error status {}: {}",
                    status,
                    error_text
                );
                last_error = Some(anyhow::anyhow!("API error {}: {}", status, error_text));
                continue;
            }

            let chat_response = match response.json::<ChatResponse>().await {
                Ok(cr) => cr,
                Err(e) => {
                    tracing::warn!("[LLMClient] Failed to decode response body: {}", e);
                    last_error = Some(anyhow::anyhow!("Response decode error: {}", e));
                    continue;
                }
            };

            return chat_response
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| anyhow::anyhow!("API response contained no choices"));
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("All retry attempts failed")))
    }
}

#[async_trait]
impl Generator for LLMClient {
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        model: &str,
    ) -> Result<String> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend_from_slice(history);
        self.chat(messages, model).await
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("generation client unavailable: {0}")]
pub struct GeneratorUnavailable(pub String);

/// Generator bound on first use and kept for the life of the process.
///
/// A failed construction is cached too; later calls get the same error
/// without running the factory again.
pub struct LazyGenerator {
    factory: GeneratorFactory,
    cell: OnceCell<Result<Arc<dyn Generator>, String>>,
}

impl LazyGenerator {
    pub fn new(factory: GeneratorFactory) -> Self {
        Self {
            factory,
            cell: OnceCell::new(),
        }
    }

    pub fn get(&self) -> Result<Arc<dyn Generator>, GeneratorUnavailable> {
        let bound = self.cell.get_or_init(|| match (self.factory)() {
            Ok(generator) => {
                tracing::info!("[LLMClient] Generation client initialized");
                Ok(generator)
            }
            Err(e) => {
                tracing::error!("[LLMClient] Failed to construct generation client: {}", e);
                Err(e.to_string())
            }
        });

        bound.clone().map_err(GeneratorUnavailable)
    }
}
