use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub llm: LLMConfig,
    pub gateway: GatewayConfig,
    pub system: SystemConfig,
    pub audio: AudioConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    pub api_base: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub host: String,
    pub responder_port: u16,
    pub initiator_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub channel_buffer_size: usize,
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub enabled: bool,
    pub api_base: String,
    pub model: String,
    pub output_dir: String,
    pub max_attempts: u32,
    pub responder_voice: String,
    pub initiator_voice: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());

        let config = Self::with_defaults(Config::builder())?
            .add_source(File::with_name(&format!("config/{}", config_env)).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Flat variables understood by the original deployment scripts
            .set_override_option("gateway.responder_port", env::var("ALICE_PORT").ok())?
            .set_override_option("gateway.initiator_port", env::var("BOB_PORT").ok())?
            .set_override_option("system.channel_buffer_size", env::var("CHANNEL_BUFFER").ok())?
            .build()?;

        config.try_deserialize()
    }

    /// Settings built from the compiled-in defaults only.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::with_defaults(Config::builder())?.build()?.try_deserialize()
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("llm.api_base", "https://api.openai.com/v1")?
            .set_default("llm.model", "gpt-4o-mini")?
            .set_default("llm.max_tokens", 1024)?
            .set_default("llm.temperature", 0.7)?
            .set_default("gateway.host", "127.0.0.1")?
            .set_default("gateway.responder_port", 3001)?
            .set_default("gateway.initiator_port", 3002)?
            .set_default("system.channel_buffer_size", 10)?
            .set_default("system.shutdown_grace_ms", 5000)?
            .set_default("audio.enabled", false)?
            .set_default(
                "audio.api_base",
                "https://generativelanguage.googleapis.com/v1beta",
            )?
            .set_default("audio.model", "gemini-2.5-flash-preview-tts")?
            .set_default("audio.output_dir", "./audio")?
            .set_default("audio.max_attempts", 3)?
            .set_default("audio.responder_voice", "Kore")?
            .set_default("audio.initiator_voice", "Puck")?
            .set_default("logging.level", "info")
    }

    /// Channel depth used for every link in the fabric; tokio needs at least one slot.
    pub fn channel_capacity(&self) -> usize {
        self.system.channel_buffer_size.max(1)
    }

    pub fn api_key() -> Result<String> {
        env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))
    }

    pub fn speech_api_key() -> Result<String> {
        env::var("GOOGLE_API_KEY")
            .map_err(|_| anyhow::anyhow!("GOOGLE_API_KEY environment variable not set"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_original_deployment() {
        let settings = Settings::defaults().unwrap();

        assert_eq!(settings.gateway.responder_port, 3001);
        assert_eq!(settings.gateway.initiator_port, 3002);
        assert_eq!(settings.system.channel_buffer_size, 10);
        assert_eq!(settings.audio.max_attempts, 3);
        assert!(!settings.audio.enabled);
    }

    #[test]
    fn test_zero_buffer_is_clamped() {
        let mut settings = Settings::defaults().unwrap();
        settings.system.channel_buffer_size = 0;
        assert_eq!(settings.channel_capacity(), 1);
    }
}
