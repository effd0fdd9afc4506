//! # Configuration Management
//!
//! Loads the gateway configuration from multiple sources:
//! - Default values (built into the code)
//! - TOML configuration file (config.toml, optional)
//! - Environment variables (with APP_ prefix)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_SERVER_PORT, ...)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! `HOST`, `PORT` and `OLLAMA_API_KEY` are honored without the APP_ prefix
//! because deployment environments commonly set them bare.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration. Read once at startup and treated as an
/// immutable snapshot for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub cleanup: CleanupConfig,
    pub limits: LimitsConfig,
}

/// Network listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind. The gateway is a local service, so the default stays
    /// on loopback.
    pub host: String,
    pub port: u16,
}

/// Speech-recognition model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Whisper model tier ("tiny", "base", "small", "medium", "large")
    pub size: String,
    /// Execution device preference ("auto", "cpu", "cuda", "metal")
    pub device: String,
    /// Numeric precision for model weights ("float16", "float32")
    pub compute_type: String,
}

/// LLM cleanup pass settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Global toggle. When false the gateway never contacts the LLM service
    /// and every request gets the raw transcription back as cleaned text.
    pub enabled: bool,
    /// Chat model to request from the LLM service.
    pub model: String,
    /// Base URL of the Ollama-compatible chat endpoint.
    pub endpoint: String,
    /// Default credential; individual requests may override it per call.
    pub api_key: String,
}

/// Request limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum accepted audio payload in bytes. 32 MiB is roughly 17 minutes
    /// of 16-bit 16 kHz mono WAV, far beyond a dictation clip.
    pub max_audio_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 5678,
            },
            model: ModelConfig {
                size: "tiny".to_string(),
                device: "auto".to_string(),
                compute_type: "float16".to_string(),
            },
            cleanup: CleanupConfig {
                enabled: true,
                model: "gpt-oss:120b".to_string(),
                endpoint: "https://ollama.com".to_string(),
                api_key: String::new(),
            },
            limits: LimitsConfig {
                max_audio_bytes: 32 * 1024 * 1024,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml and the environment.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Bare variables commonly set by deployment environments and
        // desktop client integrations.
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(key) = env::var("OLLAMA_API_KEY") {
            settings = settings.set_override("cleanup.api_key", key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate the configuration before the server starts. Catching these
    /// early gives a clear startup error instead of a failed model load or an
    /// unbindable listener later.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.limits.max_audio_bytes == 0 {
            return Err(anyhow::anyhow!("Audio payload limit must be greater than 0"));
        }

        self.model
            .size
            .parse::<crate::transcription::ModelSize>()
            .map_err(|e| anyhow::anyhow!("Invalid model size: {}", e))?;

        self.model
            .device
            .parse::<crate::device::DevicePreference>()
            .map_err(|e| anyhow::anyhow!("Invalid device preference: {}", e))?;

        self.model
            .compute_type
            .parse::<crate::device::ComputeType>()
            .map_err(|e| anyhow::anyhow!("Invalid compute type: {}", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5678);
        assert_eq!(config.model.size, "tiny");
        assert!(config.cleanup.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_port_zero() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_unknown_model_size() {
        let mut config = AppConfig::default();
        config.model.size = "gigantic".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_zero_payload_limit() {
        let mut config = AppConfig::default();
        config.limits.max_audio_bytes = 0;
        assert!(config.validate().is_err());
    }
}
