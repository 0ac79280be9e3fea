use anyhow::{Context, Result};
use serde::Deserialize;

use crate::live::transport::{
    DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_SYSTEM_INSTRUCTION, DEFAULT_VOICE,
};

/// Prefix of environment overrides, e.g. `CURELINK__LIVE__API_KEY`
const ENV_PREFIX: &str = "CURELINK";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub live: LiveSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "curelink-voice".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub block_size: usize,
    pub max_pending_frames: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            block_size: 4096,
            max_pending_frames: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveSettings {
    pub endpoint: String,
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    pub api_key: Option<String>,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            api_key: None,
        }
    }
}

impl Config {
    /// Load from `path` (any extension the `config` crate knows; the file is
    /// optional) with environment overrides applied on top
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        let config: Self = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject audio settings the capture and playback paths cannot run with
    pub fn validate(&self) -> Result<()> {
        let audio = &self.audio;
        if audio.input_sample_rate == 0 || audio.output_sample_rate == 0 {
            anyhow::bail!(
                "Sample rates must be positive (input {}Hz, output {}Hz)",
                audio.input_sample_rate,
                audio.output_sample_rate
            );
        }
        if audio.block_size == 0 {
            anyhow::bail!("audio.block_size must be at least 1 sample");
        }
        if audio.max_pending_frames == 0 {
            anyhow::bail!("audio.max_pending_frames must be at least 1");
        }
        Ok(())
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.service.http.bind, self.service.http.port)
    }
}
