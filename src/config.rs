use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::{AudioSource, CaptureConfig, ChunkEncoding};
use crate::entitlement::ChargeDescriptor;
use crate::protocol::ProtocolDialect;
use crate::session::{ServerErrorPolicy, SessionConfig, StartPolicy};

/// Environment overrides look like `FEMSEEK__AUDIO__CADENCE_MS=500`
const ENV_PREFIX: &str = "FEMSEEK";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub protocol: ProtocolDialect,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub endpoint_url: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Microphone,
    File,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub cadence_ms: u64,
    pub sample_rate: u32,
    pub channels: u16,
    pub encoding: ChunkEncoding,
    pub source: SourceKind,
    pub file_path: Option<PathBuf>,
    pub looped: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            cadence_ms: 1000,
            sample_rate: 16000,
            channels: 1,
            encoding: ChunkEncoding::Wav,
            source: SourceKind::Microphone,
            file_path: None,
            looped: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub start_policy: StartPolicy,
    pub auth_timeout_ms: Option<u64>,
    pub payment_timeout_ms: Option<u64>,
    pub server_error_policy: ServerErrorPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    pub amount: u64,
    pub currency: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        let charge = ChargeDescriptor::default();
        Self {
            amount: charge.amount,
            currency: charge.currency,
        }
    }
}

impl Config {
    /// Load `path` (extension optional) layered with `FEMSEEK__*` variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        let cfg: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        cfg.validate()?;

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.service.endpoint_url.trim().is_empty() {
            bail!("service.endpoint_url must not be empty");
        }
        if self.audio.cadence_ms == 0 {
            bail!("audio.cadence_ms must be greater than zero");
        }
        if self.audio.sample_rate == 0 {
            bail!("audio.sample_rate must be greater than zero");
        }
        if self.audio.channels == 0 {
            bail!("audio.channels must be greater than zero");
        }
        if self.audio.source == SourceKind::File && self.audio.file_path.is_none() {
            bail!("audio.file_path is required when audio.source = \"file\"");
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            endpoint_url: self.service.endpoint_url.clone(),
            cadence: Duration::from_millis(self.audio.cadence_ms),
            start_policy: self.session.start_policy,
            auth_timeout: self.session.auth_timeout_ms.map(Duration::from_millis),
            payment_timeout: self.session.payment_timeout_ms.map(Duration::from_millis),
            server_error_policy: self.session.server_error_policy,
            ..SessionConfig::default()
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            target_sample_rate: self.audio.sample_rate,
            target_channels: self.audio.channels,
            encoding: self.audio.encoding,
            ..CaptureConfig::default()
        }
    }

    /// Configured capture source; `file_override` (from the CLI) wins
    pub fn audio_source(&self, file_override: Option<PathBuf>) -> Result<AudioSource> {
        if let Some(path) = file_override {
            return Ok(AudioSource::File {
                path,
                looped: self.audio.looped,
            });
        }

        match self.audio.source {
            SourceKind::Microphone if !cfg!(feature = "microphone") => bail!(
                "audio.source = \"microphone\" needs a build with `--features microphone`; \
                 use audio.source = \"file\" or pass --file"
            ),
            SourceKind::Microphone => Ok(AudioSource::Microphone),
            SourceKind::File => {
                let path = self
                    .audio
                    .file_path
                    .clone()
                    .context("audio.file_path is not set")?;
                Ok(AudioSource::File {
                    path,
                    looped: self.audio.looped,
                })
            }
        }
    }

    pub fn charge(&self) -> ChargeDescriptor {
        ChargeDescriptor {
            amount: self.payment.amount,
            currency: self.payment.currency.clone(),
        }
    }
}
