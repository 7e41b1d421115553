use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::SessionError;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// One encoded unit of captured audio, ready for the transport
///
/// Chunks are sent at most once and never retained afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Position in the source's output, starting at 0
    pub sequence: u64,
    /// Encoded payload, opaque to everything downstream
    pub data: Vec<u8>,
    /// Capture time of the first sample, relative to source start
    pub timestamp_ms: u64,
}

/// Container used for each chunk payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkEncoding {
    /// Self-contained WAV file per chunk
    Wav,
    /// Bare little-endian 16-bit PCM
    Pcm16le,
}

/// Configuration for capture sources
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate (will resample if needed)
    pub target_sample_rate: u32,
    /// Target channel count (1 = mono, 2 = stereo)
    pub target_channels: u16,
    /// Payload encoding for emitted chunks
    pub encoding: ChunkEncoding,
    /// Chunks buffered between the source and the session
    pub channel_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000, // 16kHz speech
            target_channels: 1,        // Mono
            encoding: ChunkEncoding::Wav,
            channel_capacity: 32,
        }
    }
}

/// Audio chunk source trait
///
/// A source is single-use: once stopped it cannot be started again, a new
/// one has to be created through a [`CaptureProvider`].
///
/// Implementations:
/// - Microphone: cpal default input device (feature `microphone`)
/// - File: WAV file replayed at capture cadence (testing/demos)
#[async_trait::async_trait]
pub trait AudioChunkSource: Send + Sync {
    /// Acquire the device and start producing chunks every `cadence`
    ///
    /// Fails with `CaptureUnavailable` (and produces nothing) if the device
    /// is denied, absent, or this source was already used.
    async fn start(&mut self, cadence: Duration)
        -> Result<mpsc::Receiver<AudioChunk>, SessionError>;

    /// Stop producing chunks and release the device
    async fn stop(&mut self) -> anyhow::Result<()>;

    /// Check if source is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get source name for logging
    fn name(&self) -> &str;
}

/// Creates fresh capture sources on demand
pub trait CaptureProvider: Send + Sync {
    fn create_source(&self) -> Result<Box<dyn AudioChunkSource>, SessionError>;
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Default input device
    Microphone,
    /// WAV file input, optionally replayed forever
    File { path: PathBuf, looped: bool },
}

/// Builds capture sources from an [`AudioSource`]
#[derive(Debug, Clone)]
pub struct AudioSourceFactory {
    source: AudioSource,
    config: CaptureConfig,
}

impl AudioSourceFactory {
    pub fn new(source: AudioSource, config: CaptureConfig) -> Self {
        Self { source, config }
    }

    /// Create a capture source based on platform and configuration
    pub fn create(
        source: &AudioSource,
        config: CaptureConfig,
    ) -> Result<Box<dyn AudioChunkSource>, SessionError> {
        match source {
            AudioSource::Microphone => {
                #[cfg(feature = "microphone")]
                {
                    Ok(Box::new(super::microphone::MicrophoneSource::new(config)))
                }

                #[cfg(not(feature = "microphone"))]
                {
                    let _ = config;
                    Err(SessionError::CaptureUnavailable(
                        "microphone capture requires the `microphone` feature".to_string(),
                    ))
                }
            }

            AudioSource::File { path, looped } => Ok(Box::new(
                super::file::FileChunkSource::new(path.clone(), *looped, config),
            )),
        }
    }
}

impl CaptureProvider for AudioSourceFactory {
    fn create_source(&self) -> Result<Box<dyn AudioChunkSource>, SessionError> {
        Self::create(&self.source, self.config.clone())
    }
}
