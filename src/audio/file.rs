use anyhow::{Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{AudioChunk, AudioChunkSource, AudioFrame, CaptureConfig};
use super::chunk::ChunkAssembler;
use super::convert::process_frame;
use crate::error::SessionError;

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            anyhow::bail!(
                "Unsupported WAV format: {} bit {:?} (expected 16 bit PCM)",
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds = samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Samples converted to the capture target format
    pub fn to_frame(&self, config: &CaptureConfig) -> AudioFrame {
        let frame = AudioFrame {
            samples: self.samples.clone(),
            sample_rate: self.sample_rate,
            channels: self.channels,
            timestamp_ms: 0,
        };

        process_frame(frame, config.target_sample_rate, config.target_channels)
    }
}

/// Replays a WAV file as if it were being captured live
///
/// One chunk is emitted per cadence tick. With `looped` the file repeats
/// forever, which makes it a stand-in for a microphone in demos and tests.
pub struct FileChunkSource {
    path: PathBuf,
    looped: bool,
    config: CaptureConfig,
    task: Option<JoinHandle<()>>,
    used: bool,
}

impl FileChunkSource {
    pub fn new(path: PathBuf, looped: bool, config: CaptureConfig) -> Self {
        Self {
            path,
            looped,
            config,
            task: None,
            used: false,
        }
    }
}

#[async_trait::async_trait]
impl AudioChunkSource for FileChunkSource {
    async fn start(
        &mut self,
        cadence: Duration,
    ) -> Result<mpsc::Receiver<AudioChunk>, SessionError> {
        if self.used {
            return Err(SessionError::CaptureUnavailable(
                "file source already used; create a new one".to_string(),
            ));
        }
        self.used = true;

        if cadence.is_zero() {
            return Err(SessionError::CaptureUnavailable(
                "capture cadence must be positive".to_string(),
            ));
        }

        let audio = AudioFile::open(&self.path)
            .map_err(|e| SessionError::CaptureUnavailable(format!("{:#}", e)))?;
        let frame = audio.to_frame(&self.config);
        if frame.sample_rate != self.config.target_sample_rate {
            warn!(
                "{} is {}Hz; no integer decimation reaches {}Hz, streaming at {}Hz",
                audio.path, audio.sample_rate, self.config.target_sample_rate, frame.sample_rate
            );
        }

        if frame.samples.is_empty() {
            return Err(SessionError::CaptureUnavailable(format!(
                "{} contains no audio",
                audio.path
            )));
        }

        info!(
            "Starting file capture: {} (cadence={}ms, looped={})",
            audio.path,
            cadence.as_millis(),
            self.looped
        );

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let mut assembler = ChunkAssembler::new(
            frame.sample_rate,
            frame.channels,
            self.config.encoding,
            cadence,
        );
        let looped = self.looped;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cadence);
            let step = assembler.samples_per_chunk();
            let mut position = 0usize;

            loop {
                ticker.tick().await;

                let end = (position + step).min(frame.samples.len());
                let mut chunks = match assembler.push(&frame.samples[position..end]) {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        warn!("Failed to encode file chunk: {}", e);
                        break;
                    }
                };
                position = end;

                if position >= frame.samples.len() {
                    if looped {
                        position = 0;
                    } else {
                        match assembler.flush() {
                            Ok(Some(tail)) => chunks.push(tail),
                            Ok(None) => {}
                            Err(e) => warn!("Failed to encode final file chunk: {}", e),
                        }
                    }
                }

                for chunk in chunks {
                    if tx.send(chunk).await.is_err() {
                        debug!("Chunk receiver dropped, stopping file capture");
                        return;
                    }
                }

                if !looped && position >= frame.samples.len() {
                    break;
                }
            }

            info!("File capture finished");
        });

        self.task = Some(task);

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            info!("Stopping file capture: {}", self.path.display());
            task.abort();
        }

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}

impl Drop for FileChunkSource {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
