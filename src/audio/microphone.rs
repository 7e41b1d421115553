// Microphone capture via cpal
//
// cpal streams are not Send on every platform, so the stream lives on a
// dedicated capture thread. The thread reports whether the device could be
// acquired, then drains the callback buffer once per cadence tick.

use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::backend::{AudioChunk, AudioChunkSource, AudioFrame, CaptureConfig};
use super::chunk::ChunkAssembler;
use super::convert::{f32_to_i16, process_frame};
use crate::error::SessionError;

/// Default input device capture
pub struct MicrophoneSource {
    config: CaptureConfig,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    used: bool,
}

impl MicrophoneSource {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
            used: false,
        }
    }
}

#[async_trait::async_trait]
impl AudioChunkSource for MicrophoneSource {
    async fn start(
        &mut self,
        cadence: Duration,
    ) -> Result<mpsc::Receiver<AudioChunk>, SessionError> {
        if self.used {
            return Err(SessionError::CaptureUnavailable(
                "microphone source already used; create a new one".to_string(),
            ));
        }
        self.used = true;

        let (chunk_tx, chunk_rx) = mpsc::channel(self.config.channel_capacity);
        let (ready_tx, ready_rx) = oneshot::channel();
        let config = self.config.clone();
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        let thread = std::thread::Builder::new()
            .name("femseek-microphone".to_string())
            .spawn(move || capture_thread(config, cadence, running, chunk_tx, ready_tx))
            .map_err(|e| SessionError::CaptureUnavailable(format!("capture thread: {}", e)))?;

        match ready_rx.await {
            Ok(Ok(device_name)) => {
                info!("Microphone capture started on {}", device_name);
                self.thread = Some(thread);
                Ok(chunk_rx)
            }
            Ok(Err(reason)) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = thread.join();
                Err(SessionError::CaptureUnavailable(reason))
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                Err(SessionError::CaptureUnavailable(
                    "capture thread exited before the device opened".to_string(),
                ))
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);

        if let Some(thread) = self.thread.take() {
            info!("Stopping microphone capture");
            tokio::task::spawn_blocking(move || thread.join())
                .await?
                .map_err(|_| anyhow::anyhow!("Microphone capture thread panicked"))?;
            info!("Microphone released");
        }

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.thread.is_some() && self.running.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn stream_error(err: cpal::StreamError) {
    error!("Audio stream error: {}", err);
}

fn capture_thread(
    config: CaptureConfig,
    cadence: Duration,
    running: Arc<AtomicBool>,
    chunk_tx: mpsc::Sender<AudioChunk>,
    ready_tx: oneshot::Sender<Result<String, String>>,
) {
    let host = cpal::default_host();
    let device = match host.default_input_device() {
        Some(device) => device,
        None => {
            let _ = ready_tx.send(Err("no input device available".to_string()));
            return;
        }
    };
    let device_name = device.name().unwrap_or_else(|_| "default input".to_string());

    let supported = match device.default_input_config() {
        Ok(supported) => supported,
        Err(e) => {
            let _ = ready_tx.send(Err(format!("failed to query input config: {}", e)));
            return;
        }
    };

    let device_rate = supported.sample_rate().0;
    let device_channels = supported.channels();
    let buffer: Arc<Mutex<Vec<i16>>> = Arc::new(Mutex::new(Vec::new()));

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => {
            let buffer = Arc::clone(&buffer);
            device.build_input_stream(
                &supported.config(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend(f32_to_i16(data));
                    }
                },
                stream_error,
                None,
            )
        }
        cpal::SampleFormat::I16 => {
            let buffer = Arc::clone(&buffer);
            device.build_input_stream(
                &supported.config(),
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                stream_error,
                None,
            )
        }
        other => {
            let _ = ready_tx.send(Err(format!("unsupported sample format {:?}", other)));
            return;
        }
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            // Permission denials surface here on most platforms
            let _ = ready_tx.send(Err(format!("failed to open input stream: {}", e)));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(format!("failed to start input stream: {}", e)));
        return;
    }

    if ready_tx.send(Ok(device_name)).is_err() {
        return;
    }

    debug!(
        "Capturing {}Hz, {} channels (target {}Hz, {} channels)",
        device_rate, device_channels, config.target_sample_rate, config.target_channels
    );

    let started = std::time::Instant::now();
    let mut assembler: Option<ChunkAssembler> = None;

    'capture: while running.load(Ordering::SeqCst) {
        std::thread::sleep(cadence);

        let samples = match buffer.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(_) => break,
        };
        if samples.is_empty() {
            continue;
        }

        let frame = process_frame(
            AudioFrame {
                samples,
                sample_rate: device_rate,
                channels: device_channels,
                timestamp_ms: started.elapsed().as_millis() as u64,
            },
            config.target_sample_rate,
            config.target_channels,
        );

        let assembler = assembler.get_or_insert_with(|| {
            if frame.sample_rate != config.target_sample_rate {
                warn!(
                    "Device rate {}Hz has no integer decimation to {}Hz, streaming at {}Hz",
                    device_rate, config.target_sample_rate, frame.sample_rate
                );
            }
            ChunkAssembler::new(frame.sample_rate, frame.channels, config.encoding, cadence)
        });

        let chunks = match assembler.push(&frame.samples) {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!("Failed to encode microphone chunk: {}", e);
                continue;
            }
        };

        for chunk in chunks {
            if chunk_tx.blocking_send(chunk).is_err() {
                debug!("Chunk receiver dropped, stopping microphone capture");
                break 'capture;
            }
        }
    }

    // Dropping the stream releases the device
    drop(stream);
    running.store(false, Ordering::SeqCst);
    debug!("Microphone capture thread stopped");
}
