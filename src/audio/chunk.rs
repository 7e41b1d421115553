use anyhow::{Context, Result};
use std::io::Cursor;
use std::time::Duration;
use tracing::debug;

use super::backend::{AudioChunk, ChunkEncoding};

/// Encode interleaved samples into a chunk payload
pub fn encode_samples(
    samples: &[i16],
    sample_rate: u32,
    channels: u16,
    encoding: ChunkEncoding,
) -> Result<Vec<u8>> {
    match encoding {
        ChunkEncoding::Pcm16le => Ok(samples.iter().flat_map(|s| s.to_le_bytes()).collect()),
        ChunkEncoding::Wav => {
            let spec = hound::WavSpec {
                channels,
                sample_rate,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };

            let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
            {
                let mut writer = hound::WavWriter::new(&mut cursor, spec)
                    .context("Failed to create in-memory WAV writer")?;
                for &sample in samples {
                    writer
                        .write_sample(sample)
                        .context("Failed to write sample to WAV")?;
                }
                writer.finalize().context("Failed to finalize WAV chunk")?;
            }

            Ok(cursor.into_inner())
        }
    }
}

/// Cuts a continuous sample stream into fixed-duration chunks
///
/// Samples go in as they are captured; a chunk comes out every time a full
/// cadence worth of audio has accumulated.
pub struct ChunkAssembler {
    sample_rate: u32,
    channels: u16,
    encoding: ChunkEncoding,
    samples_per_chunk: usize,
    pending: Vec<i16>,
    next_sequence: u64,
    emitted_samples: u64,
}

impl ChunkAssembler {
    pub fn new(sample_rate: u32, channels: u16, encoding: ChunkEncoding, cadence: Duration) -> Self {
        let samples_per_chunk = (sample_rate as u128 * channels as u128 * cadence.as_millis()
            / 1000)
            .max(channels.max(1) as u128) as usize;

        debug!(
            "Chunk assembler: {}Hz, {} channels, {} samples per chunk",
            sample_rate, channels, samples_per_chunk
        );

        Self {
            sample_rate,
            channels,
            encoding,
            samples_per_chunk,
            pending: Vec::with_capacity(samples_per_chunk),
            next_sequence: 0,
            emitted_samples: 0,
        }
    }

    /// Number of interleaved samples in each full chunk
    pub fn samples_per_chunk(&self) -> usize {
        self.samples_per_chunk
    }

    /// Append samples and return every chunk that is now complete
    pub fn push(&mut self, samples: &[i16]) -> Result<Vec<AudioChunk>> {
        self.pending.extend_from_slice(samples);

        let mut chunks = Vec::new();
        while self.pending.len() >= self.samples_per_chunk {
            let rest = self.pending.split_off(self.samples_per_chunk);
            let full = std::mem::replace(&mut self.pending, rest);
            chunks.push(self.emit(&full)?);
        }

        Ok(chunks)
    }

    /// Emit whatever is buffered as a short final chunk
    pub fn flush(&mut self) -> Result<Option<AudioChunk>> {
        if self.pending.is_empty() {
            return Ok(None);
        }

        let rest = std::mem::take(&mut self.pending);
        self.emit(&rest).map(Some)
    }

    fn emit(&mut self, samples: &[i16]) -> Result<AudioChunk> {
        let per_second = self.sample_rate as u64 * self.channels.max(1) as u64;
        let timestamp_ms = if per_second == 0 {
            0
        } else {
            self.emitted_samples * 1000 / per_second
        };

        let data = encode_samples(samples, self.sample_rate, self.channels, self.encoding)?;

        let chunk = AudioChunk {
            sequence: self.next_sequence,
            data,
            timestamp_ms,
        };

        self.next_sequence += 1;
        self.emitted_samples += samples.len() as u64;

        Ok(chunk)
    }
}
