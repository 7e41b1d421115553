pub mod backend;
pub mod chunk;
pub mod convert;
pub mod file;

#[cfg(feature = "microphone")]
pub mod microphone;

pub use backend::{
    AudioChunk, AudioChunkSource, AudioFrame, AudioSource, AudioSourceFactory, CaptureConfig,
    CaptureProvider, ChunkEncoding,
};
pub use chunk::{encode_samples, ChunkAssembler};
pub use file::{AudioFile, FileChunkSource};
