pub mod audio;
pub mod config;
pub mod entitlement;
pub mod error;
pub mod http;
pub mod protocol;
pub mod session;
pub mod transport;

pub use audio::{
    AudioChunk, AudioChunkSource, AudioFile, AudioFrame, AudioSource, AudioSourceFactory,
    CaptureConfig, CaptureProvider, ChunkEncoding,
};
pub use config::Config;
pub use entitlement::{
    ChargeDescriptor, EntitlementGate, GateDecision, HttpPaymentBridge, PaymentCapability,
    PaymentOutcome,
};
pub use error::SessionError;
pub use http::{create_router, AppState};
pub use protocol::{ClientMessage, Inbound, ProtocolCodec, ProtocolDialect, TranslationArtifact};
pub use session::{
    SessionConfig, SessionDeps, SessionHandle, SessionNotification, SessionState, SessionStats,
    TranslationSession,
};
pub use transport::{Connection, Connector, Frame, Transport, TransportEvent, WebSocketConnector};
