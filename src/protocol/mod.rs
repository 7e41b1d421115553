pub mod artifact;
pub mod codec;
pub mod messages;

pub use artifact::TranslationArtifact;
pub use codec::{Inbound, ProtocolCodec, ProtocolDecodeError, ProtocolDialect};
pub use messages::{ClientMessage, ServerMessage};
