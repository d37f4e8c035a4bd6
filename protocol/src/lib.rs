//! Wire protocol for flock distributed builds
//!
//! The client ships one [`CompileRequest`] per connection and the server
//! answers with exactly one [`CompileResponse`]. Both travel as
//! length-prefixed bincode frames, see [`wire`].

pub mod inputs;
pub mod messages;
pub mod wire;

pub use inputs::InvalidInputs;
pub use inputs::OutputKind;
pub use inputs::OutputPathMap;
pub use inputs::RemoteCompilationInfo;
pub use inputs::RemoteCompilationInputs;
pub use inputs::SourceFileIndex;
pub use messages::ArtifactMap;
pub use messages::CompileArtifacts;
pub use messages::CompileRequest;
pub use messages::CompileResponse;
pub use messages::FailureReason;
pub use wire::MAX_FRAME_LEN;
pub use wire::ProtocolError;
pub use wire::read_frame;
pub use wire::write_frame;
