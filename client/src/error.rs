use flock_protocol::FailureReason;
use flock_protocol::OutputKind;
use flock_protocol::ProtocolError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ConfigFileError {
    #[error("could not read client config {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid client config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("timeout for server {host}:{port} must be at least one second")]
    ZeroTimeout { host: String, port: u16 },
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigFileError),

    #[error("no servers configured")]
    NoServersConfigured,

    #[error("could not connect to {address}: {source}")]
    ConnectionFailed { address: String, source: io::Error },

    #[error("no response from {address} within {seconds}s")]
    Timeout { address: String, seconds: u64 },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("server failed the request ({reason}): {message}")]
    ServerFailure {
        reason: FailureReason,
        message: String,
    },

    #[error("server returned no {kind} output for {}", path.display())]
    MissingArtifact { path: PathBuf, kind: OutputKind },

    #[error(transparent)]
    Io(#[from] io::Error),
}
