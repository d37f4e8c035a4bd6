use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("no input files")]
    NoInputFiles,

    #[error("local builds are not supported; pass --distributed")]
    DistributedNotRequested,

    #[error("distributed build is not possible with these options")]
    DistributedBuildUnavailable,

    #[error("could not determine compiler version from {}: {message}", swiftc.display())]
    CompilerVersion { swiftc: PathBuf, message: String },

    #[error("frontend option contains a character that cannot be quoted: {0:?}")]
    FrontendOptions(String),

    #[error(transparent)]
    Core(#[from] flock_core::FlockErr),

    #[error(transparent)]
    ClientConfig(#[from] flock_client::ConfigFileError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
