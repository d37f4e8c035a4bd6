//! Sends a whole build's remote compilation to a flock server and places the
//! returned artifacts.

mod client;
mod config;
mod error;

pub use client::DistributedBuildClient;
pub use config::ClientConfiguration;
pub use config::DEFAULT_CLIENT_CONFIG_FILE;
pub use config::ServerDescriptor;
pub use error::ClientError;
pub use error::ConfigFileError;
pub use error::Result;
