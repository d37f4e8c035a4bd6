//! Client configuration: which servers to talk to and how long to wait.
//!
//! ```yaml
//! servers:
//!   - { host: "127.0.0.1", port: 8000 }
//!   - host: "build-box.local"
//!     port: 8003
//!     timeout_seconds: 25
//! default_timeout_seconds: 60
//! ```

use crate::error::ConfigFileError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CLIENT_CONFIG_FILE: &str = "flock_client_config.yaml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDescriptor {
    pub host: String,
    pub port: u16,
    pub timeout_seconds: u64,
}

impl ServerDescriptor {
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfiguration {
    pub servers: Vec<ServerDescriptor>,
    pub default_timeout_seconds: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlServer {
    host: String,
    port: u16,
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlClientConfig {
    #[serde(default)]
    servers: Vec<YamlServer>,
    #[serde(default = "default_timeout_seconds")]
    default_timeout_seconds: u64,
}

const fn default_timeout_seconds() -> u64 {
    5
}

impl ClientConfiguration {
    pub async fn from_file(path: &Path) -> Result<Self, ConfigFileError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigFileError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
        Self::from_contents(&contents)
    }

    pub fn from_contents(contents: &str) -> Result<Self, ConfigFileError> {
        let raw: YamlClientConfig = serde_yaml::from_str(contents)?;
        let default_timeout_seconds = raw.default_timeout_seconds;
        let servers = raw
            .servers
            .into_iter()
            .map(|server| {
                let timeout_seconds = server.timeout_seconds.unwrap_or(default_timeout_seconds);
                if timeout_seconds == 0 {
                    return Err(ConfigFileError::ZeroTimeout {
                        host: server.host,
                        port: server.port,
                    });
                }
                Ok(ServerDescriptor {
                    host: server.host,
                    port: server.port,
                    timeout_seconds,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            servers,
            default_timeout_seconds,
        })
    }
}
