//! Server configuration, read once at startup.
//!
//! ```yaml
//! swift_compiler_frontends:
//!   - /Library/Developer/Toolchains/swift-5.3.xctoolchain/usr/bin/swift
//! sdks:
//!   "MacOSX10.15": "/Applications/Xcode.app/Contents/Developer/Platforms/MacOSX.platform/Developer/SDKs/MacOSX10.15.sdk"
//! port: 8000
//! number_of_parallel_compilations: 4
//! compilation_timeout_seconds: 600
//! ```

use crate::error::ConfigFileError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Semaphore;

pub const DEFAULT_SERVER_CONFIG_FILE: &str = "flock_server_config.yaml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfiguration {
    pub swift_compiler_frontends: Vec<PathBuf>,
    pub sdks: BTreeMap<String, PathBuf>,
    pub port: u16,
    /// `None` means no limit.
    pub number_of_parallel_compilations: Option<usize>,
    pub compilation_timeout_seconds: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlServerConfig {
    #[serde(default)]
    swift_compiler_frontends: Vec<PathBuf>,
    #[serde(default)]
    sdks: BTreeMap<String, PathBuf>,
    port: u16,
    #[serde(default)]
    number_of_parallel_compilations: Option<usize>,
    #[serde(default = "default_compilation_timeout_seconds")]
    compilation_timeout_seconds: u64,
}

const fn default_compilation_timeout_seconds() -> u64 {
    600
}

impl ServerConfiguration {
    pub async fn from_file(path: &Path) -> Result<Self, ConfigFileError> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigFileError::NotFound(path.to_path_buf()));
            }
            Err(source) => {
                return Err(ConfigFileError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_contents(&contents)
    }

    pub fn from_contents(contents: &str) -> Result<Self, ConfigFileError> {
        let raw: YamlServerConfig = serde_yaml::from_str(contents)?;

        if let Some(frontend) = raw
            .swift_compiler_frontends
            .iter()
            .find(|frontend| !frontend.is_absolute())
        {
            return Err(ConfigFileError::SwiftFrontendNotAbsolutePath(
                frontend.clone(),
            ));
        }
        if let Some((name, path)) = raw.sdks.iter().find(|(_, path)| !path.is_absolute()) {
            return Err(ConfigFileError::SdkPathNotAbsolutePath {
                name: name.clone(),
                path: path.clone(),
            });
        }
        if raw
            .number_of_parallel_compilations
            .is_some_and(|limit| limit == 0 || limit > Semaphore::MAX_PERMITS)
        {
            return Err(ConfigFileError::NumberOfParallelCompilationsInvalid);
        }
        if raw.compilation_timeout_seconds == 0 {
            return Err(ConfigFileError::CompilationTimeoutInvalid);
        }

        Ok(Self {
            swift_compiler_frontends: raw.swift_compiler_frontends,
            sdks: raw.sdks,
            port: raw.port,
            number_of_parallel_compilations: raw.number_of_parallel_compilations,
            compilation_timeout_seconds: raw.compilation_timeout_seconds,
        })
    }

    pub const fn compilation_timeout(&self) -> Duration {
        Duration::from_secs(self.compilation_timeout_seconds)
    }
}
