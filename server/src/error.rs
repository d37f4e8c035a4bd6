use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ConfigFileError {
    #[error("server config {} not found", .0.display())]
    NotFound(PathBuf),

    #[error("could not read server config {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    /// Not YAML, a non-string or unknown key, a missing or invalid port, or
    /// an `sdks` value that is not a mapping of strings.
    #[error("invalid server config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("swift_compiler_frontends entry is not an absolute path: {}", .0.display())]
    SwiftFrontendNotAbsolutePath(PathBuf),

    #[error("sdk {name} path is not absolute: {}", path.display())]
    SdkPathNotAbsolutePath { name: String, path: PathBuf },

    #[error(
        "number_of_parallel_compilations must be between 1 and {}",
        tokio::sync::Semaphore::MAX_PERMITS
    )]
    NumberOfParallelCompilationsInvalid,

    #[error("compilation_timeout_seconds must be at least 1")]
    CompilationTimeoutInvalid,
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigFileError),

    #[error("could not run {} --version: {source}", path.display())]
    FrontendUnavailable { path: PathBuf, source: io::Error },

    #[error("{} --version exited with {status}: {stderr}", path.display())]
    FrontendVersionFailed {
        path: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("could not listen on {address}: {source}")]
    Bind { address: String, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),
}
