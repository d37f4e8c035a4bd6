use crate::dependency_analysis::SwiftDepsParseError;
use crate::job::JobKind;
use flock_protocol::InvalidInputs;
use flock_protocol::OutputKind;
use std::error::Error;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlockErr>;

#[derive(Error, Debug)]
pub enum FlockErr {
    /// A declaration record could not be parsed. The build is abandoned.
    #[error("malformed swiftdeps file {}: {source}", path.display())]
    SwiftDepsFile {
        path: PathBuf,
        source: SwiftDepsParseError,
    },

    /// The build plan has no declaration record for a source file it lists.
    #[error("no swiftdeps output recorded for {}", .0.display())]
    MissingSwiftDeps(PathBuf),

    #[error("invalid output file map {}: {source}", path.display())]
    OutputFileMap {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("{kind} job exited with {status}: {stderr}")]
    JobFailed {
        kind: JobKind,
        status: String,
        stderr: String,
    },

    /// Planning reported errors; nothing may be executed.
    #[error("distributed build planning emitted {0} error(s)")]
    PlanningFailed(usize),

    /// Returned by a [`crate::executor::RemoteExecutor`] when the remote side
    /// could not produce artifacts. The concrete executor error is kept as the
    /// source so callers can downcast it.
    #[error("remote compilation failed: {0}")]
    Dispatch(#[source] Box<dyn Error + Send + Sync>),

    #[error("remote compilation request rejected before dispatch: {0}")]
    InvalidRemoteInputs(#[from] InvalidInputs),

    #[error("remote compilation returned no {kind} output for {}", path.display())]
    MissingArtifact { path: PathBuf, kind: OutputKind },

    #[error(transparent)]
    Io(#[from] io::Error),
}
