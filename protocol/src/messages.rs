//! Request and response payloads exchanged over one connection.

use crate::inputs::OutputKind;
use crate::inputs::RemoteCompilationInfo;
use crate::inputs::RemoteCompilationInputs;
use crate::inputs::SourceFileIndex;
use serde::Deserialize;
use serde::Serialize;
use serde_bytes::ByteBuf;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use strum_macros::Display;

/// Artifacts produced for one primary file, keyed by output kind.
pub type ArtifactMap = BTreeMap<OutputKind, ByteBuf>;

/// Artifacts for every primary file of a request.
pub type CompileArtifacts = BTreeMap<SourceFileIndex, ArtifactMap>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileRequest {
    pub inputs: RemoteCompilationInputs,
    pub info: RemoteCompilationInfo,

    /// Output kinds the server must produce for every primary file
    pub requested_outputs: BTreeSet<OutputKind>,

    /// `sources[i]` holds the contents of `inputs.source_files[i]`
    pub sources: Vec<ByteBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureReason {
    NoMatchingCompilerVersion,
    SdkNotFound,
    InvalidRequest,
    CompilationFailed,
    TimedOut,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompileResponse {
    Completed { artifacts: CompileArtifacts },
    Failed { reason: FailureReason, message: String },
}

impl CompileResponse {
    pub fn failed(reason: FailureReason, message: impl Into<String>) -> Self {
        CompileResponse::Failed {
            reason,
            message: message.into(),
        }
    }
}
