//! Description of one remote compilation: which files, which of them are
//! primaries, and which compiler the server must use.

use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::PathBuf;
use strum_macros::Display;
use thiserror::Error;

/// Position of a source file in [`RemoteCompilationInputs::source_files`].
pub type SourceFileIndex = usize;

/// The kinds of artifacts a remote compilation hands back.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutputKind {
    Object,
    Module,
    Documentation,
}

impl OutputKind {
    /// File extension the frontend uses for this kind of output.
    pub const fn extension(self) -> &'static str {
        match self {
            OutputKind::Object => "o",
            OutputKind::Module => "swiftmodule",
            OutputKind::Documentation => "swiftdoc",
        }
    }
}

/// For each kind of output, where it should be placed once the remote
/// compilation completes.
pub type OutputPathMap = BTreeMap<OutputKind, PathBuf>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCompilationInputs {
    /// The local base dir for all source files
    pub base_dir: PathBuf,

    /// Paths of all source files in the module, relative to `base_dir`
    pub source_files: Vec<PathBuf>,

    /// If `i` is in the set, `source_files[i]` needs compilation.
    pub primary_source_file_indices: BTreeSet<SourceFileIndex>,

    /// If `secondary_source_file_indices[i] = {j, k}`, then compiling
    /// `source_files[i]` as a primary file passes `source_files[j]` and
    /// `source_files[k]` as secondary files.
    pub secondary_source_file_indices: Vec<BTreeSet<SourceFileIndex>>,
}

/// Boundary violations found by [`RemoteCompilationInputs::validate`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidInputs {
    #[error("primary source file index {index} out of range ({count} source files)")]
    PrimaryIndexOutOfRange { index: SourceFileIndex, count: usize },

    #[error(
        "secondary source file index {index} (for primary {primary}) out of range ({count} source files)"
    )]
    SecondaryIndexOutOfRange {
        primary: SourceFileIndex,
        index: SourceFileIndex,
        count: usize,
    },

    #[error("secondary index table has {actual} entries, expected {expected}")]
    SecondaryTableLength { expected: usize, actual: usize },
}

impl RemoteCompilationInputs {
    /// Every index referenced by the request must name a source file.
    pub fn validate(&self) -> Result<(), InvalidInputs> {
        let count = self.source_files.len();
        if self.secondary_source_file_indices.len() != count {
            return Err(InvalidInputs::SecondaryTableLength {
                expected: count,
                actual: self.secondary_source_file_indices.len(),
            });
        }
        if let Some(&index) = self.primary_source_file_indices.iter().find(|&&i| i >= count) {
            return Err(InvalidInputs::PrimaryIndexOutOfRange { index, count });
        }
        for (primary, secondaries) in self.secondary_source_file_indices.iter().enumerate() {
            if let Some(&index) = secondaries.iter().find(|&&i| i >= count) {
                return Err(InvalidInputs::SecondaryIndexOutOfRange {
                    primary,
                    index,
                    count,
                });
            }
        }
        Ok(())
    }

    /// The files handed to the frontend when compiling `primary`: the primary
    /// itself and its secondaries, in index order.
    pub fn files_for_primary(&self, primary: SourceFileIndex) -> Vec<SourceFileIndex> {
        let mut files: BTreeSet<SourceFileIndex> = self
            .secondary_source_file_indices
            .get(primary)
            .cloned()
            .unwrap_or_default();
        files.insert(primary);
        files.into_iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCompilationInfo {
    /// Output of `swift --version`; includes target information
    pub compiler_version: String,

    /// Identifies the SDK to use, like "MacOSX10.15"
    pub sdk_platform_and_version: String,

    /// Arguments and options that should be passed to the frontend
    pub frontend_options: String,
}
