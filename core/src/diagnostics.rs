//! Diagnostics collected while planning a build.
//!
//! Planning keeps classifying files after a problem is found, so problems are
//! recorded here instead of being returned as errors. Execution must not start
//! once [`DiagnosticsEngine::has_errors`] is true.

use std::path::PathBuf;
use strum_macros::Display;
use thiserror::Error;
use tracing::error;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticMessage {
    #[error("source file {} is not under the distributed build base directory {}", file.display(), base_dir.display())]
    SourceFileOutsideBaseDirectory { file: PathBuf, base_dir: PathBuf },

    #[error("unexpected input file for distributed build: {}", .0.display())]
    UnexpectedInputFile(PathBuf),

    #[error("no swiftdeps output in the output file map for {}", .0.display())]
    MissingSwiftDepsOutput(PathBuf),

    #[error("input file {} was given more than once", .0.display())]
    DuplicateInputFile(PathBuf),

    #[error("distributed build disabled: {0}")]
    DistributedBuildDisabled(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: DiagnosticMessage,
}

#[derive(Debug, Default)]
pub struct DiagnosticsEngine {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, severity: Severity, message: DiagnosticMessage) {
        match severity {
            Severity::Error => error!("{message}"),
            Severity::Warning => warn!("{message}"),
        }
        self.diagnostics.push(Diagnostic { severity, message });
    }

    pub fn error(&mut self, message: DiagnosticMessage) {
        self.emit(Severity::Error, message);
    }

    pub fn warning(&mut self, message: DiagnosticMessage) {
        self.emit(Severity::Warning, message);
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}
