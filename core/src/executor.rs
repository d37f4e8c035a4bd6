//! The seam between the driver and whatever compiles sources remotely.

use crate::dependency_analysis::DependencyMap;
use crate::error::FlockErr;
use crate::error::Result;
use crate::planning::BuildPlan;
use async_trait::async_trait;
use flock_protocol::CompileArtifacts;
use flock_protocol::CompileRequest;
use flock_protocol::OutputKind;
use flock_protocol::OutputPathMap;
use flock_protocol::RemoteCompilationInputs;
use flock_protocol::SourceFileIndex;
use serde_bytes::ByteBuf;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

/// Where each primary's outputs go, keyed by source file index.
pub type IndexedOutputPaths = BTreeMap<SourceFileIndex, OutputPathMap>;

#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Compile `request` remotely and write every artifact to its path in
    /// `output_paths`. Returns the artifacts that were received.
    async fn dispatch(
        &self,
        request: CompileRequest,
        output_paths: &IndexedOutputPaths,
    ) -> Result<CompileArtifacts>;
}

/// Assemble the request for `plan`: every source file is a primary, and each
/// primary carries its internal dependencies as secondaries. Source contents
/// are read from disk. The request is validated before it is returned.
pub async fn build_compile_request(
    plan: &BuildPlan,
    dependency_map: &DependencyMap,
) -> Result<(CompileRequest, IndexedOutputPaths)> {
    let count = plan.source_files.len();
    let mut sources = Vec::with_capacity(count);
    let mut output_paths = IndexedOutputPaths::new();
    for (index, relative) in plan.source_files.iter().enumerate() {
        sources.push(ByteBuf::from(
            tokio::fs::read(plan.base_dir.join(relative)).await?,
        ));
        output_paths.insert(
            index,
            plan.output_paths.get(relative).cloned().unwrap_or_default(),
        );
    }

    let inputs = RemoteCompilationInputs {
        base_dir: plan.base_dir.clone(),
        source_files: plan.source_files.clone(),
        primary_source_file_indices: (0..count).collect(),
        secondary_source_file_indices: (0..count)
            .map(|index| dependency_map.dependencies_of(index).clone())
            .collect(),
    };
    inputs.validate()?;

    let request = CompileRequest {
        inputs,
        info: plan.remote_compilation_info.clone(),
        requested_outputs: plan.requested_outputs(),
        sources,
    };
    Ok((request, output_paths))
}

/// The first (primary, kind) pair in `output_paths` that `artifacts` has no
/// bytes for, with the local path it should have been written to.
pub fn find_missing_artifact(
    artifacts: &CompileArtifacts,
    output_paths: &IndexedOutputPaths,
) -> Option<(PathBuf, OutputKind)> {
    output_paths.iter().find_map(|(index, outputs)| {
        outputs.iter().find_map(|(kind, path)| {
            let present = artifacts
                .get(index)
                .is_some_and(|received| received.contains_key(kind));
            (!present).then(|| (path.clone(), *kind))
        })
    })
}

/// Write every artifact that has a destination in `output_paths`, creating
/// parent directories as needed.
pub async fn write_artifacts(
    artifacts: &CompileArtifacts,
    output_paths: &IndexedOutputPaths,
) -> std::io::Result<()> {
    for (index, outputs) in output_paths {
        let Some(received) = artifacts.get(index) else {
            continue;
        };
        for (kind, path) in outputs {
            let Some(bytes) = received.get(kind) else {
                continue;
            };
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            debug!(path = %path.display(), %kind, len = bytes.len(), "writing artifact");
            tokio::fs::write(path, bytes).await?;
        }
    }
    Ok(())
}

/// An executor that never leaves the process. It records every request and
/// answers with either configured artifacts or, when none were configured,
/// empty placeholders for each requested output.
#[derive(Debug, Default)]
pub struct MockRemoteExecutor {
    artifacts: Option<CompileArtifacts>,
    requests: Mutex<Vec<CompileRequest>>,
}

impl MockRemoteExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifacts(artifacts: CompileArtifacts) -> Self {
        Self {
            artifacts: Some(artifacts),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompileRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn placeholders(request: &CompileRequest) -> CompileArtifacts {
        request
            .inputs
            .primary_source_file_indices
            .iter()
            .map(|&index| {
                let outputs = request
                    .requested_outputs
                    .iter()
                    .map(|&kind| (kind, ByteBuf::new()))
                    .collect();
                (index, outputs)
            })
            .collect()
    }
}

#[async_trait]
impl RemoteExecutor for MockRemoteExecutor {
    async fn dispatch(
        &self,
        request: CompileRequest,
        output_paths: &IndexedOutputPaths,
    ) -> Result<CompileArtifacts> {
        let artifacts = match &self.artifacts {
            Some(artifacts) => artifacts.clone(),
            None => Self::placeholders(&request),
        };
        match self.requests.lock() {
            Ok(mut requests) => requests.push(request),
            Err(poisoned) => poisoned.into_inner().push(request),
        }

        if let Some((path, kind)) = find_missing_artifact(&artifacts, output_paths) {
            return Err(FlockErr::MissingArtifact { path, kind });
        }
        write_artifacts(&artifacts, output_paths).await?;
        Ok(artifacts)
    }
}
