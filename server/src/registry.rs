use crate::error::Result;
use crate::error::ServerError;
use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;
use tracing::debug;
use tracing::warn;

/// Configured frontends keyed by the output of `<frontend> --version`.
/// Requests name the version they were built for; it must match exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontendRegistry {
    by_version: BTreeMap<String, PathBuf>,
}

impl FrontendRegistry {
    /// Run every frontend with `--version`. When two report the same version,
    /// the one listed first is kept.
    pub async fn discover(frontends: &[PathBuf]) -> Result<Self> {
        let mut versions = Vec::with_capacity(frontends.len());
        for frontend in frontends {
            let version = query_version(frontend).await?;
            debug!(frontend = %frontend.display(), %version, "found frontend");
            versions.push((version, frontend.clone()));
        }
        Ok(Self::from_versions(versions))
    }

    pub fn from_versions(versions: impl IntoIterator<Item = (String, PathBuf)>) -> Self {
        let mut by_version: BTreeMap<String, PathBuf> = BTreeMap::new();
        for (version, path) in versions {
            if let Some(existing) = by_version.get(&version) {
                warn!(
                    %version,
                    ignored = %path.display(),
                    kept = %existing.display(),
                    "two frontends report the same version"
                );
                continue;
            }
            by_version.insert(version, path);
        }
        Self { by_version }
    }

    pub fn frontend_for(&self, compiler_version: &str) -> Option<&Path> {
        self.by_version.get(compiler_version).map(PathBuf::as_path)
    }

    pub fn versions(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.by_version
            .iter()
            .map(|(version, path)| (version.as_str(), path.as_path()))
    }

    pub fn len(&self) -> usize {
        self.by_version.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_version.is_empty()
    }
}

async fn query_version(frontend: &Path) -> Result<String> {
    let output = tokio::process::Command::new(frontend)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| ServerError::FrontendUnavailable {
            path: frontend.to_path_buf(),
            source,
        })?;
    if !output.status.success() {
        return Err(ServerError::FrontendVersionFailed {
            path: frontend.to_path_buf(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
