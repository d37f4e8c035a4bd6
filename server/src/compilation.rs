//! Compiling one request: materialise the sources in a scratch directory and
//! invoke the frontend once per primary file.

use flock_protocol::ArtifactMap;
use flock_protocol::CompileArtifacts;
use flock_protocol::CompileRequest;
use flock_protocol::FailureReason;
use flock_protocol::OutputKind;
use flock_protocol::SourceFileIndex;
use serde_bytes::ByteBuf;
use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tracing::debug;

const SOURCES_DIR: &str = "src";
const OUTPUTS_DIR: &str = "out";

/// Why a compilation did not produce artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileFailure {
    pub reason: FailureReason,
    pub message: String,
}

impl CompileFailure {
    fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    fn internal(context: &str, err: std::io::Error) -> Self {
        Self::new(FailureReason::Internal, format!("{context}: {err}"))
    }
}

/// How to run the frontend for one request.
#[derive(Debug, Clone, Copy)]
pub struct FrontendInvocation<'a> {
    pub frontend: &'a Path,
    pub sdk: Option<&'a Path>,
    pub timeout: Duration,
}

pub async fn compile(
    request: &CompileRequest,
    invocation: FrontendInvocation<'_>,
) -> Result<CompileArtifacts, CompileFailure> {
    let frontend_options = shlex::split(&request.info.frontend_options).ok_or_else(|| {
        CompileFailure::new(
            FailureReason::InvalidRequest,
            "frontend options are not valid shell words",
        )
    })?;

    let scratch = TempDir::new().map_err(|e| CompileFailure::internal("scratch directory", e))?;
    write_sources(request, scratch.path()).await?;

    let mut artifacts = CompileArtifacts::new();
    for &primary in &request.inputs.primary_source_file_indices {
        let outputs = compile_primary(
            request,
            primary,
            &frontend_options,
            invocation,
            scratch.path(),
        )
        .await?;
        artifacts.insert(primary, outputs);
    }
    Ok(artifacts)
}

async fn write_sources(request: &CompileRequest, scratch: &Path) -> Result<(), CompileFailure> {
    for (relative, contents) in request.inputs.source_files.iter().zip(&request.sources) {
        let path = scratch.join(SOURCES_DIR).join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CompileFailure::internal("creating source directory", e))?;
        }
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| CompileFailure::internal("writing source file", e))?;
    }
    Ok(())
}

fn output_path(primary: SourceFileIndex, kind: OutputKind) -> PathBuf {
    Path::new(OUTPUTS_DIR)
        .join(primary.to_string())
        .join(format!("output.{}", kind.extension()))
}

/// Frontend arguments for compiling `primary`, with every path relative to
/// the scratch root.
fn frontend_arguments(
    request: &CompileRequest,
    primary: SourceFileIndex,
    frontend_options: &[String],
    sdk: Option<&Path>,
) -> Vec<String> {
    let mut args = vec!["-frontend".to_string(), "-c".to_string()];
    for index in request.inputs.files_for_primary(primary) {
        if index == primary {
            args.push("-primary-file".to_string());
        }
        let source = Path::new(SOURCES_DIR).join(&request.inputs.source_files[index]);
        args.push(source.to_string_lossy().into_owned());
    }
    if let Some(sdk) = sdk {
        args.push("-sdk".to_string());
        args.push(sdk.to_string_lossy().into_owned());
    }
    args.extend(frontend_options.iter().cloned());
    args.push("-o".to_string());
    args.push(output_path(primary, OutputKind::Object).to_string_lossy().into_owned());
    if request.requested_outputs.contains(&OutputKind::Module) {
        args.push("-emit-module-path".to_string());
        args.push(output_path(primary, OutputKind::Module).to_string_lossy().into_owned());
    }
    if request.requested_outputs.contains(&OutputKind::Documentation) {
        args.push("-emit-module-doc-path".to_string());
        args.push(
            output_path(primary, OutputKind::Documentation)
                .to_string_lossy()
                .into_owned(),
        );
    }
    args
}

async fn compile_primary(
    request: &CompileRequest,
    primary: SourceFileIndex,
    frontend_options: &[String],
    invocation: FrontendInvocation<'_>,
    scratch: &Path,
) -> Result<ArtifactMap, CompileFailure> {
    tokio::fs::create_dir_all(scratch.join(OUTPUTS_DIR).join(primary.to_string()))
        .await
        .map_err(|e| CompileFailure::internal("creating output directory", e))?;

    let args = frontend_arguments(request, primary, frontend_options, invocation.sdk);
    debug!(primary, ?args, "invoking frontend");
    let child = tokio::process::Command::new(invocation.frontend)
        .args(&args)
        .current_dir(scratch)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| CompileFailure::internal("spawning frontend", e))?;

    let output = match tokio::time::timeout(invocation.timeout, child.wait_with_output()).await {
        Ok(output) => output.map_err(|e| CompileFailure::internal("waiting for frontend", e))?,
        Err(_) => {
            return Err(CompileFailure::new(
                FailureReason::TimedOut,
                format!(
                    "compiling {} took longer than {}s",
                    request.inputs.source_files[primary].display(),
                    invocation.timeout.as_secs()
                ),
            ));
        }
    };

    if !output.status.success() {
        let mut message = String::from_utf8_lossy(&output.stderr).into_owned();
        message.push_str(&String::from_utf8_lossy(&output.stdout));
        return Err(CompileFailure::new(FailureReason::CompilationFailed, message));
    }

    let mut outputs = ArtifactMap::new();
    for &kind in &request.requested_outputs {
        let path = scratch.join(output_path(primary, kind));
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            CompileFailure::new(
                FailureReason::Internal,
                format!(
                    "frontend produced no {kind} output for {}: {e}",
                    request.inputs.source_files[primary].display()
                ),
            )
        })?;
        outputs.insert(kind, ByteBuf::from(bytes));
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flock_protocol::RemoteCompilationInfo;
    use flock_protocol::RemoteCompilationInputs;
    use maplit::btreeset;
    use pretty_assertions::assert_eq;

    fn request(frontend_options: &str) -> CompileRequest {
        CompileRequest {
            inputs: RemoteCompilationInputs {
                base_dir: PathBuf::from("/work"),
                source_files: vec![
                    PathBuf::from("Sources/a.swift"),
                    PathBuf::from("Sources/b.swift"),
                    PathBuf::from("Sources/c.swift"),
                ],
                primary_source_file_indices: btreeset! {0, 1, 2},
                secondary_source_file_indices: vec![btreeset! {2, 1}, btreeset! {}, btreeset! {}],
            },
            info: RemoteCompilationInfo {
                compiler_version: "Swift version 5.3".to_string(),
                sdk_platform_and_version: "MacOSX10.15".to_string(),
                frontend_options: frontend_options.to_string(),
            },
            requested_outputs: btreeset! {OutputKind::Object, OutputKind::Module},
            sources: Vec::new(),
        }
    }

    #[test]
    fn test_arguments_flag_primary_among_sorted_secondaries() {
        let req = request("-Onone -module-name 'My App'");
        let options = shlex::split(&req.info.frontend_options).unwrap();
        let args = frontend_arguments(&req, 0, &options, Some(Path::new("/sdks/mac.sdk")));
        assert_eq!(
            args,
            vec![
                "-frontend",
                "-c",
                "-primary-file",
                "src/Sources/a.swift",
                "src/Sources/b.swift",
                "src/Sources/c.swift",
                "-sdk",
                "/sdks/mac.sdk",
                "-Onone",
                "-module-name",
                "My App",
                "-o",
                "out/0/output.o",
                "-emit-module-path",
                "out/0/output.swiftmodule",
            ]
        );
    }

    #[test]
    fn test_arguments_without_sdk_or_secondaries() {
        let req = request("");
        let args = frontend_arguments(&req, 1, &[], None);
        assert_eq!(
            args,
            vec![
                "-frontend",
                "-c",
                "-primary-file",
                "src/Sources/b.swift",
                "-o",
                "out/1/output.o",
                "-emit-module-path",
                "out/1/output.swiftmodule",
            ]
        );
    }

    #[tokio::test]
    async fn test_unbalanced_quotes_are_an_invalid_request() {
        let failure = compile(
            &request("-D 'unterminated"),
            FrontendInvocation {
                frontend: Path::new("/nonexistent/swift"),
                sdk: None,
                timeout: Duration::from_secs(1),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(failure.reason, FailureReason::InvalidRequest);
    }
}
