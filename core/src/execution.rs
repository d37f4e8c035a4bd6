//! Running a [`BuildPlan`]: local pre-compilation jobs, dependency analysis,
//! one remote dispatch, then local post-compilation jobs.

use crate::dependency_analysis::DependencyMap;
use crate::dependency_analysis::DependencyMapper;
use crate::diagnostics::DiagnosticsEngine;
use crate::error::FlockErr;
use crate::error::Result;
use crate::executor::RemoteExecutor;
use crate::executor::build_compile_request;
use crate::file_types::FileType;
use crate::job::Job;
use crate::planning::BuildPlan;
use async_trait::async_trait;
use std::process::Stdio;
use tracing::debug;
use tracing::info;

#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &Job) -> Result<()>;
}

/// Runs each job as a child process and waits for it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessJobRunner;

#[async_trait]
impl JobRunner for ProcessJobRunner {
    async fn run(&self, job: &Job) -> Result<()> {
        debug!(kind = %job.kind, tool = %job.tool.display(), args = ?job.command_line, "running job");
        let output = tokio::process::Command::new(&job.tool)
            .args(&job.command_line)
            .stdin(Stdio::null())
            .output()
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(FlockErr::JobFailed {
                kind: job.kind,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

async fn run_jobs(jobs: &[Job], runner: &dyn JobRunner) -> Result<()> {
    for job in jobs {
        runner.run(job).await?;
    }
    Ok(())
}

/// Load the swiftdeps file of every source in `plan` and compute the map.
pub async fn compute_dependency_map(plan: &BuildPlan) -> Result<DependencyMap> {
    let mut mapper = DependencyMapper::new(plan.source_files.len());
    for (index, source_file) in plan.source_files.iter().enumerate() {
        let swift_deps = plan
            .swift_deps_map
            .get(source_file)
            .ok_or_else(|| FlockErr::MissingSwiftDeps(source_file.clone()))?;
        debug_assert_eq!(swift_deps.file_type, FileType::SwiftDeps);
        mapper
            .load_swift_deps_file(&swift_deps.file, index)
            .await?;
    }
    Ok(mapper.compute_dependency_map())
}

/// Per-file dependency counts as `(count, percent of the unit)`, and the
/// average density of the whole unit as a percentage.
pub fn dependency_stats(dependency_map: &DependencyMap) -> (Vec<(usize, usize)>, usize) {
    let total = dependency_map.source_files_count();
    if total == 0 {
        return (Vec::new(), 0);
    }
    let per_file: Vec<(usize, usize)> = (0..total)
        .map(|index| {
            let count = dependency_map.dependencies_of(index).len();
            (count, count * 100 / total)
        })
        .collect();
    let sum: usize = per_file.iter().map(|(count, _)| count).sum();
    (per_file, sum * 100 / (total * total))
}

fn log_dependency_stats(plan: &BuildPlan, dependency_map: &DependencyMap) {
    let (per_file, average) = dependency_stats(dependency_map);
    info!(total = plan.source_files.len(), "dependency analysis complete");
    for (source_file, (count, percent)) in plan.source_files.iter().zip(per_file) {
        info!("    {}: {count} ({percent} %)", source_file.display());
    }
    info!("average dependency density: {average} %");
}

/// Execute `plan`. Nothing runs if planning reported errors.
pub async fn execute_distributed_build_plan(
    plan: &BuildPlan,
    diagnostics: &DiagnosticsEngine,
    runner: &dyn JobRunner,
    executor: &dyn RemoteExecutor,
) -> Result<()> {
    if diagnostics.has_errors() {
        return Err(FlockErr::PlanningFailed(diagnostics.error_count()));
    }

    run_jobs(&plan.pre_compilation_jobs, runner).await?;

    let dependency_map = compute_dependency_map(plan).await?;
    log_dependency_stats(plan, &dependency_map);
    if !dependency_map.external_dependencies.is_empty() {
        debug!(
            count = dependency_map.external_dependencies.len(),
            "plan depends on external files"
        );
    }

    if !plan.source_files.is_empty() {
        let (request, output_paths) = build_compile_request(plan, &dependency_map).await?;
        let artifacts = executor.dispatch(request, &output_paths).await?;
        info!(primaries = artifacts.len(), "remote compilation finished");
    }

    run_jobs(&plan.post_compilation_jobs, runner).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticMessage;
    use crate::executor::MockRemoteExecutor;
    use crate::file_types::TypedPath;
    use crate::job::JobKind;
    use flock_protocol::OutputKind;
    use flock_protocol::RemoteCompilationInfo;
    use maplit::btreemap;
    use maplit::btreeset;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Pretends to run jobs; a pre-compilation job "produces" its swiftdeps.
    #[derive(Default)]
    struct RecordingJobRunner {
        ran: Mutex<Vec<JobKind>>,
        swift_deps: Vec<(PathBuf, &'static str)>,
    }

    #[async_trait]
    impl JobRunner for RecordingJobRunner {
        async fn run(&self, job: &Job) -> Result<()> {
            if job.kind == JobKind::EmitSwiftDeps {
                for (path, contents) in &self.swift_deps {
                    std::fs::write(path, contents)?;
                }
            }
            self.ran.lock().unwrap().push(job.kind);
            Ok(())
        }
    }

    fn job(kind: JobKind) -> Job {
        Job {
            kind,
            tool: PathBuf::from("/bin/true"),
            command_line: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    fn plan_in(base: &Path) -> BuildPlan {
        BuildPlan {
            base_dir: base.to_path_buf(),
            pre_compilation_jobs: vec![job(JobKind::EmitSwiftDeps)],
            source_files: vec![
                PathBuf::from("a.swift"),
                PathBuf::from("b.swift"),
                PathBuf::from("c.swift"),
            ],
            swift_deps_map: btreemap! {
                PathBuf::from("a.swift") => TypedPath::new(base.join("a.swiftdeps"), FileType::SwiftDeps),
                PathBuf::from("b.swift") => TypedPath::new(base.join("b.swiftdeps"), FileType::SwiftDeps),
                PathBuf::from("c.swift") => TypedPath::new(base.join("c.swiftdeps"), FileType::SwiftDeps),
            },
            remote_compilation_info: RemoteCompilationInfo {
                compiler_version: "Swift version 5.3".to_string(),
                sdk_platform_and_version: String::new(),
                frontend_options: String::new(),
            },
            output_paths: btreemap! {
                PathBuf::from("a.swift") => btreemap! { OutputKind::Object => base.join("build/a.o") },
                PathBuf::from("b.swift") => btreemap! { OutputKind::Object => base.join("build/b.o") },
                PathBuf::from("c.swift") => btreemap! { OutputKind::Object => base.join("build/c.o") },
            },
            post_compilation_jobs: vec![job(JobKind::Link)],
        }
    }

    fn runner_for(base: &Path) -> RecordingJobRunner {
        RecordingJobRunner {
            ran: Mutex::new(Vec::new()),
            swift_deps: vec![
                (
                    base.join("a.swiftdeps"),
                    "provides-top-level: [a]\ndepends-top-level: [b]\n",
                ),
                (
                    base.join("b.swiftdeps"),
                    "provides-top-level: [b]\ndepends-top-level: [c]\n",
                ),
                (
                    base.join("c.swiftdeps"),
                    "provides-top-level: [c]\ndepends-external: [/usr/lib/x.swiftmodule]\n",
                ),
            ],
        }
    }

    fn write_sources(base: &Path) {
        for name in ["a.swift", "b.swift", "c.swift"] {
            std::fs::write(base.join(name), format!("// {name}")).unwrap();
        }
    }

    #[tokio::test]
    async fn test_plan_runs_in_order_and_places_artifacts() {
        let dir = TempDir::new().unwrap();
        write_sources(dir.path());
        let plan = plan_in(dir.path());
        let runner = runner_for(dir.path());
        let executor = MockRemoteExecutor::new();

        execute_distributed_build_plan(&plan, &DiagnosticsEngine::new(), &runner, &executor)
            .await
            .unwrap();

        assert_eq!(
            *runner.ran.lock().unwrap(),
            vec![JobKind::EmitSwiftDeps, JobKind::Link]
        );
        let requests = executor.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].inputs.secondary_source_file_indices,
            vec![btreeset! {1, 2}, btreeset! {2}, btreeset! {}]
        );
        assert!(dir.path().join("build/c.o").exists());
    }

    #[tokio::test]
    async fn test_planning_errors_prevent_execution() {
        let dir = TempDir::new().unwrap();
        let plan = plan_in(dir.path());
        let runner = runner_for(dir.path());
        let mut diagnostics = DiagnosticsEngine::new();
        diagnostics.error(DiagnosticMessage::UnexpectedInputFile(PathBuf::from("x.txt")));

        let err = execute_distributed_build_plan(
            &plan,
            &diagnostics,
            &runner,
            &MockRemoteExecutor::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FlockErr::PlanningFailed(1)));
        assert!(runner.ran.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_swift_deps_aborts_before_dispatch() {
        let dir = TempDir::new().unwrap();
        write_sources(dir.path());
        let plan = plan_in(dir.path());
        let mut runner = runner_for(dir.path());
        runner.swift_deps[1].1 = "provides-top-level: [!private b]\n";
        let executor = MockRemoteExecutor::new();

        let err = execute_distributed_build_plan(&plan, &DiagnosticsEngine::new(), &runner, &executor)
            .await
            .unwrap_err();

        match err {
            FlockErr::SwiftDepsFile { path, .. } => assert_eq!(path, dir.path().join("b.swiftdeps")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(executor.requests().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_process_job_reports_kind() {
        let err = ProcessJobRunner
            .run(&Job {
                kind: JobKind::Link,
                tool: PathBuf::from("sh"),
                command_line: vec!["-c".to_string(), "echo nope >&2; exit 3".to_string()],
                inputs: Vec::new(),
                outputs: Vec::new(),
            })
            .await
            .unwrap_err();
        match err {
            FlockErr::JobFailed { kind, stderr, .. } => {
                assert_eq!(kind, JobKind::Link);
                assert_eq!(stderr, "nope\n");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_dependency_stats_percentages() {
        let mut mapper = DependencyMapper::new(2);
        mapper
            .load_swift_deps("provides-top-level: [a]\ndepends-top-level: [b]\n", 0)
            .unwrap();
        mapper.load_swift_deps("provides-top-level: [b]\n", 1).unwrap();
        let (per_file, average) = dependency_stats(&mapper.compute_dependency_map());
        assert_eq!(per_file, vec![(1, 50), (0, 0)]);
        assert_eq!(average, 25);
    }
}
