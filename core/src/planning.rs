//! Turning the driver's inputs into a [`BuildPlan`] for a distributed build.
//!
//! Swift sources are compiled remotely, so for each of them the plan records
//! the path relative to the base directory, the swiftdeps file its local
//! pre-compilation job writes, and where the remote outputs must be placed.
//! Everything else that has to happen locally (merging modules, linking,
//! debug info) becomes a post-compilation job.

use crate::diagnostics::DiagnosticMessage;
use crate::diagnostics::DiagnosticsEngine;
use crate::error::Result;
use crate::file_types::FileType;
use crate::file_types::TypedPath;
use crate::job::Job;
use crate::job::JobEmitter;
use crate::job::SwiftDepsPrimary;
use crate::output_file_map::OutputFileMap;
use crate::paths::make_absolute;
use crate::paths::relative_to_base;
use flock_protocol::OutputKind;
use flock_protocol::OutputPathMap;
use flock_protocol::RemoteCompilationInfo;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::Path;
use std::path::PathBuf;
use strum_macros::Display;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum CompilerMode {
    /// One frontend invocation per primary file.
    StandardCompile,
    /// Primary files grouped into batches.
    BatchCompile,
    /// Whole-module: a single invocation sees every file.
    SingleCompile,
}

impl CompilerMode {
    pub const fn uses_primary_file_inputs(self) -> bool {
        matches!(self, CompilerMode::StandardCompile | CompilerMode::BatchCompile)
    }
}

#[derive(Debug, Clone)]
pub struct PlanningOptions {
    pub compiler_mode: CompilerMode,
    /// Input files as given on the command line.
    pub inputs: Vec<PathBuf>,
    pub working_dir: PathBuf,
    /// Absolute directory every compiled source must live under.
    pub base_dir: PathBuf,
    /// Optional externally supplied partition of the inputs into batches.
    pub batch_partitions: Option<Vec<Vec<PathBuf>>>,
    /// Whether the module is emitted by the same invocation that compiles.
    pub emit_module_in_single_invocation: bool,
    pub module_output: Option<PathBuf>,
    pub linker_output: Option<PathBuf>,
    pub debug_info: bool,
    pub verify_debug_info: bool,
    pub remote_compilation_info: RemoteCompilationInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildPlan {
    pub base_dir: PathBuf,
    pub pre_compilation_jobs: Vec<Job>,
    /// Relative to `base_dir`, sorted.
    pub source_files: Vec<PathBuf>,
    pub swift_deps_map: BTreeMap<PathBuf, TypedPath>,
    pub remote_compilation_info: RemoteCompilationInfo,
    pub output_paths: BTreeMap<PathBuf, OutputPathMap>,
    pub post_compilation_jobs: Vec<Job>,
}

impl BuildPlan {
    /// Every output kind some source file wants back from the server.
    pub fn requested_outputs(&self) -> BTreeSet<OutputKind> {
        self.output_paths
            .values()
            .flat_map(|outputs| outputs.keys().copied())
            .collect()
    }
}

/// Whether a distributed build can run at all. Emits a warning and returns
/// `false` when it cannot, in which case the driver builds locally.
pub fn check_distributed_build_support(
    compiler_mode: CompilerMode,
    output_file_map: Option<&OutputFileMap>,
    diagnostics: &mut DiagnosticsEngine,
) -> bool {
    if !compiler_mode.uses_primary_file_inputs() {
        diagnostics.warning(DiagnosticMessage::DistributedBuildDisabled(format!(
            "{compiler_mode} mode does not compile files individually"
        )));
        return false;
    }
    if output_file_map.is_none() {
        diagnostics.warning(DiagnosticMessage::DistributedBuildDisabled(
            "no output file map".to_string(),
        ));
        return false;
    }
    true
}

/// Per-source outputs the server can produce, looked up in the output file map.
fn remote_outputs(output_file_map: &OutputFileMap, source: &Path) -> OutputPathMap {
    [
        FileType::Object,
        FileType::SwiftModule,
        FileType::SwiftDocumentation,
    ]
    .into_iter()
    .filter_map(|file_type| {
        let kind = file_type.output_kind()?;
        let path = output_file_map.existing_output(source, file_type)?;
        Some((kind, path.to_path_buf()))
    })
    .collect()
}

fn with_appended_extension(path: &Path, extension: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// Build the plan. Problems with individual inputs are reported to
/// `diagnostics` and the offending file is left out; the caller must not
/// execute the plan if any error was reported.
///
/// # Panics
///
/// If the compiler mode does not compile files individually, or the module is
/// emitted in the same invocation as compilation. Callers check
/// [`check_distributed_build_support`] first.
pub fn plan_distributed_build(
    options: &PlanningOptions,
    output_file_map: &OutputFileMap,
    emitter: &dyn JobEmitter,
    diagnostics: &mut DiagnosticsEngine,
) -> Result<BuildPlan> {
    assert!(
        options.compiler_mode.uses_primary_file_inputs(),
        "distributed build planned in {} mode",
        options.compiler_mode
    );
    assert!(
        !options.emit_module_in_single_invocation,
        "distributed build planned with single-invocation module emission"
    );

    let partition_of: HashMap<PathBuf, usize> = match &options.batch_partitions {
        Some(partitions) => {
            let mut lookup = HashMap::new();
            for (index, partition) in partitions.iter().enumerate() {
                for file in partition {
                    lookup.insert(make_absolute(file, &options.working_dir)?, index);
                }
            }
            lookup
        }
        None => HashMap::new(),
    };

    let mut groups: Vec<Vec<SwiftDepsPrimary>> = Vec::new();
    let mut group_of_partition: HashMap<usize, usize> = HashMap::new();
    let mut all_sources = Vec::new();
    let mut source_files = Vec::new();
    let mut swift_deps_map = BTreeMap::new();
    let mut output_paths = BTreeMap::new();
    let mut linker_inputs = Vec::new();
    let mut module_inputs = Vec::new();
    let mut seen_inputs = HashSet::new();

    for input in &options.inputs {
        let file = make_absolute(input, &options.working_dir)?;
        if !seen_inputs.insert(file.clone()) {
            diagnostics.error(DiagnosticMessage::DuplicateInputFile(file));
            continue;
        }
        match FileType::from_path(&file) {
            Some(file_type) if file_type.is_part_of_swift_compilation() => {
                let Some(relative) = relative_to_base(&file, &options.base_dir) else {
                    diagnostics.error(DiagnosticMessage::SourceFileOutsideBaseDirectory {
                        file,
                        base_dir: options.base_dir.clone(),
                    });
                    continue;
                };
                let Some(swift_deps) = output_file_map.existing_output(&file, FileType::SwiftDeps)
                else {
                    diagnostics.error(DiagnosticMessage::MissingSwiftDepsOutput(file));
                    continue;
                };

                let outputs = remote_outputs(output_file_map, &file);
                if let Some(object) = outputs.get(&OutputKind::Object) {
                    linker_inputs.push(TypedPath::new(object.clone(), FileType::Object));
                }
                if let Some(module) = outputs.get(&OutputKind::Module) {
                    module_inputs.push(TypedPath::new(module.clone(), FileType::SwiftModule));
                }

                let primary = SwiftDepsPrimary {
                    source: file.clone(),
                    swift_deps: swift_deps.to_path_buf(),
                };
                match partition_of.get(&file) {
                    Some(&partition) => match group_of_partition.get(&partition) {
                        Some(&group) => {
                            debug!(file = %file.display(), "already covered by a batch");
                            groups[group].push(primary);
                        }
                        None => {
                            group_of_partition.insert(partition, groups.len());
                            groups.push(vec![primary]);
                        }
                    },
                    None => groups.push(vec![primary]),
                }

                swift_deps_map.insert(
                    relative.clone(),
                    TypedPath::new(swift_deps, FileType::SwiftDeps),
                );
                output_paths.insert(relative.clone(), outputs);
                source_files.push(relative);
                all_sources.push(file);
            }
            Some(file_type @ (FileType::Object | FileType::Autolink)) => {
                linker_inputs.push(TypedPath::new(file, file_type));
            }
            Some(FileType::SwiftModule) => {
                module_inputs.push(TypedPath::new(file, FileType::SwiftModule));
            }
            _ => diagnostics.error(DiagnosticMessage::UnexpectedInputFile(file)),
        }
    }

    let pre_compilation_jobs = groups
        .iter()
        .map(|primaries| emitter.emit_swift_deps_job(primaries, &all_sources))
        .collect();

    let mut post_compilation_jobs = Vec::new();

    if let Some(module_output) = &options.module_output
        && !module_inputs.is_empty()
    {
        post_compilation_jobs.push(emitter.merge_module_job(&module_inputs, module_output));
    }

    if emitter.needs_autolink_extraction() {
        let autolink_inputs: Vec<TypedPath> = linker_inputs
            .iter()
            .filter(|input| input.file_type == FileType::Object)
            .cloned()
            .collect();
        let autolink_output = output_file_map
            .module_output(FileType::Autolink)
            .map(Path::to_path_buf)
            .or_else(|| {
                options
                    .linker_output
                    .as_deref()
                    .map(|image| with_appended_extension(image, "autolink"))
            });
        if let Some(output) = autolink_output
            && !autolink_inputs.is_empty()
        {
            post_compilation_jobs.push(emitter.autolink_extract_job(&autolink_inputs, &output));
            linker_inputs.push(TypedPath::new(output, FileType::Autolink));
        }
    }

    let mut image = None;
    if let Some(linker_output) = &options.linker_output
        && !linker_inputs.is_empty()
    {
        post_compilation_jobs.push(emitter.link_job(&linker_inputs, linker_output));
        image = Some(linker_output.clone());
    }

    if let Some(image) = image
        && options.debug_info
    {
        let dsym = with_appended_extension(&image, "dSYM");
        post_compilation_jobs.push(emitter.generate_dsym_job(&image, &dsym));
        if options.verify_debug_info {
            post_compilation_jobs.push(emitter.verify_debug_info_job(&dsym));
        }
    }

    source_files.sort();

    Ok(BuildPlan {
        base_dir: options.base_dir.clone(),
        pre_compilation_jobs,
        source_files,
        swift_deps_map,
        remote_compilation_info: options.remote_compilation_info.clone(),
        output_paths,
        post_compilation_jobs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobKind;
    use crate::job::SwiftcJobEmitter;
    use pretty_assertions::assert_eq;

    const OUTPUT_FILE_MAP: &str = r#"{
        "Sources/b.swift": {
            "object": "/build/b.o",
            "swiftmodule": "/build/b.swiftmodule",
            "swift-dependencies": "/build/b.swiftdeps"
        },
        "Sources/a.swift": {
            "object": "/build/a.o",
            "swiftmodule": "/build/a.swiftmodule",
            "swift-dependencies": "/build/a.swiftdeps"
        },
        "Sources/c.swift": {
            "object": "/build/c.o",
            "swift-dependencies": "/build/c.swiftdeps"
        },
        "/elsewhere/d.swift": {
            "object": "/build/d.o",
            "swift-dependencies": "/build/d.swiftdeps"
        },
        "Sources/nodeps.swift": {
            "object": "/build/nodeps.o"
        }
    }"#;

    fn output_file_map() -> OutputFileMap {
        OutputFileMap::from_json(OUTPUT_FILE_MAP, Path::new("/work")).unwrap()
    }

    fn emitter(target_is_darwin: bool) -> SwiftcJobEmitter {
        SwiftcJobEmitter {
            swift_compiler: PathBuf::from("/toolchain/bin/swift"),
            module_name: "App".to_string(),
            frontend_args: Vec::new(),
            target_is_darwin,
        }
    }

    fn options(inputs: &[&str]) -> PlanningOptions {
        PlanningOptions {
            compiler_mode: CompilerMode::StandardCompile,
            inputs: inputs.iter().map(PathBuf::from).collect(),
            working_dir: PathBuf::from("/work"),
            base_dir: PathBuf::from("/work"),
            batch_partitions: None,
            emit_module_in_single_invocation: false,
            module_output: None,
            linker_output: None,
            debug_info: false,
            verify_debug_info: false,
            remote_compilation_info: RemoteCompilationInfo {
                compiler_version: "Swift version 5.3".to_string(),
                sdk_platform_and_version: String::new(),
                frontend_options: String::new(),
            },
        }
    }

    fn kinds(jobs: &[Job]) -> Vec<JobKind> {
        jobs.iter().map(|job| job.kind).collect()
    }

    #[test]
    fn test_source_files_are_sorted_relative_paths() {
        let mut diagnostics = DiagnosticsEngine::new();
        let plan = plan_distributed_build(
            &options(&["Sources/c.swift", "Sources/a.swift", "/work/Sources/b.swift"]),
            &output_file_map(),
            &emitter(true),
            &mut diagnostics,
        )
        .unwrap();

        assert!(!diagnostics.has_errors());
        assert_eq!(
            plan.source_files,
            vec![
                PathBuf::from("Sources/a.swift"),
                PathBuf::from("Sources/b.swift"),
                PathBuf::from("Sources/c.swift"),
            ]
        );
        assert_eq!(plan.pre_compilation_jobs.len(), 3);
        assert_eq!(
            plan.swift_deps_map[Path::new("Sources/b.swift")],
            TypedPath::new("/build/b.swiftdeps", FileType::SwiftDeps)
        );
        assert_eq!(
            plan.output_paths[Path::new("Sources/c.swift")],
            OutputPathMap::from([(OutputKind::Object, PathBuf::from("/build/c.o"))])
        );
        assert_eq!(
            plan.requested_outputs(),
            BTreeSet::from([OutputKind::Object, OutputKind::Module])
        );
    }

    #[test]
    fn test_problem_inputs_are_diagnosed_and_skipped() {
        let mut diagnostics = DiagnosticsEngine::new();
        let plan = plan_distributed_build(
            &options(&[
                "Sources/a.swift",
                "/elsewhere/d.swift",
                "Sources/nodeps.swift",
                "README.md",
            ]),
            &output_file_map(),
            &emitter(true),
            &mut diagnostics,
        )
        .unwrap();

        assert_eq!(plan.source_files, vec![PathBuf::from("Sources/a.swift")]);
        assert_eq!(diagnostics.error_count(), 3);
        let messages: Vec<_> = diagnostics
            .diagnostics()
            .iter()
            .map(|d| d.message.clone())
            .collect();
        assert_eq!(
            messages,
            vec![
                DiagnosticMessage::SourceFileOutsideBaseDirectory {
                    file: PathBuf::from("/elsewhere/d.swift"),
                    base_dir: PathBuf::from("/work"),
                },
                DiagnosticMessage::MissingSwiftDepsOutput(PathBuf::from(
                    "/work/Sources/nodeps.swift"
                )),
                DiagnosticMessage::UnexpectedInputFile(PathBuf::from("/work/README.md")),
            ]
        );
    }

    #[test]
    fn test_batch_partition_yields_one_job_per_batch() {
        let mut opts = options(&["Sources/a.swift", "Sources/b.swift", "Sources/c.swift"]);
        opts.compiler_mode = CompilerMode::BatchCompile;
        opts.batch_partitions = Some(vec![
            vec![PathBuf::from("Sources/a.swift"), PathBuf::from("Sources/c.swift")],
            vec![PathBuf::from("Sources/b.swift")],
        ]);
        let mut diagnostics = DiagnosticsEngine::new();
        let plan =
            plan_distributed_build(&opts, &output_file_map(), &emitter(true), &mut diagnostics)
                .unwrap();

        assert_eq!(plan.pre_compilation_jobs.len(), 2);
        let first_outputs: Vec<_> = plan.pre_compilation_jobs[0]
            .outputs
            .iter()
            .map(|o| o.file.clone())
            .collect();
        assert_eq!(
            first_outputs,
            vec![PathBuf::from("/build/a.swiftdeps"), PathBuf::from("/build/c.swiftdeps")]
        );
        assert_eq!(plan.source_files.len(), 3);
    }

    #[test]
    fn test_post_compilation_jobs_follow_requested_outputs() {
        let mut opts = options(&["Sources/a.swift", "Sources/b.swift", "/work/lib/extra.o"]);
        opts.module_output = Some(PathBuf::from("/build/App.swiftmodule"));
        opts.linker_output = Some(PathBuf::from("/build/App"));
        opts.debug_info = true;
        opts.verify_debug_info = true;
        let mut diagnostics = DiagnosticsEngine::new();
        let plan =
            plan_distributed_build(&opts, &output_file_map(), &emitter(false), &mut diagnostics)
                .unwrap();

        assert_eq!(
            kinds(&plan.post_compilation_jobs),
            vec![
                JobKind::MergeModule,
                JobKind::AutolinkExtract,
                JobKind::Link,
                JobKind::GenerateDsym,
                JobKind::VerifyDebugInfo,
            ]
        );
        let link = &plan.post_compilation_jobs[2];
        let link_inputs: Vec<_> = link.inputs.iter().map(|i| i.file.clone()).collect();
        assert_eq!(
            link_inputs,
            vec![
                PathBuf::from("/build/a.o"),
                PathBuf::from("/build/b.o"),
                PathBuf::from("/work/lib/extra.o"),
                PathBuf::from("/build/App.autolink"),
            ]
        );
        assert_eq!(
            plan.post_compilation_jobs[3].outputs[0].file,
            PathBuf::from("/build/App.dSYM")
        );
    }

    #[test]
    fn test_no_post_jobs_without_requested_outputs() {
        let mut diagnostics = DiagnosticsEngine::new();
        let mut opts = options(&["Sources/a.swift"]);
        opts.debug_info = true;
        let plan =
            plan_distributed_build(&opts, &output_file_map(), &emitter(false), &mut diagnostics)
                .unwrap();
        assert_eq!(plan.post_compilation_jobs, Vec::new());
    }

    #[test]
    fn test_support_check_disables_unsuitable_builds() {
        let mut diagnostics = DiagnosticsEngine::new();
        assert!(!check_distributed_build_support(
            CompilerMode::SingleCompile,
            Some(&output_file_map()),
            &mut diagnostics
        ));
        assert!(!check_distributed_build_support(
            CompilerMode::StandardCompile,
            None,
            &mut diagnostics
        ));
        assert!(check_distributed_build_support(
            CompilerMode::BatchCompile,
            Some(&output_file_map()),
            &mut diagnostics
        ));
        assert_eq!(diagnostics.diagnostics().len(), 2);
        assert!(!diagnostics.has_errors());
    }

    #[test]
    #[should_panic(expected = "single-compile")]
    fn test_whole_module_mode_is_rejected() {
        let mut opts = options(&["Sources/a.swift"]);
        opts.compiler_mode = CompilerMode::SingleCompile;
        let _ = plan_distributed_build(
            &opts,
            &output_file_map(),
            &emitter(true),
            &mut DiagnosticsEngine::new(),
        );
    }

    #[test]
    #[should_panic(expected = "single-invocation module emission")]
    fn test_single_invocation_module_emission_is_rejected() {
        let mut opts = options(&["Sources/a.swift"]);
        opts.emit_module_in_single_invocation = true;
        let _ = plan_distributed_build(
            &opts,
            &output_file_map(),
            &emitter(true),
            &mut DiagnosticsEngine::new(),
        );
    }

    #[test]
    fn test_duplicate_inputs_are_diagnosed_once_and_planned_once() {
        let mut diagnostics = DiagnosticsEngine::new();
        let plan = plan_distributed_build(
            &options(&["Sources/a.swift", "Sources/b.swift", "/work/Sources/a.swift"]),
            &output_file_map(),
            &emitter(true),
            &mut diagnostics,
        )
        .unwrap();

        assert_eq!(
            plan.source_files,
            vec![PathBuf::from("Sources/a.swift"), PathBuf::from("Sources/b.swift")]
        );
        assert_eq!(plan.pre_compilation_jobs.len(), 2);
        assert_eq!(diagnostics.error_count(), 1);
        assert_eq!(
            diagnostics.diagnostics()[0].message,
            DiagnosticMessage::DuplicateInputFile(PathBuf::from("/work/Sources/a.swift"))
        );
    }
}
