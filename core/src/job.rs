//! Jobs the driver runs locally, and the emitter that produces them.

use crate::file_types::FileType;
use crate::file_types::TypedPath;
use std::path::Path;
use std::path::PathBuf;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum JobKind {
    EmitSwiftDeps,
    MergeModule,
    AutolinkExtract,
    Link,
    GenerateDsym,
    VerifyDebugInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub kind: JobKind,
    pub tool: PathBuf,
    pub command_line: Vec<String>,
    pub inputs: Vec<TypedPath>,
    pub outputs: Vec<TypedPath>,
}

/// A primary source file and the swiftdeps file its job must write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwiftDepsPrimary {
    pub source: PathBuf,
    pub swift_deps: PathBuf,
}

/// Produces the concrete jobs of a build. The planner decides *which* jobs
/// exist; the emitter decides how each one is invoked.
pub trait JobEmitter {
    /// A frontend job that type-checks `primaries` (with every file of
    /// `all_sources` visible) and writes their swiftdeps files.
    fn emit_swift_deps_job(&self, primaries: &[SwiftDepsPrimary], all_sources: &[PathBuf]) -> Job;

    fn merge_module_job(&self, inputs: &[TypedPath], output: &Path) -> Job;

    /// Whether linking needs autolink entries extracted from the objects
    /// first. True for ELF targets.
    fn needs_autolink_extraction(&self) -> bool;

    fn autolink_extract_job(&self, inputs: &[TypedPath], output: &Path) -> Job;

    fn link_job(&self, inputs: &[TypedPath], output: &Path) -> Job;

    fn generate_dsym_job(&self, image: &Path, output: &Path) -> Job;

    fn verify_debug_info_job(&self, dsym: &Path) -> Job;
}

/// Minimal emitter for a `swiftc`-style toolchain.
#[derive(Debug, Clone)]
pub struct SwiftcJobEmitter {
    pub swift_compiler: PathBuf,
    pub module_name: String,
    pub frontend_args: Vec<String>,
    pub target_is_darwin: bool,
}

impl SwiftcJobEmitter {
    fn tool_next_to_compiler(&self, name: &str) -> PathBuf {
        self.swift_compiler
            .parent()
            .map(|dir| dir.join(name))
            .unwrap_or_else(|| PathBuf::from(name))
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl JobEmitter for SwiftcJobEmitter {
    fn emit_swift_deps_job(&self, primaries: &[SwiftDepsPrimary], all_sources: &[PathBuf]) -> Job {
        let mut command_line = vec!["-frontend".to_string(), "-typecheck".to_string()];
        for source in all_sources {
            if primaries.iter().any(|p| &p.source == source) {
                command_line.push("-primary-file".to_string());
            }
            command_line.push(display(source));
        }
        for primary in primaries {
            command_line.push("-emit-reference-dependencies-path".to_string());
            command_line.push(display(&primary.swift_deps));
        }
        command_line.push("-module-name".to_string());
        command_line.push(self.module_name.clone());
        command_line.extend(self.frontend_args.iter().cloned());

        Job {
            kind: JobKind::EmitSwiftDeps,
            tool: self.swift_compiler.clone(),
            command_line,
            inputs: all_sources
                .iter()
                .map(|s| TypedPath::new(s.clone(), FileType::Swift))
                .collect(),
            outputs: primaries
                .iter()
                .map(|p| TypedPath::new(p.swift_deps.clone(), FileType::SwiftDeps))
                .collect(),
        }
    }

    fn merge_module_job(&self, inputs: &[TypedPath], output: &Path) -> Job {
        let mut command_line = vec![
            "-frontend".to_string(),
            "-merge-modules".to_string(),
            "-emit-module".to_string(),
        ];
        command_line.extend(inputs.iter().map(|i| display(&i.file)));
        command_line.extend([
            "-parse-as-library".to_string(),
            "-module-name".to_string(),
            self.module_name.clone(),
            "-o".to_string(),
            display(output),
        ]);
        Job {
            kind: JobKind::MergeModule,
            tool: self.swift_compiler.clone(),
            command_line,
            inputs: inputs.to_vec(),
            outputs: vec![TypedPath::new(output, FileType::SwiftModule)],
        }
    }

    fn needs_autolink_extraction(&self) -> bool {
        !self.target_is_darwin
    }

    fn autolink_extract_job(&self, inputs: &[TypedPath], output: &Path) -> Job {
        let mut command_line: Vec<String> = inputs.iter().map(|i| display(&i.file)).collect();
        command_line.extend(["-o".to_string(), display(output)]);
        Job {
            kind: JobKind::AutolinkExtract,
            tool: self.tool_next_to_compiler("swift-autolink-extract"),
            command_line,
            inputs: inputs.to_vec(),
            outputs: vec![TypedPath::new(output, FileType::Autolink)],
        }
    }

    fn link_job(&self, inputs: &[TypedPath], output: &Path) -> Job {
        let mut command_line = vec!["-emit-executable".to_string()];
        for input in inputs {
            if input.file_type == FileType::Autolink {
                command_line.push(format!("@{}", display(&input.file)));
            } else {
                command_line.push(display(&input.file));
            }
        }
        command_line.extend(["-o".to_string(), display(output)]);
        Job {
            kind: JobKind::Link,
            tool: self.swift_compiler.clone(),
            command_line,
            inputs: inputs.to_vec(),
            outputs: vec![TypedPath::new(output, FileType::Image)],
        }
    }

    fn generate_dsym_job(&self, image: &Path, output: &Path) -> Job {
        Job {
            kind: JobKind::GenerateDsym,
            tool: PathBuf::from("dsymutil"),
            command_line: vec![display(image), "-o".to_string(), display(output)],
            inputs: vec![TypedPath::new(image, FileType::Image)],
            outputs: vec![TypedPath::new(output, FileType::Dsym)],
        }
    }

    fn verify_debug_info_job(&self, dsym: &Path) -> Job {
        Job {
            kind: JobKind::VerifyDebugInfo,
            tool: PathBuf::from("dwarfdump"),
            command_line: vec![
                "--verify".to_string(),
                "--debug-info".to_string(),
                "--eh-frame".to_string(),
                "--quiet".to_string(),
                display(dsym),
            ],
            inputs: vec![TypedPath::new(dsym, FileType::Dsym)],
            outputs: Vec::new(),
        }
    }
}
