//! `flock`: plans a Swift build, compiles its sources on a flock server and
//! runs the remaining jobs locally.

#![deny(clippy::print_stdout, clippy::print_stderr)]

mod error;

pub use error::CliError;
pub use error::Result;

use clap::Parser;
use flock_client::ClientConfiguration;
use flock_client::DEFAULT_CLIENT_CONFIG_FILE;
use flock_client::DistributedBuildClient;
use flock_common::VerbosityCliArg;
use flock_core::CompilerMode;
use flock_core::DiagnosticsEngine;
use flock_core::MockRemoteExecutor;
use flock_core::PlanningOptions;
use flock_core::ProcessJobRunner;
use flock_core::RemoteExecutor;
use flock_core::execute_distributed_build_plan;
use flock_core::file_types::FileType;
use flock_core::job::SwiftcJobEmitter;
use flock_core::output_file_map::OutputFileMap;
use flock_core::paths::make_absolute;
use flock_core::plan_distributed_build;
use flock_core::planning::check_distributed_build_support;
use flock_protocol::RemoteCompilationInfo;
use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "flock", version, about = "Distributed Swift compilation driver")]
pub struct Cli {
    /// Source, object and module files to build.
    pub inputs: Vec<PathBuf>,

    /// Compile sources on a flock server.
    #[arg(long)]
    pub distributed: bool,

    /// Directory every source file must live under. Defaults to the current
    /// directory.
    #[arg(long, value_name = "PATH")]
    pub distributed_build_base_dir: Option<PathBuf>,

    #[arg(long, value_name = "PATH", default_value = DEFAULT_CLIENT_CONFIG_FILE)]
    pub distributed_build_client_config: PathBuf,

    /// Plan and analyse dependencies, but hand the request to an in-process
    /// executor and skip the jobs that would consume its outputs.
    #[arg(long)]
    pub distributed_dry_run: bool,

    #[arg(long, value_name = "PATH")]
    pub output_file_map: Option<PathBuf>,

    #[arg(long, default_value = "main")]
    pub module_name: String,

    #[arg(long)]
    pub emit_module: bool,

    #[arg(long)]
    pub emit_executable: bool,

    /// Linker output.
    #[arg(short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Emit debug info.
    #[arg(short = 'g')]
    pub debug_info: bool,

    #[arg(long)]
    pub verify_debug_info: bool,

    /// Name of the SDK the server should compile against, e.g. `MacOSX10.15`.
    #[arg(long, default_value = "")]
    pub sdk: String,

    /// Exact `swift --version` output the server must match. Queried from
    /// `--swiftc` when omitted.
    #[arg(long)]
    pub compiler_version: Option<String>,

    #[arg(long, value_name = "PATH", default_value = "swift")]
    pub swiftc: PathBuf,

    /// Pass an argument to every frontend invocation.
    #[arg(long = "Xfrontend", value_name = "ARG", allow_hyphen_values = true)]
    pub xfrontend: Vec<String>,

    /// Whole-module compilation. Not compatible with distributed builds.
    #[arg(long)]
    pub wmo: bool,

    #[arg(long)]
    pub enable_batch_mode: bool,

    /// Split the inputs into this many batches.
    #[arg(long, value_name = "N", requires = "enable_batch_mode")]
    pub driver_batch_count: Option<usize>,

    #[clap(flatten)]
    pub verbosity: VerbosityCliArg,
}

impl Cli {
    pub fn compiler_mode(&self) -> CompilerMode {
        if self.wmo {
            CompilerMode::SingleCompile
        } else if self.enable_batch_mode {
            CompilerMode::BatchCompile
        } else {
            CompilerMode::StandardCompile
        }
    }
}

/// Split the source inputs into `count` contiguous batches of nearly equal
/// size. Non-source inputs are not part of any batch.
pub fn batch_partitions(inputs: &[PathBuf], count: usize) -> Vec<Vec<PathBuf>> {
    let sources: Vec<&PathBuf> = inputs
        .iter()
        .filter(|input| {
            FileType::from_path(input).is_some_and(FileType::is_part_of_swift_compilation)
        })
        .collect();
    if sources.is_empty() || count == 0 {
        return Vec::new();
    }
    let size = sources.len().div_ceil(count);
    sources
        .chunks(size)
        .map(|chunk| chunk.iter().map(|path| (*path).clone()).collect())
        .collect()
}

/// Remote frontend options: the module name followed by `-Xfrontend` args,
/// shell-quoted into one string.
pub fn remote_frontend_options(module_name: &str, xfrontend: &[String]) -> Result<String> {
    let words = ["-module-name", module_name]
        .into_iter()
        .chain(xfrontend.iter().map(String::as_str));
    shlex::try_join(words).map_err(|_| {
        CliError::FrontendOptions(
            xfrontend
                .iter()
                .find(|arg| arg.contains('\0'))
                .cloned()
                .unwrap_or_else(|| module_name.to_string()),
        )
    })
}

async fn query_compiler_version(swiftc: &Path) -> Result<String> {
    let output = tokio::process::Command::new(swiftc)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|err| CliError::CompilerVersion {
            swiftc: swiftc.to_path_buf(),
            message: err.to_string(),
        })?;
    if !output.status.success() {
        return Err(CliError::CompilerVersion {
            swiftc: swiftc.to_path_buf(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub fn planning_options(
    cli: &Cli,
    working_dir: &Path,
    output_file_map: &OutputFileMap,
    remote_compilation_info: RemoteCompilationInfo,
) -> Result<PlanningOptions> {
    let base_dir = match &cli.distributed_build_base_dir {
        Some(dir) => make_absolute(dir, working_dir)?,
        None => working_dir.to_path_buf(),
    };
    let module_output = if cli.emit_module {
        Some(match output_file_map.module_output(FileType::SwiftModule) {
            Some(path) => path.to_path_buf(),
            None => working_dir.join(format!("{}.swiftmodule", cli.module_name)),
        })
    } else {
        None
    };
    let linker_output = if cli.emit_executable {
        Some(match &cli.output {
            Some(output) => make_absolute(output, working_dir)?,
            None => working_dir.join(&cli.module_name),
        })
    } else {
        None
    };
    let batch_partitions = match (cli.enable_batch_mode, cli.driver_batch_count) {
        (true, Some(count)) => Some(batch_partitions(&cli.inputs, count)),
        _ => None,
    };

    Ok(PlanningOptions {
        compiler_mode: cli.compiler_mode(),
        inputs: cli.inputs.clone(),
        working_dir: working_dir.to_path_buf(),
        base_dir,
        batch_partitions,
        emit_module_in_single_invocation: false,
        module_output,
        linker_output,
        debug_info: cli.debug_info,
        verify_debug_info: cli.verify_debug_info,
        remote_compilation_info,
    })
}

pub async fn run_main(mut cli: Cli) -> Result<()> {
    cli.verbosity.init_tracing();

    if cli.inputs.is_empty() {
        return Err(CliError::NoInputFiles);
    }
    if !cli.distributed {
        return Err(CliError::DistributedNotRequested);
    }

    let working_dir = std::env::current_dir()?;
    let output_file_map = match &cli.output_file_map {
        Some(path) => {
            let path = make_absolute(path, &working_dir)?;
            Some(OutputFileMap::load(&path, &working_dir).await?)
        }
        None => None,
    };

    let mut diagnostics = DiagnosticsEngine::new();
    if !check_distributed_build_support(
        cli.compiler_mode(),
        output_file_map.as_ref(),
        &mut diagnostics,
    ) {
        return Err(CliError::DistributedBuildUnavailable);
    }
    let Some(output_file_map) = output_file_map else {
        return Err(CliError::DistributedBuildUnavailable);
    };

    let compiler_version = match cli.compiler_version.take() {
        Some(version) => version,
        None => query_compiler_version(&cli.swiftc).await?,
    };
    let remote_compilation_info = RemoteCompilationInfo {
        compiler_version,
        sdk_platform_and_version: cli.sdk.clone(),
        frontend_options: remote_frontend_options(&cli.module_name, &cli.xfrontend)?,
    };

    let options = planning_options(&cli, &working_dir, &output_file_map, remote_compilation_info)?;
    let emitter = SwiftcJobEmitter {
        swift_compiler: cli.swiftc.clone(),
        module_name: cli.module_name.clone(),
        frontend_args: cli.xfrontend.clone(),
        target_is_darwin: cfg!(target_os = "macos"),
    };
    let mut plan = plan_distributed_build(&options, &output_file_map, &emitter, &mut diagnostics)?;
    info!(
        sources = plan.source_files.len(),
        pre_jobs = plan.pre_compilation_jobs.len(),
        post_jobs = plan.post_compilation_jobs.len(),
        "planned distributed build"
    );

    let executor: Box<dyn RemoteExecutor> = if cli.distributed_dry_run {
        for job in plan.post_compilation_jobs.drain(..) {
            info!(kind = %job.kind, "dry run: skipping post-compilation job");
        }
        Box::new(MockRemoteExecutor::new())
    } else {
        let config_path = make_absolute(&cli.distributed_build_client_config, &working_dir)?;
        let configuration = ClientConfiguration::from_file(&config_path).await?;
        Box::new(DistributedBuildClient::new(configuration))
    };

    execute_distributed_build_plan(&plan, &diagnostics, &ProcessJobRunner, executor.as_ref())
        .await?;
    Ok(())
}
