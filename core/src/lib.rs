//! Root of the `flock-core` library: dependency analysis over swiftdeps files,
//! distributed build planning and plan execution.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod dependency_analysis;
pub mod diagnostics;
pub mod error;
pub mod execution;
pub mod executor;
pub mod file_types;
pub mod job;
pub mod output_file_map;
pub mod paths;
pub mod planning;

pub use dependency_analysis::DependencyItem;
pub use dependency_analysis::DependencyMap;
pub use dependency_analysis::DependencyMapper;
pub use diagnostics::DiagnosticsEngine;
pub use error::FlockErr;
pub use error::Result;
pub use execution::JobRunner;
pub use execution::ProcessJobRunner;
pub use execution::execute_distributed_build_plan;
pub use executor::MockRemoteExecutor;
pub use executor::RemoteExecutor;
pub use planning::BuildPlan;
pub use planning::CompilerMode;
pub use planning::PlanningOptions;
pub use planning::plan_distributed_build;
