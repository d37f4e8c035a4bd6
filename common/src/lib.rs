mod logging;
pub use logging::default_log_level;
pub use logging::init_tracing;

#[cfg(feature = "cli")]
mod verbosity_cli_arg;

#[cfg(feature = "cli")]
pub use verbosity_cli_arg::VerbosityCliArg;
