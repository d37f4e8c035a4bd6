//! Standard `-v` / `--verbose` flag shared by the flock binaries.

use clap::ArgAction;
use clap::Args;

#[derive(Args, Clone, Copy, Debug, Default)]
pub struct VerbosityCliArg {
    /// Increase log verbosity (repeat for more). Overridden by `RUST_LOG`.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl VerbosityCliArg {
    pub fn init_tracing(self) {
        crate::init_tracing(self.verbose);
    }
}
