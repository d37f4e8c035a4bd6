//! The flock remote compilation server.

#![deny(clippy::print_stdout, clippy::print_stderr)]

mod admission;
mod compilation;
mod config;
mod error;
mod registry;
mod server;

pub use config::DEFAULT_SERVER_CONFIG_FILE;
pub use config::ServerConfiguration;
pub use error::ConfigFileError;
pub use error::Result;
pub use error::ServerError;
pub use registry::FrontendRegistry;
pub use server::FlockServer;
pub use server::RequestState;

use clap::Parser;
use flock_common::VerbosityCliArg;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing::warn;

#[derive(Debug, Parser)]
#[command(name = "flock-server", version, about = "Compile Swift sources for flock clients")]
pub struct Cli {
    /// Server configuration file.
    #[arg(long, default_value = DEFAULT_SERVER_CONFIG_FILE)]
    pub config: PathBuf,

    #[clap(flatten)]
    pub verbosity: VerbosityCliArg,
}

pub async fn run_main(cli: Cli) -> Result<()> {
    cli.verbosity.init_tracing();

    let config = ServerConfiguration::from_file(&cli.config).await?;
    let registry = FrontendRegistry::discover(&config.swift_compiler_frontends).await?;
    if registry.is_empty() {
        warn!("no swift compiler frontends configured; every request will be rejected");
    }
    for (version, frontend) in registry.versions() {
        info!(frontend = %frontend.display(), "serving {version:?}");
    }
    for (name, path) in &config.sdks {
        info!(sdk = %name, path = %path.display(), "sdk available");
    }

    let address = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| ServerError::Bind {
            address: address.clone(),
            source,
        })?;
    info!(%address, "listening");

    let server = Arc::new(FlockServer::new(&config, registry));
    server
        .serve(listener, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for ctrl-c: {err}");
                std::future::pending::<()>().await;
            }
        })
        .await
}
