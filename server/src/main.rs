use clap::Parser;
use flock_server::Cli;
use flock_server::run_main;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_main(cli).await?;
    Ok(())
}
