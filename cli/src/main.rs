use clap::Parser;
use flock_cli::Cli;
use flock_cli::run_main;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_main(cli).await?;
    Ok(())
}
