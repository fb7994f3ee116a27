use clap::Parser;
use color_eyre::eyre::Result;
use xlottery::config::Cli;

mod client;
mod ui;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let _log_guard = client::init_tracing(&cli.log_dir)?;
    tracing::info!("starting xlottery client");
    client::run_app(cli).await
}
