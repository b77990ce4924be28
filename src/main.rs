use clap::Parser;
use rugguard::cli::{run, Cli};
use rugguard::config::load_config;
use rugguard::log_sink::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.log)?;
    run(cli, config).await
}
