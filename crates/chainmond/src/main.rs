use clap::Parser;

use chainmond::config::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(cli.log_filter()?)
        .init();

    chainmond::run(cli).await
}
