#![allow(clippy::print_stdout)]

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = aegis_cli::AegisCli::parse();
    let output = aegis_cli::run(cli).await?;
    println!("{output}");
    Ok(())
}
