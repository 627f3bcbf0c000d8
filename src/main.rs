mod cli;
mod config;
mod error;
mod hierarchy;
mod llm;
mod model;
mod pipeline;
mod session;
mod tracker;
mod util;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = cli::parse_args(&args)?;
    let config = config::load_config()?;

    cli::run(command, config).await
}
