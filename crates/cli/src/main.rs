mod cli;
mod commands;
mod terminal;

use anyhow::Result;
use clap::Parser;

use mailcast_core::{load_dotenv, Config};

use crate::cli::CliArgs;
use crate::commands::App;

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = match args.profile.as_deref() {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    config.log_summary();

    let app = App::new(config).await?;
    app.run(args.command).await
}
