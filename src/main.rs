use anyhow::Result;
use clap::Parser;
use sourcectl::{
    app,
    cli::{handle_devices_command, Cli, CliCommand},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("sourcectl {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(CliCommand::Devices(args)) => {
            handle_devices_command(args).await?;
            return Ok(());
        }
        None => {}
    }

    app::run_service().await
}
