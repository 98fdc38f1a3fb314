use anyhow::Result;
use clap::Parser;
use clap::error::ErrorKind;
use k3strap::Cli;
use k3strap::commands::bootstrap;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Settings in .env apply to the env-backed flags below
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            // Usage errors exit with 1, not clap's default of 2
            let _ = e.print();
            std::process::exit(1);
        }
    };

    bootstrap::handle_bootstrap(&cli)
}
