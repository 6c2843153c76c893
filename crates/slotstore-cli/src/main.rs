use anyhow::Result;
use clap::Parser;
use slotstore_cli::{Cli, run};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "slotstore_core=debug,slotstore_cli=debug".into())
    } else {
        // Repairs and warnings only
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "slotstore_core=info,slotstore_cli=info".into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let stdout = std::io::stdout();
    run(cli, &mut stdout.lock())
}
