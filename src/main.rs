mod cli;
mod engine;
mod error;
mod intake;
mod interpret;
mod model;
mod orchestrator;
mod session;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_non_tui = args.json || args.text;

    if cli::wants_stderr_logging(&args) {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "lungscan=info".into()),
            )
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    match cli::run(args).await {
        Ok(()) => {
            // Exit explicitly so lingering upload tasks don't hold the process.
            if is_non_tui {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => {
            if is_non_tui {
                eprintln!("{}", e);
                std::process::exit(1);
            }
            Err(e)
        }
    }
}
