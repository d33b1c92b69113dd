//! almagest - semantic document search over a markdown publication corpus
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::print_stdout,
        clippy::print_stderr,
        reason = "Allow for tests"
    )
)]

use anyhow::Result;
use clap::Parser as _;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

mod cli;
mod handlers;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "almagest_cli=info,almagest_engine=info,almagest_store=info".into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            corpus,
            metadata,
            store,
            batch_size,
        } => {
            handlers::handle_ingest(corpus, metadata, store, batch_size, cli.provider).await?;
        }
        Commands::Backfill { metadata, store } => {
            handlers::handle_backfill(metadata, store).await?;
        }
        Commands::Search {
            query,
            limit,
            store,
        } => {
            handlers::handle_search(query, limit, store, cli.provider).await?;
        }
        Commands::List { store } => {
            handlers::handle_list(store).await?;
        }
    }

    Ok(())
}
