use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "almagest")]
#[command(about = "Semantic search over a markdown publication corpus", long_about = None)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        help = "Embedding provider to use: gemini, ollama, or mock (overrides config)"
    )]
    pub provider: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Embed a markdown corpus into the document store")]
    Ingest {
        #[arg(long, help = "Directory containing the .md corpus files")]
        corpus: PathBuf,

        #[arg(long, help = "JSON metadata table keyed by external id")]
        metadata: Option<PathBuf>,

        #[arg(long, help = "Store snapshot file (overrides config)")]
        store: Option<PathBuf>,

        #[arg(long, help = "Documents per embedding batch (overrides config)")]
        batch_size: Option<usize>,
    },

    #[command(about = "Patch stored documents from a metadata table")]
    Backfill {
        #[arg(long, help = "JSON metadata table keyed by publication number or external id")]
        metadata: PathBuf,

        #[arg(long, help = "Store snapshot file (overrides config)")]
        store: Option<PathBuf>,
    },

    #[command(about = "Rank stored documents against a natural-language query")]
    Search {
        #[arg(help = "The query text")]
        query: String,

        #[arg(short, long, help = "Maximum number of results")]
        limit: Option<usize>,

        #[arg(long, help = "Store snapshot file (overrides config)")]
        store: Option<PathBuf>,
    },

    #[command(about = "List every stored document")]
    List {
        #[arg(long, help = "Store snapshot file (overrides config)")]
        store: Option<PathBuf>,
    },
}
