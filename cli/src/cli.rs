//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use polyglot_retrieval::PolyglotConfig;

/// Ask questions about a text or transcript you are studying.
#[derive(Parser, Debug)]
#[command(name = "polyglot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Embed with local feature hashing instead of the embeddings API.
    #[arg(long, global = true)]
    pub local: bool,

    /// Characters per chunk.
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,

    /// Characters shared by consecutive chunks.
    #[arg(long, global = true)]
    pub overlap: Option<usize>,

    /// Embedding model.
    #[arg(long, global = true)]
    pub embed_model: Option<String>,

    /// API base URL for embeddings and chat.
    #[arg(long, global = true, env = "OPENAI_BASE_URL")]
    pub base_url: Option<String>,

    /// Output JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the segments a file would be indexed as.
    Chunk {
        /// Plain-text or transcript JSON file.
        file: PathBuf,
    },

    /// Show the excerpts most similar to a query.
    Search {
        /// Plain-text or transcript JSON file.
        file: PathBuf,

        /// Search query.
        query: String,

        /// Number of excerpts to return.
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Answer a question from the file's content.
    Ask {
        /// Plain-text or transcript JSON file.
        file: PathBuf,

        /// Question to answer.
        question: String,

        /// Number of excerpts given to the model.
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Chat model.
        #[arg(long)]
        model: Option<String>,

        /// Only print the prompt (skip the chat call).
        #[arg(long)]
        dry_run: bool,
    },
}

impl Cli {
    /// Apply command-line overrides on top of the environment configuration.
    pub fn apply_overrides(&self, config: &mut PolyglotConfig) {
        if let Some(chunk_size) = self.chunk_size {
            config.chunker.chunk_size = chunk_size;
        }
        if let Some(overlap) = self.overlap {
            config.chunker.overlap = overlap;
        }
        if let Some(model) = &self.embed_model {
            config.index.embedding_model.clone_from(model);
        }
        if let Some(url) = &self.base_url {
            config.openai.base_url.clone_from(url);
        }

        match &self.command {
            Commands::Search { top_k, .. } => {
                if let Some(top_k) = top_k {
                    config.qa.top_k = *top_k;
                }
            }
            Commands::Ask { top_k, model, .. } => {
                if let Some(top_k) = top_k {
                    config.qa.top_k = *top_k;
                }
                if let Some(model) = model {
                    config.qa.chat_model.clone_from(model);
                }
            }
            Commands::Chunk { .. } => {}
        }
    }
}
