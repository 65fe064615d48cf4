//! # Docs Assistant CLI (`dax`)
//!
//! ## Usage
//!
//! ```bash
//! dax --config ./config/dax.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dax serve` | Start the HTTP API server |
//! | `dax search "<query>"` | Hybrid search over the documentation |
//! | `dax answer "<query>"` | Cited answer, or the closest matches |
//! | `dax check` | Validate config and report enabled providers |
//!
//! ## Examples
//!
//! ```bash
//! dax search "Store command" --k 5 --version 2.3
//! dax answer "How do I store a cue?" --mode helpful
//! DAX_LOG=docs_assistant=debug dax serve --log-json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docs_assistant::config::{load_config, Config};
use docs_assistant::logging::init_tracing;
use docs_assistant::pipeline::{AnswerParams, Pipeline, SearchParams};
use docs_assistant::server::run_server;
use docs_assistant_core::models::{AnswerMode, AnswerResult, RetrievalSource, SearchResponse};

/// Docs Assistant: hybrid search and cited answers over product
/// documentation.
#[derive(Parser)]
#[command(name = "dax", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dax.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server on `[server].bind`.
    Serve,

    /// Search the documentation.
    Search {
        query: String,

        /// Number of passages to return.
        #[arg(long)]
        k: Option<i64>,

        /// Documentation release to search.
        #[arg(long)]
        version: Option<String>,

        /// Page path the search is scoped to (part of the cache key).
        #[arg(long)]
        path: Option<String>,

        /// Print the raw response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Answer a question with citations.
    Answer {
        query: String,

        /// `strict` refuses to generate on weak evidence; `helpful` always generates.
        #[arg(long)]
        mode: Option<AnswerMode>,

        #[arg(long)]
        version: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Validate the configuration and report which providers are enabled.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => run_server(&config).await?,
        Commands::Search {
            query,
            k,
            version,
            path,
            json,
        } => {
            let pipeline = Pipeline::from_config(&config)?;
            let request = pipeline.search_request(SearchParams {
                query,
                k,
                version,
                path,
            })?;
            let response = pipeline.search(&request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_search(&response);
            }
        }
        Commands::Answer {
            query,
            mode,
            version,
            json,
        } => {
            let pipeline = Pipeline::from_config(&config)?;
            let request = pipeline.answer_request(AnswerParams {
                query,
                mode,
                version,
            });
            let result = pipeline.answer(&request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_answer(&result);
            }
        }
        Commands::Check => check(&config),
    }

    Ok(())
}

fn print_search(response: &SearchResponse) {
    if response.passages.is_empty() {
        println!("No results for \"{}\" (version {}).", response.query, response.version);
        return;
    }
    for (i, c) in response.passages.iter().enumerate() {
        let rerank = c
            .rerank_score
            .map(|s| format!(", rerank {:.2}", s))
            .unwrap_or_default();
        let source = match c.source {
            RetrievalSource::Vector => "vector",
            RetrievalSource::Lexical => "lexical",
        };
        println!(
            "{}. {} - {}  ({}, {:.2}{})",
            i + 1,
            c.passage.title,
            c.passage.section(),
            source,
            c.score,
            rerank
        );
        println!("    {}", c.passage.url);
    }
}

fn print_answer(result: &AnswerResult) {
    println!("{}\n", result.answer);
    if !result.citations.is_empty() {
        println!("Sources:");
        for c in &result.citations {
            println!("  [{}] {} - {}\n      {}", c.id, c.title, c.section, c.url);
        }
    }
    println!("\nconfidence: {:.2}", result.confidence);
}

fn check(config: &Config) {
    let on_off = |enabled: bool, detail: &str| {
        if enabled {
            format!("enabled ({})", detail)
        } else {
            "disabled".to_string()
        }
    };
    println!("bind:      {}", config.server.bind);
    println!(
        "embedding: {}",
        on_off(config.embedding.is_enabled(), &config.embedding.model)
    );
    println!(
        "vector:    {}",
        on_off(config.vector.url.is_some(), config.vector.url.as_deref().unwrap_or(""))
    );
    println!(
        "lexical:   {}",
        on_off(config.lexical.app_id.is_some(), &config.lexical.index)
    );
    println!(
        "rerank:    {}",
        on_off(config.rerank.provider != "disabled", &config.rerank.model)
    );
    println!(
        "answer:    {}",
        on_off(config.answer.is_enabled(), &config.answer.model)
    );
    println!("cache:     {}", config.cache.backend);

    match Pipeline::from_config(config) {
        Ok(_) => println!("\nOK: all enabled providers are ready"),
        Err(e) => println!("\nNOT READY: {:#}", e),
    }
}
