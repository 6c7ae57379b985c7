//! # framefind CLI
//!
//! ```bash
//! framefind --config ./config/framefind.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `framefind search --ocr "..." --asr "..."` | Run a combined search and print JSON |
//! | `framefind search --ocr "..." --backup-only` | Same, answered from the backup snapshots only |
//! | `framefind similar <IMAGE>` | Visual neighbours of one image |
//! | `framefind serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use framefind::config;
use framefind::logging;
use framefind::pipeline::{SearchEngine, SearchRequest};
use framefind::server;

/// framefind: multi-modal video frame retrieval.
#[derive(Parser)]
#[command(
    name = "framefind",
    about = "framefind: multi-modal video frame retrieval with graceful fallback",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/framefind.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a combined search and print the fused result as JSON.
    ///
    /// Each modality flag is optional; modalities without a query come back
    /// as empty arrays.
    Search {
        /// Visual-semantic text query.
        #[arg(long)]
        clip: Option<String>,

        /// On-screen text query.
        #[arg(long)]
        ocr: Option<String>,

        /// Speech transcript query.
        #[arg(long)]
        asr: Option<String>,

        /// Object label to search for.
        #[arg(long)]
        object: Option<String>,

        /// Count operator for `--object`: lt, lte, gt, gte, eq.
        #[arg(long, default_value = "gte")]
        operator: String,

        /// Count compared against with `--operator`.
        #[arg(long, default_value_t = 1)]
        value: i64,

        /// Query image URL or path for visual search.
        #[arg(long)]
        image_url: Option<String>,

        /// Restrict the object search to frames returned by `--clip`.
        #[arg(long)]
        object_as_filter: bool,

        /// Answer ocr, asr and object from the backup snapshots only, with
        /// the stricter manual match threshold.
        #[arg(long)]
        backup_only: bool,

        /// Publish day (1-31).
        #[arg(long)]
        day: Option<u32>,

        /// Publish month (1-12).
        #[arg(long)]
        month: Option<u32>,

        /// Publish year.
        #[arg(long)]
        year: Option<i32>,
    },

    /// Find frames visually similar to an image.
    Similar {
        /// Image URL or path understood by the vector backend.
        image: String,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init_logging(&cfg.logging)?;

    match cli.command {
        Commands::Search {
            clip,
            ocr,
            asr,
            object,
            operator,
            value,
            image_url,
            object_as_filter,
            backup_only,
            day,
            month,
            year,
        } => {
            let request = SearchRequest {
                clip,
                ocr,
                asr,
                object,
                image_url,
                operator,
                value,
                publish_day: day,
                publish_month: month,
                publish_year: year,
                object_as_filter,
                backup_only,
            };
            let engine = SearchEngine::from_config(&cfg)?;
            let fused = engine.search(&request).await?;
            println!("{}", serde_json::to_string_pretty(&fused)?);
        }
        Commands::Similar { image } => {
            let engine = SearchEngine::from_config(&cfg)?;
            let hits = engine.similar_images(&image).await?;
            if hits.is_empty() {
                anyhow::bail!("No similar images found");
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({ "similar_images": hits }))?
            );
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
