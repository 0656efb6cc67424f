//! Stowage CLI: ingest files and derive variants from the command line.
//!
//! Configuration comes from the environment (and `.env`); see `Config`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use stowage_cli::{init_tracing, App};
use stowage_core::Config;
use stowage_pipeline::{IntoPayload, LocalFile, PolicyOptions};

#[derive(Parser)]
#[command(name = "stowage", about = "File ingestion and variant pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a local file into the store mounted for a scheme
    Save {
        /// Target scheme, e.g. `uploads`
        scheme: String,
        /// Path to the file to ingest
        file: PathBuf,
        /// Claimed media type (default: from the extension)
        #[arg(long)]
        mime: Option<String>,
        /// Stored base name (default: the file's own name)
        #[arg(long)]
        name: Option<String>,
        /// Store path overriding the policy's
        #[arg(long)]
        path: Option<String>,
        /// Replace a file already stored under the same key
        #[arg(long)]
        overwrite: bool,
    },
    /// Derive every variant the policy declares for a stored file
    Variants {
        /// File URI, e.g. `uploads://photo.jpg`
        uri: String,
    },
    /// Show the trusted facts the store holds for a file
    Stat {
        /// File URI; `~suffix` resolves a generated variant
        uri: String,
    },
    /// List the registered policy keys
    Policies,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("Invalid configuration")?;
    let app = App::from_config(&config).await?;

    match cli.command {
        Commands::Save {
            scheme,
            file,
            mime,
            name,
            path,
            overwrite,
        } => {
            let mut payload = LocalFile::new(&file).into_payload().await?;
            if let Some(mime) = mime {
                payload = payload.with_mime(mime);
            }
            let mut options = PolicyOptions::new();
            if let Some(name) = name {
                options = options.with("name", name);
            }
            if let Some(path) = path {
                options = options.with("path", path);
            }
            if overwrite {
                options = options.with("overwrite", true);
            }

            let record = app
                .filer
                .save(&scheme, payload, options)
                .await
                .with_context(|| format!("Failed to save {}", file.display()))?;
            print_json(&record)?;
        }
        Commands::Variants { uri } => {
            let variants = app
                .variator
                .generate(uri.as_str(), PolicyOptions::new())
                .await
                .with_context(|| format!("Failed to generate variants of {}", uri))?;
            print_json(&variants)?;
        }
        Commands::Stat { uri } => {
            let located = app.variator.locate(uri.as_str(), PolicyOptions::new()).await?;
            let stats = app.storage.stats(&located).await?;
            print_json(&stats)?;
        }
        Commands::Policies => {
            print_json(&app.policy_rows())?;
        }
    }

    Ok(())
}
