//! Mercato management commands.
//!
//! # Usage
//!
//! ```bash
//! # Apply database migrations
//! mercato migrate
//!
//! # Upload static files to S3 (or copy them to STATIC_ROOT when S3 is off)
//! mercato collectstatic
//!
//! # Include the Vite build and show full error chains
//! mercato collectstatic --preserve-vite --show-error-details
//!
//! # Use S3 even when USE_S3 is off
//! mercato collectstatic --force-s3
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "mercato")]
#[command(author, version, about = "Mercato management commands")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Collect static files into the configured static storage
    Collectstatic {
        /// Directory to collect from
        #[arg(long, default_value = "static")]
        source: PathBuf,

        /// Also upload the Vite build directory (`dist/`)
        #[arg(long)]
        preserve_vite: bool,

        /// Print the full cause chain for each failed upload
        #[arg(long)]
        show_error_details: bool,

        /// Upload to S3 even when `USE_S3` is off
        #[arg(long)]
        force_s3: bool,

        /// List what would be uploaded without uploading
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mercato=info,mercato_storefront=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Collectstatic {
            source,
            preserve_vite,
            show_error_details,
            force_s3,
            dry_run,
        } => {
            let options = commands::collectstatic::Options {
                source,
                preserve_vite,
                show_error_details,
                force_s3,
                dry_run,
            };
            commands::collectstatic::run(&options).await?;
        }
    }
    Ok(())
}
