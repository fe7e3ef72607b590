use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use rust_image_pipeline::infrastructure::{queue, storage};
use rust_image_pipeline::utils::validation::NamePatterns;
use rust_image_pipeline::{Consumer, PipelineConfig, PipelineError, Producer, RunResult};
use std::path::PathBuf;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "rust-image-pipeline",
    version,
    about = "Stage images through a durable queue and publish half-size copies"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload matching files to staging and enqueue a reference to each
    Produce {
        /// Directory to sweep (not recursive)
        #[arg(long)]
        source: PathBuf,

        /// File-name glob, repeatable (default: every file)
        #[arg(long = "pattern")]
        patterns: Vec<String>,

        /// Log decisions without uploading, enqueuing or deleting
        #[arg(long)]
        simulate: bool,
    },
    /// Drain the queue and publish resized images
    Consume {
        /// Preview one batch without leasing, uploading or deleting
        #[arg(long)]
        simulate: bool,
    },
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_image_pipeline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let config = PipelineConfig::from_env();
    let settings = match config.validate() {
        Ok(settings) => settings,
        Err(e) => {
            error!("❌ {}", e);
            return 1;
        }
    };

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = cancel_tx.send(true);
    });

    let sdk_config = storage::load_sdk_config(&settings).await;
    let store = storage::setup_storage(&sdk_config, &settings);
    let queue = queue::setup_queue(&sdk_config, &settings);

    let outcome = match cli.command {
        Commands::Produce {
            source,
            patterns,
            simulate,
        } => {
            let patterns = match NamePatterns::new(&patterns) {
                Ok(patterns) => patterns,
                Err(e) => {
                    error!("❌ {}", e);
                    return 1;
                }
            };
            info!("🚀 Producing from {}", source.display());
            Producer::new(store, queue, config)
                .run(&source, &patterns, simulate, &cancel_rx)
                .await
        }
        Commands::Consume { simulate } => {
            info!("🚀 Consuming from '{}'", config.queue_name);
            Consumer::new(store, queue, config)
                .run(simulate, &cancel_rx)
                .await
        }
    };

    finish(outcome)
}

fn finish(outcome: Result<RunResult, PipelineError>) -> i32 {
    match outcome {
        Ok(result) => {
            for e in &result.errors {
                warn!("⚠️  {}", e);
            }
            match serde_json::to_string_pretty(&result) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("❌ Could not render run summary: {}", e),
            }
            result.exit_code()
        }
        Err(e) => {
            error!("❌ Sweep aborted: {}", e);
            e.exit_code()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, stopping after the current item...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, stopping after the current item...");
        },
    }
}
