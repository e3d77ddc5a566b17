use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use fetchd::config::Config;
use fetchd::download::{DownloadRequest, DownloadStatus, Orchestrator, Phase, StatusStore};
use fetchd::engine;
use fetchd::server::Server;

const DEFAULT_PORT: u16 = 7070;

#[derive(Parser)]
#[command(name = "fetchd", version, about = "Managed multi-connection downloads via aria2c")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP download service
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
    },
    /// Download a single file in the foreground
    Get {
        /// Source URL
        url: String,
        /// Destination directory (defaults to the current directory)
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Output filename (derived from the URL when omitted)
        #[arg(long)]
        out: Option<String>,
        /// Subfolder appended to the destination directory
        #[arg(long)]
        subfolder: Option<String>,
        /// Connection/segment count (1-32)
        #[arg(short = 'x', long, default_value_t = 16)]
        connections: u8,
        /// Rewrite huggingface.co URLs through hf-mirror.com
        #[arg(long)]
        mirror: bool,
    },
    /// Report where the download engine was found
    Engine,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fetchd=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { port, bind } => serve(port, bind).await,
        Commands::Get {
            url,
            dir,
            out,
            subfolder,
            connections,
            mirror,
        } => get(url, dir, out, subfolder, connections, mirror).await,
        Commands::Engine => engine_report(),
    }
}

async fn serve(port: u16, bind: String) -> Result<()> {
    let config = Config::load()?;
    // First run: persist the defaults so the file is there to edit.
    if !Config::path().exists() {
        if let Err(err) = config.save() {
            tracing::warn!("could not write default config: {:#}", err);
        }
    }
    Server::new(port)
        .with_bind_address(bind)
        .with_config(config)
        .start()
        .await
}

async fn get(
    url: String,
    dir: Option<PathBuf>,
    out: Option<String>,
    subfolder: Option<String>,
    connections: u8,
    mirror: bool,
) -> Result<()> {
    let dir = match dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    let request = DownloadRequest {
        url,
        destination: None,
        custom_path: Some(dir),
        subfolder,
        filename: out,
        use_mirror: mirror,
        connections,
    };

    let store = Arc::new(StatusStore::new());
    let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&store)));

    // Echo progress while the blocking download runs on a worker thread.
    let printer = tokio::spawn(print_progress(store.subscribe()));

    let worker = Arc::clone(&orchestrator);
    let status = tokio::task::spawn_blocking(move || worker.run(&request)).await?;
    let _ = printer.await;

    match status.phase {
        Phase::Completed => {
            println!("{} {}", "downloaded:".green().bold(), status.target_path);
            Ok(())
        }
        _ => {
            let reason = if status.message.is_empty() {
                "download engine reported failure".to_string()
            } else {
                status.message.clone()
            };
            eprintln!("{} {}", "download failed:".red().bold(), reason);
            std::process::exit(1);
        }
    }
}

/// Echo progress updates until the download reaches a terminal phase.
///
/// A lagging receiver skips the missed snapshots and keeps printing; only
/// a closed channel or a terminal status ends the loop. Returns the
/// terminal phase, or `None` if the channel closed first.
async fn print_progress(mut rx: broadcast::Receiver<DownloadStatus>) -> Option<Phase> {
    loop {
        let status = match rx.recv().await {
            Ok(status) => status,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return None,
        };
        if status.phase == Phase::InProgress {
            println!(
                "  {} {:>3}%  {}  ETA {}",
                "↓".cyan(),
                status.percent,
                status.rate,
                status.eta
            );
        }
        if status.phase.is_terminal() {
            return Some(status.phase);
        }
    }
}

fn engine_report() -> Result<()> {
    match engine::locate() {
        Some(path) => {
            println!("{} {}", "engine:".green().bold(), path.display());
            Ok(())
        }
        None => {
            eprintln!("{} {}", "not found:".red().bold(), engine::install_guidance());
            std::process::exit(1);
        }
    }
}
