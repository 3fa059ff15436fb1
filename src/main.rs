//! s5router - SOCKS5 proxy with interface routing
//!
//! This is the main entry point for the s5router application.

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use s5router::config::{load_config, Config};
use s5router::server::{Router, RouterHandle};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// s5router - SOCKS5 proxy that routes traffic through a chosen interface
#[derive(Parser, Debug)]
#[command(name = "s5router")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SOCKS5 listen port [default: 7530]
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to listen on; 0.0.0.0 listens on every running interface [default: 0.0.0.0]
    #[arg(long)]
    listen: Option<Ipv4Addr>,

    /// Address to route outbound traffic through; 0.0.0.0 picks the primary interface [default: 0.0.0.0]
    #[arg(short, long)]
    route: Option<Ipv4Addr>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

impl Args {
    /// Merge the command line over the file (or default) configuration
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => Config::default(),
        };

        if let Some(port) = self.port {
            config.router.port = port;
        }
        if let Some(listen) = self.listen {
            config.router.listen = listen;
        }
        if let Some(route) = self.route {
            config.router.route = route;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
            _ => {
                let _ = e.print();
                return ExitCode::FAILURE;
            }
        },
    };

    if let Err(e) = setup_logging(&args.log_level, args.json_log) {
        eprintln!("Failed to setup logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config_path = args.config.clone();
    let config = args.into_config()?;

    info!("s5router v{}", s5router::VERSION);
    if let Some(path) = config_path {
        info!("Configuration loaded from: {:?}", path);
    }

    let router = Router::with_system(config.router);
    spawn_signal_handler(router.handle());

    router.start().await.context("Router failed")
}

/// Stop the router on Ctrl+C or SIGTERM
fn spawn_signal_handler(handle: RouterHandle) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {
                            info!("Received Ctrl+C, shutting down...");
                        }
                        _ = sigterm.recv() => {
                            info!("Received SIGTERM, shutting down...");
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to setup SIGTERM handler: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Received Ctrl+C, shutting down...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down...");
        }

        handle.stop();
    });
}

/// Setup logging based on configuration
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
