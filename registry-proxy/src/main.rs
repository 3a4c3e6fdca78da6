//! Standalone registry proxy CLI binary.
//!
//! `start` runs the server; `wait-for-ready` blocks an external process until
//! the server is accepting connections; `assert-served-from-local-tgz`
//! inspects the access log after the fact and fails loudly when a package was
//! fetched from anywhere but the local archives.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use registry_proxy::{access_log, gather_evidence, readiness, run_server, ProxyConfig};

#[derive(Parser)]
#[command(name = "registry-proxy")]
#[command(about = "Local package registry proxy for fetch-source verification")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest the configured archives and serve them on an ephemeral loopback port
    Start {
        /// Working directory for objects, the access log and the ready marker
        #[arg(long, default_value = "./data")]
        data: PathBuf,

        /// Package to serve, as <name>=<path-to-archive.tgz> (repeatable)
        #[arg(long = "package", value_name = "NAME=ARCHIVE")]
        packages: Vec<String>,

        /// Upstream registry that unknown packages are forwarded to
        #[arg(long, default_value = "https://registry.npmjs.org")]
        upstream: String,
    },

    /// Block until the readiness marker appears, then print the server URL
    WaitForReady {
        /// Working directory the server was started with
        #[arg(long, default_value = "./data")]
        data: PathBuf,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },

    /// Verify from the access log that a package was served from its local archive
    AssertServedFromLocalTgz {
        /// Package name to check
        name: String,

        /// Working directory the server was started with
        #[arg(long, default_value = "./data")]
        data: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "registry_proxy=info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            data,
            packages,
            upstream,
        } => {
            let config = ProxyConfig::from_cli(data, &packages, &upstream)?;
            run_server(config).await
        }

        Commands::WaitForReady { data, timeout_secs } => {
            let url =
                readiness::wait_for_ready(&data, Duration::from_secs(timeout_secs)).await?;
            println!("{url}");
            Ok(())
        }

        Commands::AssertServedFromLocalTgz { name, data } => {
            assert_served_from_local_tgz(&name, &data).await
        }
    }
}

async fn assert_served_from_local_tgz(name: &str, data_dir: &std::path::Path) -> Result<()> {
    let log_path = access_log::log_path(data_dir);
    let log = tokio::fs::read_to_string(&log_path)
        .await
        .with_context(|| format!("failed to read access log at {}", log_path.display()))?;

    match gather_evidence(&log, name).verdict(name) {
        Ok(()) => {
            println!("✅ package '{name}' was served from the local archive");
            Ok(())
        }
        Err(reason) => {
            eprintln!("❌ {reason}");
            eprintln!("--- access log ({}) ---", log_path.display());
            eprint!("{log}");
            bail!("package '{name}' was not served from the local archive");
        }
    }
}
