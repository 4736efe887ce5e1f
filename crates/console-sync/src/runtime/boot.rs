//! Boot: process wiring shared by the binary: tracing setup and the
//! client/synchronizer stack built from a loaded config.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::client::HttpStore;
use crate::conf::{ConsoleConfig, LogFormat, LogOutput, LoggingConfig};
use crate::context::ConsoleContext;
use crate::query::QueryClient;
use crate::sync::ViewSynchronizer;

/// Phase 1: thread-local subscriber so config loading can log.
pub fn init_tracing_basic() -> tracing::subscriber::DefaultGuard {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,console_sync=debug"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    tracing::subscriber::set_default(subscriber)
}

/// Phase 2: global subscriber from `[logging]`. `RUST_LOG` still wins.
pub fn init_tracing_from_config(logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match (&logging.format, &logging.output) {
        (LogFormat::Json, LogOutput::Stderr) => registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .try_init(),
        (LogFormat::Json, LogOutput::File { path }) => {
            let file = open_log_file(path)?;
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_ansi(false)
                        .with_writer(Arc::new(file)),
                )
                .try_init()
        }
        (LogFormat::Pretty, LogOutput::Stderr) => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init(),
        (LogFormat::Pretty, LogOutput::File { path }) => {
            let file = open_log_file(path)?;
            registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_ansi(false)
                        .with_writer(Arc::new(file)),
                )
                .try_init()
        }
    };

    installed.context("Failed to install tracing subscriber")
}

fn open_log_file(path: &str) -> Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file '{}'", path))
}

/// HTTP store, query client and synchronizer for one console session.
pub fn build_synchronizer(config: ConsoleConfig) -> Result<(Arc<QueryClient>, ViewSynchronizer)> {
    let store = HttpStore::new(&config.backend).context("Failed to build HTTP client")?;
    info!(base_url = store.base_url(), "Document store client ready");

    let context = ConsoleContext::new(config);
    let client = Arc::new(QueryClient::new(Arc::new(store), context));
    let sync = ViewSynchronizer::new(Arc::clone(&client));
    Ok((client, sync))
}
