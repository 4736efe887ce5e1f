use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing::{error, info};

use console_sync::conf::ConsoleConfig;
use console_sync::poller::OperationPoller;
use console_sync::query::{Occurrence, QueryOptions};
use console_sync::runtime::{build_synchronizer, init_tracing_basic, init_tracing_from_config};

#[derive(Parser)]
#[command(name = "console-sync", version, about = "Query and track a container management backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List one page of a collection
    List {
        collection: String,
        /// `field=value` substring match; repeatable
        #[arg(long = "filter", value_name = "FIELD=VALUE")]
        filters: Vec<String>,
        /// Combine clauses with OR instead of AND
        #[arg(long)]
        any: bool,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        order_by: Option<String>,
    },
    /// Poll a request status until it reaches a terminal stage
    Poll {
        status_url: String,
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: Option<u64>,
    },
    /// Lay out the stage graph of a request
    Graph { request_id: String },
}

/// `FIELD=VALUE` filters one field; a bare term searches every field.
fn apply_filter(options: QueryOptions, raw: &str) -> Result<QueryOptions> {
    match raw.split_once('=') {
        Some((field, value)) if !field.is_empty() => Ok(options.filter(field, value)),
        None => Ok(options.any(raw)),
        _ => bail!("Invalid filter '{}', expected FIELD=VALUE", raw),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = {
        let _guard = init_tracing_basic();
        let config = ConsoleConfig::load()?;
        config.validate()?;
        config
    };
    init_tracing_from_config(&config.logging)?;

    let default_limit = config.query.default_page_limit;
    let poller_config = config.poller.clone();
    let (client, sync) = build_synchronizer(config)?;
    let mut session = client.context().session().subscribe();

    let outcome = match cli.command {
        Command::List {
            collection,
            filters,
            any,
            limit,
            order_by,
        } => {
            let occurrence = if any { Occurrence::Any } else { Occurrence::All };
            let mut options = QueryOptions::new(occurrence);
            for raw in &filters {
                options = apply_filter(options, raw)?;
            }
            if let Some(order_by) = order_by {
                options = options.ordered_by(order_by);
            }

            sync.load_list("list", &collection, &options, limit.unwrap_or(default_limit))
                .await
                .map(|_| ())
        }
        Command::Poll {
            status_url,
            interval_ms,
        } => {
            let mut poller = OperationPoller::new(client.clone(), &poller_config);
            if let Some(ms) = interval_ms {
                poller = poller.with_interval(Duration::from_millis(ms));
            }
            let sync = sync.with_poller(poller);
            let result = tokio::select! {
                result = sync.await_operation("poll", &status_url) => result.map(|_| ()),
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, cancelling poll");
                    sync.cancel_operation("poll");
                    Ok(())
                }
            };
            print_snapshot(sync.snapshot().as_ref())?;
            sync.close();
            return result.map_err(Into::into);
        }
        Command::Graph { request_id } => sync.load_stage_graph(&request_id).await.map(|_| ()),
    };

    if session.has_changed().unwrap_or(false) {
        let state = *session.borrow_and_update();
        error!(?state, "Session is no longer valid");
    }

    print_snapshot(sync.snapshot().as_ref())?;
    sync.close();
    outcome.map_err(Into::into)
}

fn print_snapshot<T: serde::Serialize>(snapshot: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(snapshot).context("Failed to render snapshot")?;
    println!("{}", rendered);
    Ok(())
}
