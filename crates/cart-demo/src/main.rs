//! Cart view demo entry point.
//!
//! Reads JSON-lines [`view::ViewEvent`]s from the file given as the first
//! argument (or stdin), folds them through the cart view and prints every
//! resulting cart as JSON.
//!
//! Environment:
//! - `CART_DESCRIPTORS`: comma-separated descriptor set files (default: built-in)
//! - `CART_INCLUDE_DIRS`: comma-separated search path (default: `.`)
//! - `CART_VIEW_ID`: overrides the view id (default: `CartEvents`)

use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use cart_demo::{DemoError, cart_view, load_pool, read_events};
use futures_util::stream;
use runtime::{ComponentRegistry, InMemoryViewStore, RuntimeConfig, ViewProcessor};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use view::ViewOptions;

fn path_list(var: &str) -> Vec<PathBuf> {
    std::env::var(var)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<(), DemoError> {
    let config = RuntimeConfig::from_env();

    // 1. Initialize tracing (stderr, so stdout carries only the carts)
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // 2. Resolve the descriptor and define the view
    let mut options = ViewOptions::new();
    for dir in path_list("CART_INCLUDE_DIRS") {
        options = options.include_dir(dir);
    }
    if let Ok(view_id) = std::env::var("CART_VIEW_ID") {
        options = options.view_id(view_id);
    }
    let pool = load_pool(&path_list("CART_DESCRIPTORS"), &options.include_dirs)?;
    let definition = cart_view(&pool, options)?;

    let mut registry = ComponentRegistry::new();
    registry.register(Arc::new(definition.clone()))?;

    // 3. Read events
    let events = match std::env::args_os().nth(1) {
        Some(path) => read_events(BufReader::new(std::fs::File::open(path)?))?,
        None => read_events(std::io::stdin().lock())?,
    };
    tracing::info!(events = events.len(), view_id = definition.id(), "replaying events");

    // 4. Fold them through the view
    let processor = Arc::new(ViewProcessor::with_config(
        &definition,
        InMemoryViewStore::new(),
        config,
    ));
    let report = Arc::clone(&processor).run(stream::iter(events)).await;
    for failure in &report.failures {
        tracing::error!(key = %failure.key, method = %failure.method, error = %failure.error, "event failed");
    }

    // 5. Print the materialized carts
    for (key, state) in processor.states().await? {
        let line = serde_json::json!({ "key": key, "state": state.value() });
        println!("{line}");
    }

    tracing::info!(
        processed = report.processed,
        updated = report.updated,
        unchanged = report.unchanged,
        failed = report.failures.len(),
        dropped = report.dropped,
        "replay finished"
    );
    Ok(())
}
