use std::path::Path;

use common::utils::config::get_config;
use ingestion_pipeline::cache::{ReconcileOutcome, SpaceCache};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Merges the legacy `<SPACE>_full.json` cache naming variant into the
/// canonical `<SPACE>.json` form. Dry run by default; pass `--execute` to
/// actually rename and delete files.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let dry_run = !std::env::args().any(|arg| arg == "--execute");

    let config = get_config()?;
    let cache = SpaceCache::new(Path::new(&config.data_dir).join("spaces"))?;

    info!(dry_run, data_dir = %config.data_dir, "reconciling cache naming variants");

    let outcomes = cache.reconcile(dry_run)?;
    let mut merged = 0;
    let mut renamed = 0;
    let mut unreadable = 0;
    for outcome in &outcomes {
        match outcome {
            ReconcileOutcome::Merged {
                space_key,
                kept_full,
            } => {
                merged += 1;
                info!(%space_key, kept_full, "merged duplicate cache variants");
            }
            ReconcileOutcome::Renamed { space_key } => {
                renamed += 1;
                info!(%space_key, "renamed full variant to canonical name");
            }
            ReconcileOutcome::Unreadable { space_key } => {
                unreadable += 1;
                info!(%space_key, "variant unreadable; left untouched");
            }
        }
    }

    info!(merged, renamed, unreadable, dry_run, "reconciliation finished");
    if dry_run && !outcomes.is_empty() {
        info!("dry run only; re-run with --execute to apply the changes above");
    }

    Ok(())
}
