//! Main binary entry point for pg-env-sync.

use anyhow::{Context, Result};
use pg_env_sync::args::{Command, get_args};
use pg_env_sync::{ConnectionManager, SyncOrchestrator};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = get_args()?;
    let config = args.command.to_config();
    match &args.command {
        Command::Sync { report_json, .. } => {
            let cancel = Arc::new(AtomicBool::new(false));
            let cancel_clone = cancel.clone();
            ctrlc::set_handler(move || {
                cancel_clone.store(true, Ordering::Relaxed);
            })?;
            let report = pg_env_sync::run_sync(config, Some(cancel))?;
            println!("{report}");
            if let Some(path) = report_json {
                report
                    .write_json(path)
                    .with_context(|| format!("writing report to {}", path.display()))?;
            }
        }
        Command::Plan { .. } => {
            config.validate()?;
            let connections = ConnectionManager::connect(&config)?;
            let plan = SyncOrchestrator::new(config, connections).plan()?;
            for (position, table) in plan.tables.iter().enumerate() {
                println!("{:>4}  {}", position + 1, table);
            }
            for table in &plan.excluded {
                println!("   -  {table} (excluded)");
            }
            for table in &plan.missing_in_source {
                println!("   -  {table} (not present in source)");
            }
            for edge in &plan.order.dropped_edges {
                println!("cycle: ignoring {edge}");
            }
        }
    }
    Ok(())
}
