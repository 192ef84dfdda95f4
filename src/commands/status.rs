use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::{default_db_path, latest_manifest};
use crate::pipeline::CardStore;

pub fn run(args: StatusArgs) -> Result<()> {
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| default_db_path(&args.output_dir));

    info!(output_dir = %args.output_dir.display(), "status requested");

    match latest_manifest(&args.output_dir)? {
        Some(manifest) => {
            info!(
                run_id = %manifest.run_id,
                mode = %manifest.mode,
                started_at = %manifest.started_at,
                finished_at = %manifest.finished_at,
                input_dir = %manifest.input_dir,
                prepared_by = %manifest.prepared_by,
                enrichment_source = %manifest.enrichment_source.clone().unwrap_or_default(),
                success = manifest.success,
                failed = manifest.failed,
                "loaded latest run manifest"
            );
            for failure in &manifest.failures {
                warn!(
                    file = %failure.file,
                    kind = failure.kind.as_str(),
                    reason = %failure.reason,
                    "failed document"
                );
            }
        }
        None => warn!(output_dir = %args.output_dir.display(), "no run manifest found"),
    }

    if db_path.exists() {
        let summary = CardStore::open(&db_path)?
            .summary()
            .with_context(|| format!("failed to summarize {}", db_path.display()))?;
        info!(
            path = %db_path.display(),
            cards = summary.cards,
            properties = summary.properties,
            last_imported_at = %summary.last_imported_at.unwrap_or_default(),
            "card store status"
        );
    } else {
        warn!(path = %db_path.display(), "card store missing");
    }

    Ok(())
}
