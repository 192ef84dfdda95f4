use anyhow::{Result, bail};
use tracing::info;

use crate::cli::ImportArgs;
use crate::commands::{default_db_path, run_batch};
use crate::pipeline::{CardStore, StoreSink};

pub fn run(args: ImportArgs) -> Result<()> {
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| default_db_path(&args.pipeline.output_dir));

    let store = CardStore::open(&db_path)?;
    let mut sink = StoreSink::new(store);

    let report = run_batch(&args.pipeline, &mut sink)?;
    info!(
        path = %db_path.display(),
        cards_total = sink.store().count_cards()?,
        imported = report.outputs.len(),
        "card store updated"
    );

    if report.summary.success == 0 && report.summary.failed > 0 {
        bail!("no card could be imported ({} failed)", report.summary.failed);
    }

    Ok(())
}
