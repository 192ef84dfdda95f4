use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::cli::FillArgs;
use crate::commands::run_batch;
use crate::pipeline::{FormFillSink, FormStateSink};
use crate::util::ensure_directory;

pub fn run(args: FillArgs) -> Result<()> {
    let documents_dir = args.pipeline.output_dir.join("cards");
    ensure_directory(&documents_dir)?;

    if args.regenerate_command.is_none() {
        warn!("no --regenerate-command given, card documents will not be produced");
    }

    let form = FormStateSink::open(
        &args.form_state,
        args.form_template.as_deref(),
        &documents_dir,
        args.regenerate_command.clone(),
    )?;
    let mut sink = FormFillSink::new(form);

    let report = run_batch(&args.pipeline, &mut sink)?;
    info!(
        form_state = %args.form_state.display(),
        documents = report.outputs.len(),
        "form fill finished"
    );

    if report.summary.success == 0 && report.summary.failed > 0 {
        bail!("no card could be filled ({} failed)", report.summary.failed);
    }

    Ok(())
}
