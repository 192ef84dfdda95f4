use anyhow::{Result, bail};
use tracing::info;

use crate::cli::ExtractArgs;
use crate::commands::run_batch;
use crate::pipeline::ExportSink;

pub fn run(args: ExtractArgs) -> Result<()> {
    let exports_dir = args.pipeline.output_dir.join("exports");
    let mut sink = ExportSink::new(&exports_dir, args.format);

    let report = run_batch(&args.pipeline, &mut sink)?;
    info!(rows = sink.rows().len(), "records extracted");
    for output in &report.outputs {
        info!(path = %output, "export written");
    }

    if report.summary.success == 0 && report.summary.failed > 0 {
        bail!("no document could be extracted ({} failed)", report.summary.failed);
    }

    Ok(())
}
