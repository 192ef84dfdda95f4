pub mod extract;
pub mod fill;
pub mod import;
pub mod show;
pub mod status;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use crate::cli::{InputFormat, PipelineArgs};
use crate::model::BatchRunManifest;
use crate::pipeline::{
    BatchReport, BatchRunner, FieldExtractor, FormMapper, LookupTable, OutputSink,
    PdftotextSource, PlainTextSource, RecordEnricher, TextSource,
};
use crate::settings::Settings;
use crate::util::{now_utc_string, utc_compact_string, write_json_pretty};

pub(crate) fn default_db_path(output_dir: &Path) -> PathBuf {
    output_dir.join("cards.sqlite")
}

pub(crate) fn manifest_dir(output_dir: &Path) -> PathBuf {
    output_dir.join("manifests")
}

/// Resolves configuration, runs the batch through `sink` and records the run
/// manifest. A lookup table that cannot be loaded stops the run before any
/// document is read.
pub(crate) fn run_batch(args: &PipelineArgs, sink: &mut dyn OutputSink) -> Result<BatchReport> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let settings = Settings::load(args.settings.as_deref())?;
    let prepared_by = settings.resolve_preparer(&args.prepared_by)?;

    let source: Box<dyn TextSource> = match args.input_format {
        InputFormat::Pdf => Box::new(PdftotextSource {
            max_pages: args.max_pages_per_doc,
            ..PdftotextSource::default()
        }),
        InputFormat::Text => Box::new(PlainTextSource),
    };

    let enricher = match &args.lookup_table {
        Some(path) => {
            let table = LookupTable::open(path).context("enrichment setup failed")?;
            let columns = settings
                .enrichment_columns
                .clone()
                .unwrap_or_else(RecordEnricher::default_columns);
            RecordEnricher::new(Box::new(table), columns)
        }
        None => RecordEnricher::disabled(),
    };

    let extractor = FieldExtractor::new(args.capture_mode)?;
    let mapper = match &args.issue_date {
        Some(date) => FormMapper::new(date.clone()),
        None => FormMapper::today(),
    };

    info!(
        run_id = %run_id,
        input_dir = %args.input_dir.display(),
        prepared_by = %prepared_by,
        capture_mode = extractor.mode().as_str(),
        enrichment = %enricher.source_description().unwrap_or_else(|| "off".to_string()),
        "starting run"
    );

    let runner = BatchRunner {
        source: source.as_ref(),
        extractor: &extractor,
        enricher: &enricher,
        mapper: &mapper,
    };
    let report = runner.process_all(&args.input_dir, &prepared_by, sink)?;

    let manifest = BatchRunManifest {
        manifest_version: 1,
        run_id,
        mode: sink.mode().to_string(),
        started_at,
        finished_at: now_utc_string(),
        input_dir: args.input_dir.display().to_string(),
        prepared_by,
        enrichment_source: enricher.source_description(),
        input_count: report.summary.success + report.summary.failed,
        success: report.summary.success,
        failed: report.summary.failed,
        failures: report.summary.failures.clone(),
        inputs: report.inputs.clone(),
        outputs: report.outputs.clone(),
    };
    let manifest_path = manifest_dir(&args.output_dir).join(format!(
        "{}_run_{}.json",
        sink.mode(),
        utc_compact_string(started_ts)
    ));
    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote run manifest");

    info!(
        success = report.summary.success,
        failed = report.summary.failed,
        "run summary"
    );

    Ok(report)
}

pub(crate) fn latest_manifest(output_dir: &Path) -> Result<Option<BatchRunManifest>> {
    let dir = manifest_dir(output_dir);
    if !dir.exists() {
        return Ok(None);
    }

    let mut candidates = Vec::new();
    for entry in fs::read_dir(&dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            let modified = entry
                .metadata()
                .and_then(|metadata| metadata.modified())
                .with_context(|| format!("failed to inspect {}", path.display()))?;
            candidates.push((modified, path));
        }
    }

    let Some((_, path)) = candidates.into_iter().max_by_key(|(modified, _)| *modified) else {
        return Ok(None);
    };

    let raw = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let manifest = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(manifest))
}
