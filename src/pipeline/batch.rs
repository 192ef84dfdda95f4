use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::model::{BatchSummary, ExtractedRecord, FileFailure, FormRecord, InputDigest};
use crate::pipeline::enrich::RecordEnricher;
use crate::pipeline::extract::FieldExtractor;
use crate::pipeline::mapper::FormMapper;
use crate::pipeline::text_source::TextSource;
use crate::util::{file_stem_string, sha256_file};

#[derive(Debug, Clone)]
pub struct InputDocument {
    pub path: PathBuf,
    pub file_name: String,
    pub stem: String,
    pub sha256: String,
}

/// Destination of mapped cards for one output mode.
pub trait OutputSink {
    fn mode(&self) -> &'static str;

    fn accept(
        &mut self,
        document: &InputDocument,
        record: &ExtractedRecord,
        form: &FormRecord,
    ) -> Result<(), PipelineError>;

    /// Runs once after the last document; returns every output produced.
    fn finish(&mut self) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub summary: BatchSummary,
    pub inputs: Vec<InputDigest>,
    pub outputs: Vec<String>,
}

pub struct BatchRunner<'a> {
    pub source: &'a dyn TextSource,
    pub extractor: &'a FieldExtractor,
    pub enricher: &'a RecordEnricher,
    pub mapper: &'a FormMapper,
}

impl BatchRunner<'_> {
    /// Processes every matching file of `input_dir`. A failing document is
    /// logged and counted; only an unreadable directory aborts the batch.
    pub fn process_all(
        &self,
        input_dir: &Path,
        prepared_by: &str,
        sink: &mut dyn OutputSink,
    ) -> Result<BatchReport> {
        let paths = discover_inputs(input_dir, self.source.extension())?;
        info!(
            input_dir = %input_dir.display(),
            files = paths.len(),
            mode = sink.mode(),
            "starting batch"
        );
        if paths.is_empty() {
            warn!(
                input_dir = %input_dir.display(),
                extension = self.source.extension(),
                "no input documents found"
            );
        }

        let mut report = BatchReport::default();
        for path in paths {
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            info!(file = %file_name, "processing document");

            match self.process_file(&path, prepared_by, sink) {
                Ok(document) => {
                    report.summary.success += 1;
                    report.inputs.push(InputDigest {
                        filename: document.file_name,
                        sha256: document.sha256,
                    });
                }
                Err(err) => {
                    warn!(
                        file = %file_name,
                        kind = err.kind().as_str(),
                        error = %err,
                        "document failed"
                    );
                    report.summary.failed += 1;
                    report.summary.failures.push(FileFailure {
                        file: file_name,
                        kind: err.kind(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        report.outputs = sink.finish()?;
        info!(
            success = report.summary.success,
            failed = report.summary.failed,
            "batch finished"
        );

        Ok(report)
    }

    pub fn process_file(
        &self,
        path: &Path,
        prepared_by: &str,
        sink: &mut dyn OutputSink,
    ) -> Result<InputDocument, PipelineError> {
        let document = InputDocument {
            path: path.to_path_buf(),
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            stem: file_stem_string(path),
            sha256: sha256_file(path)
                .map_err(|err| PipelineError::text_source(path, format!("{err:#}")))?,
        };

        let record = self.extract_record(&document, prepared_by)?;
        let record = self.enricher.enrich(record, &document.stem);
        let form = self.mapper.map_to_form(&record);
        sink.accept(&document, &record, &form)?;

        Ok(document)
    }

    pub fn extract_record(
        &self,
        document: &InputDocument,
        prepared_by: &str,
    ) -> Result<ExtractedRecord, PipelineError> {
        let text = self.source.extract_text(&document.path)?;
        let mut record = self.extractor.extract(&text.text());
        record.source_file = document.file_name.clone();
        record.source_stem = document.stem.clone();
        record.prepared_by = prepared_by.to_string();
        Ok(record)
    }
}

pub fn discover_inputs(input_dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();

    let entries = fs::read_dir(input_dir)
        .with_context(|| format!("failed to read {}", input_dir.display()))?;

    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", input_dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(extension))
            .unwrap_or(false);

        if matches {
            inputs.push(path);
        }
    }

    inputs.sort();
    Ok(inputs)
}
