use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use rust_xlsxwriter::Workbook;
use tracing::{info, warn};

use crate::cli::ExportFormat;
use crate::error::PipelineError;
use crate::model::{ExportRow, ExtractedRecord, FormRecord};
use crate::pipeline::batch::{InputDocument, OutputSink};
use crate::pipeline::form::{FormSink, fill_form};
use crate::pipeline::store::CardStore;
use crate::util::{ensure_directory, write_json_pretty};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Collects one flat row per document and writes the export files at the end
/// of the batch.
pub struct ExportSink {
    output_dir: PathBuf,
    format: ExportFormat,
    rows: Vec<ExportRow>,
}

impl ExportSink {
    pub fn new(output_dir: &Path, format: ExportFormat) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            format,
            rows: Vec::new(),
        }
    }

    pub fn rows(&self) -> &[ExportRow] {
        &self.rows
    }
}

impl OutputSink for ExportSink {
    fn mode(&self) -> &'static str {
        "export"
    }

    fn accept(
        &mut self,
        _document: &InputDocument,
        record: &ExtractedRecord,
        _form: &FormRecord,
    ) -> Result<(), PipelineError> {
        self.rows.push(ExportRow::from(record));
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<String>> {
        if self.rows.is_empty() {
            warn!("no records to export");
            return Ok(Vec::new());
        }

        ensure_directory(&self.output_dir)?;
        let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let mut outputs = Vec::new();

        if self.format.includes_csv() {
            let path = self.output_dir.join(format!("specifications_{stamp}.csv"));
            write_csv(&path, &self.rows)?;
            info!(path = %path.display(), rows = self.rows.len(), "wrote csv export");
            outputs.push(path.display().to_string());
        }

        if self.format.includes_excel() {
            let path = self.output_dir.join(format!("specifications_{stamp}.xlsx"));
            write_excel(&path, &self.rows)?;
            info!(path = %path.display(), rows = self.rows.len(), "wrote excel export");
            outputs.push(path.display().to_string());
        }

        if self.format.includes_json() {
            let path = self.output_dir.join(format!("specifications_{stamp}.json"));
            write_json_pretty(&path, &self.rows)?;
            info!(path = %path.display(), rows = self.rows.len(), "wrote json export");
            outputs.push(path.display().to_string());
        }

        Ok(outputs)
    }
}

fn write_csv(path: &Path, rows: &[ExportRow]) -> Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("failed to create csv file: {}", path.display()))?;
    // Spreadsheet applications need the BOM to detect UTF-8.
    file.write_all(UTF8_BOM)
        .with_context(|| format!("failed to write csv file: {}", path.display()))?;

    let mut writer = csv::Writer::from_writer(file);
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("failed to write csv row: {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush csv file: {}", path.display()))?;

    Ok(())
}

fn write_excel(path: &Path, rows: &[ExportRow]) -> Result<()> {
    let Some(first) = rows.first() else {
        return Ok(());
    };

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name("Specifications")
        .context("failed to name export worksheet")?;
    worksheet
        .serialize_headers(0, 0, first)
        .context("failed to write excel header row")?;
    for row in rows {
        worksheet
            .serialize(row)
            .with_context(|| format!("failed to write excel row: {}", path.display()))?;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed to save excel file: {}", path.display()))?;

    Ok(())
}

/// Enters each card into the form application and regenerates its document.
pub struct FormFillSink<S: FormSink> {
    form: S,
    outputs: Vec<String>,
}

impl<S: FormSink> FormFillSink<S> {
    pub fn new(form: S) -> Self {
        Self {
            form,
            outputs: Vec::new(),
        }
    }
}

impl<S: FormSink> OutputSink for FormFillSink<S> {
    fn mode(&self) -> &'static str {
        "fill"
    }

    fn accept(
        &mut self,
        document: &InputDocument,
        _record: &ExtractedRecord,
        form: &FormRecord,
    ) -> Result<(), PipelineError> {
        self.form.new_card()?;
        let writes = fill_form(&mut self.form, form)?;
        let output = self.form.regenerate(&document.stem)?;
        info!(file = %document.file_name, writes, output = %output.display(), "card filled");
        self.outputs.push(output.display().to_string());
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<String>> {
        Ok(std::mem::take(&mut self.outputs))
    }
}

/// Saves each card into the card store.
pub struct StoreSink {
    store: CardStore,
    keys: Vec<String>,
}

impl StoreSink {
    pub fn new(store: CardStore) -> Self {
        Self {
            store,
            keys: Vec::new(),
        }
    }

    pub fn store(&self) -> &CardStore {
        &self.store
    }
}

impl OutputSink for StoreSink {
    fn mode(&self) -> &'static str {
        "import"
    }

    fn accept(
        &mut self,
        document: &InputDocument,
        record: &ExtractedRecord,
        form: &FormRecord,
    ) -> Result<(), PipelineError> {
        let key = self
            .store
            .upsert_card(record, form, &document.sha256)
            .map_err(|err| PipelineError::Output(format!("{err:#}")))?;
        info!(file = %document.file_name, card_no = %key, "card saved");
        self.keys.push(key);
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<String>> {
        Ok(std::mem::take(&mut self.keys))
    }
}
