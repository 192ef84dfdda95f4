use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use calamine::{Reader, open_workbook_auto};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::model::{EnrichmentColumn, ExtractedRecord, MergePolicy, RecordField};

/// One spreadsheet row keyed by column header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupRow {
    cells: BTreeMap<String, String>,
}

impl LookupRow {
    pub fn new<I, K, V>(cells: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            cells: cells
                .into_iter()
                .map(|(column, value)| (column.into(), value.into()))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    pub fn contains_value(&self, key: &str) -> bool {
        self.cells.values().any(|value| value.trim() == key)
    }
}

pub trait LookupSource {
    fn describe(&self) -> String;

    /// First row, in table order, holding any of the keys as a whole cell.
    fn find_match(&self, candidate_keys: &[&str]) -> Option<&LookupRow>;
}

/// Workbook extensions read through calamine; any other file is read as CSV.
const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Supplementary spreadsheet rows, read from the first worksheet of a workbook
/// or from a CSV export.
#[derive(Debug, Clone)]
pub struct LookupTable {
    path: PathBuf,
    rows: Vec<LookupRow>,
}

impl LookupTable {
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        let grid = if is_workbook(path) {
            read_workbook(path)?
        } else {
            read_csv(path)?
        };
        let rows = rows_from_grid(path, grid)?;

        info!(path = %path.display(), rows = rows.len(), "loaded lookup table");

        Ok(Self {
            path: path.to_path_buf(),
            rows,
        })
    }

    #[cfg(test)]
    pub fn from_rows(path: impl Into<PathBuf>, rows: Vec<LookupRow>) -> Self {
        Self {
            path: path.into(),
            rows,
        }
    }
}

impl LookupSource for LookupTable {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn find_match(&self, candidate_keys: &[&str]) -> Option<&LookupRow> {
        let keys = candidate_keys
            .iter()
            .map(|key| key.trim())
            .filter(|key| !key.is_empty())
            .collect::<Vec<&str>>();
        if keys.is_empty() {
            return None;
        }

        self.rows
            .iter()
            .find(|row| keys.iter().any(|key| row.contains_value(key)))
    }
}

fn is_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            WORKBOOK_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Header row first, then data rows, every cell as text.
fn read_workbook(path: &Path) -> Result<Vec<Vec<String>>, PipelineError> {
    let mut workbook = open_workbook_auto(path).map_err(|err| {
        PipelineError::EnrichmentSource(format!("failed to open {}: {err}", path.display()))
    })?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| {
            PipelineError::EnrichmentSource(format!("{} has no worksheet", path.display()))
        })?
        .map_err(|err| {
            PipelineError::EnrichmentSource(format!(
                "failed to read first worksheet of {}: {err}",
                path.display()
            ))
        })?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect())
}

fn read_csv(path: &Path) -> Result<Vec<Vec<String>>, PipelineError> {
    let raw = fs::read_to_string(path).map_err(|err| {
        PipelineError::EnrichmentSource(format!("failed to read {}: {err}", path.display()))
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(&raw))
        .has_headers(false)
        .flexible(true)
        .from_reader(raw.as_bytes());

    let mut grid = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result.map_err(|err| {
            PipelineError::EnrichmentSource(format!(
                "malformed row {} in {}: {err}",
                index + 1,
                path.display()
            ))
        })?;
        grid.push(record.iter().map(str::to_owned).collect());
    }

    Ok(grid)
}

fn rows_from_grid(path: &Path, grid: Vec<Vec<String>>) -> Result<Vec<LookupRow>, PipelineError> {
    let mut lines = grid.into_iter();
    let headers = lines
        .next()
        .unwrap_or_default()
        .iter()
        .map(|header| header.trim().trim_start_matches('\u{feff}').to_owned())
        .collect::<Vec<String>>();

    if headers.iter().all(String::is_empty) {
        return Err(PipelineError::EnrichmentSource(format!(
            "{} contains no header row",
            path.display()
        )));
    }

    Ok(lines
        .map(|cells| {
            LookupRow::new(headers.iter().enumerate().map(|(column, header)| {
                (
                    header.clone(),
                    cells
                        .get(column)
                        .map(|cell| cell.trim())
                        .unwrap_or("")
                        .to_owned(),
                )
            }))
        })
        .collect())
}

fn sniff_delimiter(raw: &str) -> u8 {
    let header = raw.lines().next().unwrap_or_default();
    let semicolons = header.matches(';').count();
    let commas = header.matches(',').count();
    if semicolons > commas { b';' } else { b',' }
}

/// Merges allow-listed spreadsheet columns into extracted records.
pub struct RecordEnricher {
    source: Option<Box<dyn LookupSource>>,
    columns: Vec<EnrichmentColumn>,
}

impl RecordEnricher {
    pub fn disabled() -> Self {
        Self {
            source: None,
            columns: Vec::new(),
        }
    }

    pub fn new(source: Box<dyn LookupSource>, columns: Vec<EnrichmentColumn>) -> Self {
        Self {
            source: Some(source),
            columns,
        }
    }

    /// Every record field, read from a column of the same name, gap filling only.
    pub fn default_columns() -> Vec<EnrichmentColumn> {
        RecordField::ALL
            .iter()
            .map(|field| EnrichmentColumn {
                column: field.as_str().to_string(),
                field: *field,
                policy: MergePolicy::FillGaps,
            })
            .collect()
    }

    pub fn source_description(&self) -> Option<String> {
        self.source.as_ref().map(|source| source.describe())
    }

    pub fn enrich(&self, mut record: ExtractedRecord, file_stem: &str) -> ExtractedRecord {
        let Some(source) = &self.source else {
            return record;
        };

        let article_index = record.article_index.clone();
        let Some(row) = source.find_match(&[file_stem, article_index.as_str()]) else {
            debug!(file = %file_stem, "no lookup row matched");
            return record;
        };

        let changed = apply_row(&mut record, row, &self.columns)
            .iter()
            .map(|field| field.as_str())
            .collect::<Vec<&str>>()
            .join(",");
        info!(file = %file_stem, changed = %changed, "enriched record from lookup row");

        record
    }
}

fn apply_row(
    record: &mut ExtractedRecord,
    row: &LookupRow,
    columns: &[EnrichmentColumn],
) -> Vec<RecordField> {
    let mut changed = Vec::new();

    for column in columns {
        let Some(cell) = row.get(&column.column) else {
            continue;
        };
        let cell = cell.trim();
        if cell.is_empty() {
            continue;
        }

        let slot = record.field_mut(column.field);
        let writable = match column.policy {
            MergePolicy::FillGaps => slot.is_empty(),
            MergePolicy::Overwrite => slot.as_str() != cell,
        };
        if writable {
            *slot = cell.to_string();
            changed.push(column.field);
        }
    }

    changed
}
