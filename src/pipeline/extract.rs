use anyhow::{Context, Result};
use regex::Regex;

use crate::cli::CaptureMode;
use crate::model::{ExtractedRecord, ParameterReading, PhysicalParameter, RecordField};
use crate::util::condense_whitespace;

/// Labels recognised in `Label : value` lines. Entries without a field only
/// bound the value of the label before them on the same line.
const FIELD_LABELS: &[(Option<RecordField>, &str)] = &[
    (Some(RecordField::CardNo), r"Card\s+No\.?"),
    (
        Some(RecordField::ClientArticleIndex),
        r"Client(?:'|’)?s?\s+article\s+index",
    ),
    (Some(RecordField::ArticleIndex), r"Article\s+index"),
    (Some(RecordField::ArticleDescription), r"Article\s+description"),
    (Some(RecordField::ProductStructure), r"Product\s+structure"),
    (Some(RecordField::StructureThickness), r"Structure\s+thickness"),
    (
        Some(RecordField::StructureDescription),
        r"Structure\s+description",
    ),
    (
        Some(RecordField::ChemicalComposition),
        r"Chemical\s+composition",
    ),
    (Some(RecordField::PrintType), r"Print\s+type"),
    (Some(RecordField::NumberOfColours), r"Number\s+of\s+colou?rs"),
    (
        Some(RecordField::LacquerType),
        r"Solid\s*/\s*Lacquer|Lacquer(?:\s+type)?",
    ),
    (Some(RecordField::WindingCode), r"Winding\s+code"),
    (
        Some(RecordField::CoreIdentifier),
        r"Core\s+(?:type|identifier|id)",
    ),
    (Some(RecordField::ExternalDiameter), r"External\s+diameter"),
    (Some(RecordField::CoreWidth), r"Width\s+of\s+core|Core\s+width"),
    (
        Some(RecordField::CoreExtension),
        r"Core\s+(?:submission|extension)",
    ),
    (None, r"Date"),
    (None, r"Reels(?:\s+(?:on|per)\s+pall?ett?e?)?"),
    (None, r"Pall?ett?e?(?:\s+type)?"),
];

const PARAMETER_ANCHORS: &[(PhysicalParameter, &str)] = &[
    (
        PhysicalParameter::Weight,
        r"(?i)\b(?:Gramatur[ae]?\s*/\s*Weight|Gramatur[ae]?|Weight)\b",
    ),
    (PhysicalParameter::Otr, r"(?i)\bOTR\b"),
    (PhysicalParameter::Wvtr, r"(?i)\bWVTR\b"),
    (
        PhysicalParameter::Thickness,
        r"(?i)(?:\bGrub(?:\.|ość)\s*/\s*Thickness|\bThickness)\b",
    ),
];

/// Test method codes (`PN-81/P 50129`, `DIN 53380`, `PN-ISO 4593`) that sit
/// between a row label and its values.
const METHOD_CODE: &str = r"^[\s|]*[A-Z]{2,}[A-Za-z]*(?:[-/.\s]?[A-Z][A-Za-z]*)*(?:[-\s]?\d+(?:[-/.:]\d+)*)?(?:[-/.\s]?[A-Z][A-Za-z]*(?:[-/.\s]?[A-Z][A-Za-z]*)*[-\s]?\d+(?:[-/.:]\d+)*)*";

const NUMBER: &str = r"\d+(?:[.,]\d+)?";

/// Characters that mark a value as continuing on the next line.
const JOINERS: [char; 6] = [',', '/', '-', '&', '(', '+'];

#[derive(Debug, Clone, Copy)]
struct LabelSpan {
    start: usize,
    end: usize,
    target: Option<RecordField>,
}

pub struct FieldExtractor {
    labels: Regex,
    targets: Vec<Option<RecordField>>,
    anchors: Vec<(PhysicalParameter, Regex)>,
    method_code: Regex,
    tolerance_row: Regex,
    symmetric_row: Regex,
    bare_number: Regex,
    mode: CaptureMode,
}

impl FieldExtractor {
    pub fn new(mode: CaptureMode) -> Result<Self> {
        let alternatives = FIELD_LABELS
            .iter()
            .map(|(_, label)| format!("({label})"))
            .collect::<Vec<String>>()
            .join("|");
        let labels = Regex::new(&format!(r"(?i)\b(?:{alternatives})\s*:"))
            .context("failed to compile field label regex")?;

        let mut anchors = Vec::with_capacity(PARAMETER_ANCHORS.len());
        for (parameter, pattern) in PARAMETER_ANCHORS {
            let anchor = Regex::new(pattern).with_context(|| {
                format!("failed to compile {} anchor regex", parameter.as_str())
            })?;
            anchors.push((*parameter, anchor));
        }

        Ok(Self {
            labels,
            targets: FIELD_LABELS.iter().map(|(target, _)| *target).collect(),
            anchors,
            method_code: Regex::new(METHOD_CODE).context("failed to compile method code regex")?,
            tolerance_row: Regex::new(&format!(
                r"(?:^|[\s|])({NUMBER})[\s|]+[-−±]?\s?({NUMBER})[\s|]+[+±]?\s?({NUMBER})[\s|]+([^\s|\d][^|]*?)\s*(?:\||$)"
            ))
            .context("failed to compile tolerance row regex")?,
            symmetric_row: Regex::new(&format!(
                r"(?:^|[\s|])({NUMBER})[\s|]*±\s?({NUMBER})[\s|]+([^\s|\d][^|]*?)\s*(?:\||$)"
            ))
            .context("failed to compile symmetric tolerance regex")?,
            bare_number: Regex::new(&format!(r"(?:^|[\s|])({NUMBER})(?:[\s|]|$)"))
                .context("failed to compile bare number regex")?,
            mode,
        })
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    /// Builds a record from rendered document text. Labels that are not found
    /// leave their field empty.
    pub fn extract(&self, raw_text: &str) -> ExtractedRecord {
        let lines = raw_text.lines().collect::<Vec<&str>>();
        let mut record = ExtractedRecord::default();

        let field_lines = self.extract_labeled_fields(&lines, &mut record);

        for (parameter, anchor) in &self.anchors {
            if let Some(reading) = self.extract_parameter(&lines, &field_lines, anchor) {
                *record.parameter_mut(*parameter) = reading;
            }
        }

        record
    }

    fn label_spans(&self, line: &str) -> Vec<LabelSpan> {
        self.labels
            .captures_iter(line)
            .filter_map(|captures| {
                let whole = captures.get(0)?;
                let group = (1..captures.len()).find(|index| captures.get(*index).is_some())?;
                Some(LabelSpan {
                    start: whole.start(),
                    end: whole.end(),
                    target: self.targets.get(group - 1).copied().flatten(),
                })
            })
            .collect()
    }

    /// Fills labeled fields and returns, per line, whether the line belongs to
    /// a field (its label line or a stitched continuation).
    fn extract_labeled_fields(&self, lines: &[&str], record: &mut ExtractedRecord) -> Vec<bool> {
        let mut field_lines = vec![false; lines.len()];

        for (line_index, line) in lines.iter().enumerate() {
            let spans = self.label_spans(line);
            if !spans.is_empty() {
                field_lines[line_index] = true;
            }

            for (span_index, span) in spans.iter().enumerate() {
                let Some(field) = span.target else {
                    continue;
                };
                if !record.field(field).is_empty() {
                    continue;
                }

                let value_end = spans
                    .get(span_index + 1)
                    .map(|next| next.start)
                    .unwrap_or(line.len());
                let value = clean_value(&line[span.end..value_end]);
                if value.is_empty() {
                    continue;
                }

                let value = if span_index + 1 == spans.len() {
                    let (value, stitched) =
                        self.stitch_continuation(&lines[line_index + 1..], value);
                    for covered in &mut field_lines[line_index + 1..line_index + 1 + stitched] {
                        *covered = true;
                    }
                    value
                } else {
                    value
                };
                *record.field_mut(field) = value;
            }
        }

        field_lines
    }

    /// Returns the stitched value and the number of lines appended to it.
    fn stitch_continuation(&self, following: &[&str], mut value: String) -> (String, usize) {
        let mut stitched = 0usize;
        for line in following {
            let trimmed = line.trim();
            if trimmed.is_empty() || self.is_structural_line(trimmed) {
                break;
            }

            let continues = trimmed.chars().next().is_some_and(char::is_lowercase)
                || value.ends_with(&JOINERS[..]);
            if !continues {
                break;
            }

            value.push(' ');
            value.push_str(trimmed);
            stitched += 1;
        }

        (clean_value(&value), stitched)
    }

    /// A line holding a field label, or a table row starting with a parameter
    /// row label.
    fn is_structural_line(&self, line: &str) -> bool {
        let row = line.trim_start_matches(|character: char| {
            character.is_whitespace() || character == '|'
        });
        self.labels.is_match(line)
            || self
                .anchors
                .iter()
                .any(|(_, anchor)| anchor.find(row).is_some_and(|found| found.start() == 0))
    }

    fn extract_parameter(
        &self,
        lines: &[&str],
        field_lines: &[bool],
        anchor: &Regex,
    ) -> Option<ParameterReading> {
        for (line_index, line) in lines.iter().enumerate() {
            if field_lines[line_index] {
                continue;
            }

            for found in anchor.find_iter(line) {
                let rest = &line[found.end()..];
                if rest.trim_start().starts_with(':') {
                    continue;
                }

                if let Some(reading) = self.read_parameter_row(rest, &lines[line_index + 1..]) {
                    return Some(reading);
                }
            }
        }

        None
    }

    fn read_parameter_row(&self, rest: &str, following: &[&str]) -> Option<ParameterReading> {
        let rest = self.skip_method_code(rest);

        if matches!(self.mode, CaptureMode::WithTolerance | CaptureMode::Auto) {
            if let Some(reading) = self.tolerance_reading(rest) {
                return Some(reading);
            }
            if matches!(self.mode, CaptureMode::WithTolerance) {
                return None;
            }
        }

        let value = self.first_bare_number(rest).or_else(|| {
            let next = following.iter().find(|line| !line.trim().is_empty())?;
            if self.is_structural_line(next) {
                return None;
            }
            self.first_bare_number(self.skip_method_code(next))
        })?;

        Some(ParameterReading {
            value,
            ..ParameterReading::default()
        })
    }

    fn skip_method_code<'t>(&self, text: &'t str) -> &'t str {
        match self.method_code.find(text) {
            Some(found) => &text[found.end()..],
            None => text,
        }
    }

    /// Reads `value minus plus unit`, or `value ±deviation unit`. The unit
    /// runs to the end of its cell.
    fn tolerance_reading(&self, text: &str) -> Option<ParameterReading> {
        if let Some(captures) = self.tolerance_row.captures(text) {
            return Some(ParameterReading {
                value: normalize_decimal(&captures[1]),
                minus: normalize_decimal(&captures[2]),
                plus: normalize_decimal(&captures[3]),
                unit: condense_whitespace(&captures[4]),
            });
        }

        let captures = self.symmetric_row.captures(text)?;
        let deviation = normalize_decimal(&captures[2]);
        Some(ParameterReading {
            value: normalize_decimal(&captures[1]),
            minus: deviation.clone(),
            plus: deviation,
            unit: condense_whitespace(&captures[3]),
        })
    }

    fn first_bare_number(&self, text: &str) -> Option<String> {
        self.bare_number
            .captures(text)
            .map(|captures| normalize_decimal(&captures[1]))
    }
}

/// Accepts `,` or `.` as the decimal separator and returns the value with `.`.
pub fn normalize_decimal(raw: &str) -> String {
    raw.trim().replace(',', ".")
}

fn clean_value(raw: &str) -> String {
    condense_whitespace(raw.trim_matches(|character: char| {
        character.is_whitespace() || character == '|'
    }))
}
