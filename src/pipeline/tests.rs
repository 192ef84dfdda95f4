use std::fs;
use std::path::{Path, PathBuf};

use super::*;
use crate::cli::{CaptureMode, ExportFormat};
use crate::error::{FailureKind, PipelineError};
use crate::model::{
    EnrichmentColumn, ExtractedRecord, FormRecord, MergePolicy, ParameterReading,
    PhysicalParameter, PrintDirection, PrintLayer, PrintSymmetry, PropertyRow, RecordField,
};
use crate::pipeline::batch::{InputDocument, discover_inputs};
use crate::pipeline::enrich::{LookupRow, LookupSource};
use crate::pipeline::extract::normalize_decimal;
use crate::pipeline::form::{FormSink, FormState, fill_form};
use crate::pipeline::mapper::split_print_type;

const SAMPLE_SHEET: &str = "\
PRODUCT TECHNICAL DATA SHEET
Card No : KW-1024            Date : 2024-03-11
Article index : ART-5531
Client's article index : CL-88-01
Article description : Laminate for ground coffee
  packaging, matt finish
Product structure : PET12/ALU7/PE70
Structure thickness : 89 µm
Structure description : reverse printed PET laminated
Chemical composition : polyester, aluminium, polyethylene

Parameter          Method          Unit        Value   -     +    Unit
Gramatur/Weight    PN-81/P 50129   g/m2        112,5   5,6   5,6  g/m2
OTR                DIN 53380       cm3/m2/24h  0,5     0     0,5  cm3/m2/24h
WVTR               DIN 53122       g/m2/24h    0.3     0     0.2  g/m2/24h
Grub./Thickness    PN-ISO 4593     µm          89      4     4    µm

Print type : sandwich printing/reverse/symmetrical
Number of colours : 6
Solid/Lacquer : matt lacquer
Winding code : W4
Core type : cardboard 76 mm
External diameter : max 400 mm    Reels on pallet : 16
Width of core : 320 mm
Core submission : 0-2 mm    Pallet type : EUR
";

fn extractor(mode: CaptureMode) -> FieldExtractor {
    FieldExtractor::new(mode).expect("extractor regexes should compile")
}

fn short_sheet(card_no: &str, article_index: &str) -> String {
    format!(
        "Card No : {card_no}\nArticle index : {article_index}\nPrint type : superficial/simple/asymmetrical\nOTR   DIN 53380   1,5   0,2   0,2   cm3/m2/24h\n"
    )
}

fn table(rows: Vec<LookupRow>) -> Box<dyn LookupSource> {
    Box::new(LookupTable::from_rows("lookup.csv", rows))
}

fn column(name: &str, field: RecordField, policy: MergePolicy) -> EnrichmentColumn {
    EnrichmentColumn {
        column: name.to_string(),
        field,
        policy,
    }
}

fn property(parameter: PhysicalParameter, value: &str, minus: &str, plus: &str) -> PropertyRow {
    PropertyRow {
        parameter,
        name: parameter.display_name().to_string(),
        method: parameter.default_method().to_string(),
        value: value.to_string(),
        minus: minus.to_string(),
        plus: plus.to_string(),
        unit: parameter.default_unit().to_string(),
    }
}

#[derive(Default)]
struct RecordingFormSink {
    cards: usize,
    fields: Vec<(String, String)>,
    properties: Vec<PropertyRow>,
    regenerated: Vec<String>,
    reject_card: Option<String>,
}

impl FormSink for RecordingFormSink {
    fn new_card(&mut self) -> Result<(), PipelineError> {
        self.cards += 1;
        Ok(())
    }

    fn fill_field(&mut self, name: &str, value: &str) -> Result<(), PipelineError> {
        if name == "Card no" && self.reject_card.as_deref() == Some(value) {
            return Err(PipelineError::FormInteraction(format!(
                "widget rejected {value}"
            )));
        }
        self.fields.push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn upsert_property(&mut self, row: &PropertyRow) -> Result<(), PipelineError> {
        self.properties.push(row.clone());
        Ok(())
    }

    fn regenerate(&mut self, output_stem: &str) -> Result<PathBuf, PipelineError> {
        self.regenerated.push(output_stem.to_string());
        Ok(PathBuf::from(format!("{output_stem}.pdf")))
    }
}

impl RecordingFormSink {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }
}

fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("fixture file should be written");
    path
}

#[test]
fn extract_reads_every_labeled_field_of_a_data_sheet() {
    let record = extractor(CaptureMode::Auto).extract(SAMPLE_SHEET);

    assert_eq!(record.card_no, "KW-1024");
    assert_eq!(record.article_index, "ART-5531");
    assert_eq!(record.client_article_index, "CL-88-01");
    assert_eq!(
        record.article_description,
        "Laminate for ground coffee packaging, matt finish"
    );
    assert_eq!(record.product_structure, "PET12/ALU7/PE70");
    assert_eq!(record.structure_thickness, "89 µm");
    assert_eq!(record.structure_description, "reverse printed PET laminated");
    assert_eq!(
        record.chemical_composition,
        "polyester, aluminium, polyethylene"
    );
    assert_eq!(record.print_type, "sandwich printing/reverse/symmetrical");
    assert_eq!(record.number_of_colours, "6");
    assert_eq!(record.lacquer_type, "matt lacquer");
    assert_eq!(record.winding_code, "W4");
    assert_eq!(record.core_identifier, "cardboard 76 mm");
    assert_eq!(record.external_diameter, "max 400 mm");
    assert_eq!(record.core_width, "320 mm");
    assert_eq!(record.core_extension, "0-2 mm");
}

#[test]
fn extract_reads_parameter_rows_with_tolerances() {
    let record = extractor(CaptureMode::Auto).extract(SAMPLE_SHEET);

    assert_eq!(
        record.weight,
        ParameterReading {
            value: "112.5".to_string(),
            minus: "5.6".to_string(),
            plus: "5.6".to_string(),
            unit: "g/m2".to_string(),
        }
    );
    assert_eq!(record.weight.numeric(), Some(112.5));
    assert_eq!(record.otr.value, "0.5");
    assert_eq!(record.otr.minus, "0");
    assert_eq!(record.otr.unit, "cm3/m2/24h");
    assert_eq!(record.wvtr.value, "0.3");
    assert_eq!(record.wvtr.plus, "0.2");
    assert_eq!(record.thickness.value, "89");
    assert_eq!(record.thickness.unit, "µm");
}

#[test]
fn extract_leaves_missing_labels_empty() {
    let record = extractor(CaptureMode::Auto).extract("Card No : 77\nReference sheet only\n");

    assert_eq!(record.card_no, "77");
    assert!(record.article_index.is_empty());
    assert!(record.print_type.is_empty());
    assert!(!record.weight.is_present());
    assert!(!record.thickness.is_present());
}

#[test]
fn extract_splits_labels_sharing_one_line() {
    let record = extractor(CaptureMode::Auto)
        .extract("Card No: 77 | Article index: A-1 | Client article index: C-2\n");

    assert_eq!(record.card_no, "77");
    assert_eq!(record.article_index, "A-1");
    assert_eq!(record.client_article_index, "C-2");
}

#[test]
fn extract_keeps_first_non_empty_occurrence() {
    let record = extractor(CaptureMode::Auto)
        .extract("Card No :\nCard No : 101\nCard No : 202\n");

    assert_eq!(record.card_no, "101");
}

#[test]
fn extract_collapses_whitespace_inside_values() {
    let record =
        extractor(CaptureMode::Auto).extract("Product structure :   PET 12   /  PE   50  \n");

    assert_eq!(record.product_structure, "PET 12 / PE 50");
}

#[test]
fn extract_stitches_values_ending_with_a_joiner() {
    let record = extractor(CaptureMode::Auto).extract("Chemical composition : PET, ALU,\nPE\n");

    assert_eq!(record.chemical_composition, "PET, ALU, PE");
}

#[test]
fn extract_does_not_stitch_capitalised_lines() {
    let record = extractor(CaptureMode::Auto).extract("Article description : Foil\nMade in EU\n");

    assert_eq!(record.article_description, "Foil");
}

#[test]
fn structure_thickness_label_is_not_the_thickness_parameter() {
    let record = extractor(CaptureMode::Auto).extract("Structure thickness : 85 µm\n");

    assert_eq!(record.structure_thickness, "85 µm");
    assert!(!record.thickness.is_present());
}

#[test]
fn decimal_separators_normalize_to_the_same_value() {
    assert_eq!(normalize_decimal("12,5"), "12.5");
    assert_eq!(normalize_decimal(" 12.5 "), "12.5");

    let comma = extractor(CaptureMode::FirstNumber).extract("OTR 12,5\n");
    let dot = extractor(CaptureMode::FirstNumber).extract("OTR 12.5\n");
    assert_eq!(comma.otr.numeric(), Some(12.5));
    assert_eq!(dot.otr.numeric(), Some(12.5));
}

#[test]
fn first_number_mode_reads_the_next_line_when_the_row_is_empty() {
    let record = extractor(CaptureMode::FirstNumber).extract("WVTR\n  3,4 g/m2/24h\n");

    assert_eq!(record.wvtr.value, "3.4");
    assert!(record.wvtr.minus.is_empty());
}

#[test]
fn tolerance_mode_requires_a_full_row() {
    let record = extractor(CaptureMode::WithTolerance).extract("OTR 12,5\n");
    assert!(!record.otr.is_present());

    let record = extractor(CaptureMode::Auto).extract("OTR 12,5\n");
    assert_eq!(record.otr.value, "12.5");
}

#[test]
fn first_number_mode_skips_method_codes_in_table_rows() {
    let record = extractor(CaptureMode::FirstNumber).extract(SAMPLE_SHEET);

    assert_eq!(record.weight.value, "112.5");
    assert_eq!(record.otr.value, "0.5");
    assert_eq!(record.wvtr.value, "0.3");
    assert_eq!(record.thickness.value, "89");
    assert!(record.weight.minus.is_empty());
}

#[test]
fn auto_mode_skips_method_codes_when_the_row_has_no_tolerances() {
    let record = extractor(CaptureMode::Auto).extract(
        "Gramatur/Weight PN-81/P 50129 g/m2 112,5\nOTR DIN 53380 cm3/m2/24h 0,5\nThickness DIN EN ISO 2286-3 42\n",
    );

    assert_eq!(record.weight.value, "112.5");
    assert_eq!(record.otr.value, "0.5");
    assert_eq!(record.thickness.value, "42");
}

#[test]
fn parameter_words_inside_labeled_values_are_not_rows() {
    let record = extractor(CaptureMode::Auto).extract(
        "Article description : barrier film, weight 40 g/m2 class\nGramatur/Weight  PN-81/P 50129  g/m2  112,5  5,6  5,6  g/m2\n",
    );

    assert_eq!(
        record.article_description,
        "barrier film, weight 40 g/m2 class"
    );
    assert_eq!(record.weight.value, "112.5");
    assert_eq!(record.weight.unit, "g/m2");
}

#[test]
fn parameter_words_inside_stitched_continuations_are_not_rows() {
    let record = extractor(CaptureMode::Auto).extract(
        "Article description : barrier film,\n  and weight 40 g/m2 class\nGramatur/Weight  PN-81/P 50129  g/m2  112,5  5,6  5,6  g/m2\n",
    );

    assert_eq!(
        record.article_description,
        "barrier film, and weight 40 g/m2 class"
    );
    assert_eq!(record.weight.value, "112.5");
    assert_eq!(record.weight.minus, "5.6");
}

#[test]
fn tolerance_rows_accept_signed_and_symmetric_deviations() {
    let signed = extractor(CaptureMode::WithTolerance)
        .extract("Gramatur/Weight  112,5  -5,6  +5,6  g/m2\n");
    assert_eq!(
        signed.weight,
        ParameterReading {
            value: "112.5".to_string(),
            minus: "5.6".to_string(),
            plus: "5.6".to_string(),
            unit: "g/m2".to_string(),
        }
    );

    let symmetric = extractor(CaptureMode::WithTolerance).extract("WVTR  3,4 ± 0,2  g/m2/24h\n");
    assert_eq!(symmetric.wvtr.value, "3.4");
    assert_eq!(symmetric.wvtr.minus, "0.2");
    assert_eq!(symmetric.wvtr.plus, "0.2");
    assert_eq!(symmetric.wvtr.unit, "g/m2/24h");
}

#[test]
fn tolerance_rows_keep_units_containing_spaces() {
    let record = extractor(CaptureMode::WithTolerance)
        .extract("| OTR | DIN 53380 | 0,5 | 0 | 0,5 | cm3/m2 24h | after lamination |\n");

    assert_eq!(record.otr.value, "0.5");
    assert_eq!(record.otr.minus, "0");
    assert_eq!(record.otr.plus, "0.5");
    assert_eq!(record.otr.unit, "cm3/m2 24h");

    let plain = extractor(CaptureMode::Auto).extract("OTR  DIN 53380  1,5  0,2  0,3  cm3/m2 24h\n");
    assert_eq!(plain.otr.minus, "0.2");
    assert_eq!(plain.otr.plus, "0.3");
    assert_eq!(plain.otr.unit, "cm3/m2 24h");
}

#[test]
fn print_type_splits_into_positional_parts() {
    let parts = split_print_type("sandwich printing/reverse/symmetrical");
    assert_eq!(parts.layer, Some(PrintLayer::SandwichPrinting));
    assert_eq!(parts.direction, Some(PrintDirection::Reverse));
    assert_eq!(parts.symmetry, Some(PrintSymmetry::Symmetrical));

    let parts = split_print_type("foo/reverse/bar");
    assert_eq!(parts.layer, None);
    assert_eq!(parts.direction, Some(PrintDirection::Reverse));
    assert_eq!(parts.symmetry, None);

    let parts = split_print_type("sandwich printing");
    assert_eq!(parts.layer, Some(PrintLayer::SandwichPrinting));
    assert_eq!(parts.direction, None);
    assert_eq!(parts.symmetry, None);

    let parts = split_print_type(" Superficial / Simple / Asymmetrical ");
    assert_eq!(parts.layer, Some(PrintLayer::Superficial));
    assert_eq!(parts.direction, Some(PrintDirection::Simple));
    assert_eq!(parts.symmetry, Some(PrintSymmetry::Asymmetrical));
}

#[test]
fn disabled_enricher_returns_the_record_unchanged() {
    let record = extractor(CaptureMode::Auto).extract(SAMPLE_SHEET);
    let enriched = RecordEnricher::disabled().enrich(record.clone(), "KW-1024");

    assert_eq!(enriched, record);
}

#[test]
fn enricher_without_matching_row_returns_the_record_unchanged() {
    let record = extractor(CaptureMode::Auto).extract(SAMPLE_SHEET);
    let enricher = RecordEnricher::new(
        table(vec![LookupRow::new([("File", "other"), ("Lacquer", "gloss")])]),
        vec![column("Lacquer", RecordField::LacquerType, MergePolicy::Overwrite)],
    );

    assert_eq!(enricher.enrich(record.clone(), "KW-1024"), record);
}

#[test]
fn enricher_changes_only_allow_listed_fields() {
    let mut record = extractor(CaptureMode::Auto).extract(SAMPLE_SHEET);
    record.client_article_index.clear();

    let enricher = RecordEnricher::new(
        table(vec![LookupRow::new([
            ("File", "sheet-1024"),
            ("Client index", "CL-9"),
            ("Lacquer", "gloss lacquer"),
            ("Print type", "superficial"),
        ])]),
        vec![
            column(
                "Client index",
                RecordField::ClientArticleIndex,
                MergePolicy::FillGaps,
            ),
            column("Lacquer", RecordField::LacquerType, MergePolicy::Overwrite),
        ],
    );

    let enriched = enricher.enrich(record.clone(), "sheet-1024");

    assert_eq!(enriched.client_article_index, "CL-9");
    assert_eq!(enriched.lacquer_type, "gloss lacquer");
    assert_eq!(enriched.print_type, record.print_type);
    assert_eq!(enriched.card_no, record.card_no);
    assert_eq!(enriched.weight, record.weight);
}

#[test]
fn enricher_fill_gaps_keeps_extracted_values_and_ignores_blank_cells() {
    let record = extractor(CaptureMode::Auto).extract(SAMPLE_SHEET);
    let enricher = RecordEnricher::new(
        table(vec![LookupRow::new([
            ("Article", "ART-5531"),
            ("Client index", "CL-9"),
            ("Winding", ""),
        ])]),
        vec![
            column(
                "Client index",
                RecordField::ClientArticleIndex,
                MergePolicy::FillGaps,
            ),
            column("Winding", RecordField::WindingCode, MergePolicy::Overwrite),
        ],
    );

    let enriched = enricher.enrich(record, "unrelated-stem");

    assert_eq!(enriched.client_article_index, "CL-88-01");
    assert_eq!(enriched.winding_code, "W4");
}

#[test]
fn enricher_uses_the_first_matching_row() {
    let record = ExtractedRecord {
        article_index: "ART-1".to_string(),
        ..ExtractedRecord::default()
    };
    let enricher = RecordEnricher::new(
        table(vec![
            LookupRow::new([("Article", "ART-1"), ("Colours", "4")]),
            LookupRow::new([("Article", "ART-1"), ("Colours", "8")]),
        ]),
        vec![column(
            "Colours",
            RecordField::NumberOfColours,
            MergePolicy::FillGaps,
        )],
    );

    assert_eq!(enricher.enrich(record, "").number_of_colours, "4");
}

#[test]
fn enricher_never_matches_on_empty_keys() {
    let enricher = RecordEnricher::new(
        table(vec![LookupRow::new([("Article", ""), ("Colours", "4")])]),
        vec![column(
            "Colours",
            RecordField::NumberOfColours,
            MergePolicy::FillGaps,
        )],
    );

    let enriched = enricher.enrich(ExtractedRecord::default(), "  ");
    assert!(enriched.number_of_colours.is_empty());
}

#[test]
fn lookup_table_reads_semicolon_csv_exports() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let path = write_file(
        dir.path(),
        "lookup.csv",
        "\u{feff}File;Client index;Lacquer\nKW-1024;CL-9;gloss\nKW-2048; ;matt\n".as_bytes(),
    );

    let table = LookupTable::open(&path).expect("lookup table should load");
    assert_eq!(table.describe(), path.display().to_string());

    let row = table.find_match(&["KW-1024"]).expect("row should match");
    assert_eq!(row.get("File"), Some("KW-1024"));
    assert_eq!(row.get("Client index"), Some("CL-9"));

    let row = table.find_match(&[" KW-2048 "]).expect("row should match");
    assert_eq!(row.get("Client index"), Some(""));
    assert!(table.find_match(&["KW-4096"]).is_none());
}

#[test]
fn lookup_table_fails_fast_when_missing() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let err = LookupTable::open(&dir.path().join("missing.csv"))
        .expect_err("missing table should fail");

    assert_eq!(err.kind(), FailureKind::EnrichmentSource);
}

#[test]
fn lookup_table_reads_the_first_worksheet_of_a_workbook() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let path = dir.path().join("lookup.xlsx");

    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "File").expect("header cell");
    sheet.write_string(0, 1, "Number of colours").expect("header cell");
    sheet.write_string(0, 2, "Lacquer").expect("header cell");
    sheet.write_string(1, 0, "KW-1024").expect("data cell");
    sheet.write_number(1, 1, 6.0).expect("data cell");
    sheet.write_string(1, 2, " gloss ").expect("data cell");
    sheet.write_string(2, 0, "KW-2048").expect("data cell");
    workbook.save(&path).expect("workbook should be saved");

    let table = LookupTable::open(&path).expect("workbook should load");
    let row = table.find_match(&["KW-1024"]).expect("row should match");
    assert_eq!(row.get("Number of colours"), Some("6"));
    assert_eq!(row.get("Lacquer"), Some("gloss"));

    let row = table.find_match(&["KW-2048"]).expect("row should match");
    assert_eq!(row.get("Lacquer"), Some(""));
}

#[test]
fn lookup_table_rejects_an_unreadable_workbook() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let path = write_file(dir.path(), "lookup.xlsx", b"File;Lacquer\nKW-1024;gloss\n");

    let err = LookupTable::open(&path).expect_err("a CSV named .xlsx is not a workbook");
    assert_eq!(err.kind(), FailureKind::EnrichmentSource);
}

#[test]
fn mapper_carries_data_sheet_values_and_leaves_the_rest_empty() {
    let mut record = extractor(CaptureMode::Auto).extract(SAMPLE_SHEET);
    record.prepared_by = "Anna Nowak".to_string();
    record.thickness = ParameterReading::default();

    let form = FormMapper::new("2024-05-01").map_to_form(&record);

    assert_eq!(form.article.card_no, "KW-1024");
    assert_eq!(form.article.issue_date, "2024-05-01");
    assert_eq!(form.article.index, "ART-5531");
    assert_eq!(form.article.client_index, "CL-88-01");
    assert_eq!(form.article.structure, "PET12/ALU7/PE70");
    assert_eq!(form.article.structure_thickness, "89 µm");
    assert_eq!(form.print.layer, Some(PrintLayer::SandwichPrinting));
    assert_eq!(form.print.colour_count, "6");
    assert_eq!(form.print.lacquer, "matt lacquer");
    assert_eq!(form.packing.inner_core, "cardboard 76 mm");
    assert_eq!(form.packing.external_diameter, "max 400 mm");
    assert_eq!(form.packing.core_extension, "0-2 mm");
    assert_eq!(form.signatures.prepared_by, "Anna Nowak");
    assert_eq!(form.signatures.prepared_on, "2024-05-01");

    assert_eq!(form.producer, Default::default());
    assert_eq!(form.application, Default::default());
    assert!(form.article.client_specification.is_empty());
    assert!(form.print.adhesion.is_empty());
    assert!(form.print.colour_scheme.is_empty());
    assert!(form.packing.reel_weight.is_empty());
    assert!(form.packing.reels_per_pallet.is_empty());
    assert!(form.packing.pallet_type.is_empty());
    assert!(form.signatures.approved_by.is_empty());
    assert!(form.signatures.approved_on.is_empty());

    assert_eq!(form.properties.len(), 3);
    assert!(form.property(PhysicalParameter::Thickness).is_none());
    let weight = form
        .property(PhysicalParameter::Weight)
        .expect("weight row should exist");
    assert_eq!(weight.name, "Weight");
    assert_eq!(weight.method, "PN-81/P 50129");
    assert_eq!(weight.value, "112.5");
    assert_eq!(weight.unit, "g/m2");
}

#[test]
fn mapper_uses_default_unit_when_the_sheet_has_none() {
    let record = ExtractedRecord {
        wvtr: ParameterReading {
            value: "3.4".to_string(),
            ..ParameterReading::default()
        },
        ..ExtractedRecord::default()
    };

    let form = FormMapper::new("2024-05-01").map_to_form(&record);
    let wvtr = form
        .property(PhysicalParameter::Wvtr)
        .expect("wvtr row should exist");
    assert_eq!(wvtr.name, "WVTR (H₂O barrier)");
    assert_eq!(wvtr.method, "DIN 53122");
    assert_eq!(wvtr.unit, "g/m²/24h");
}

#[test]
fn fill_form_writes_present_slots_and_property_rows() {
    let record = extractor(CaptureMode::Auto).extract(SAMPLE_SHEET);
    let form = FormMapper::new("2024-05-01").map_to_form(&record);
    let mut sink = RecordingFormSink::default();

    let writes = fill_form(&mut sink, &form).expect("form should be filled");

    assert_eq!(writes, sink.fields.len() + sink.properties.len());
    assert_eq!(sink.field("Card no"), Some("KW-1024"));
    assert_eq!(sink.field("Print layer"), Some("sandwich printing"));
    assert_eq!(sink.field("Print direction"), Some("reverse"));
    assert_eq!(sink.field("Print symmetry"), Some("symmetrical"));
    assert_eq!(sink.field("Inner core"), Some("cardboard 76 mm"));
    assert_eq!(sink.field("Prepared by"), None);
    assert_eq!(sink.properties.len(), 4);
}

#[test]
fn form_state_sink_updates_existing_rows_and_appends_new_ones() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let template = FormState {
        fields: [("Producer".to_string(), "Acme Films".to_string())]
            .into_iter()
            .collect(),
        properties: vec![crate::pipeline::form::FormPropertyRow {
            name: "Weight".to_string(),
            value: "1".to_string(),
            minus: "0".to_string(),
            plus: "0".to_string(),
            ..Default::default()
        }],
    };
    let template_path = dir.path().join("template.json");
    crate::util::write_json_pretty(&template_path, &template).expect("template should be saved");
    let state_path = dir.path().join("state.json");

    let mut sink = FormStateSink::open(&state_path, Some(template_path.as_path()), dir.path(), None)
        .expect("form sink should open");
    sink.new_card().expect("new card");
    sink.fill_field("Card no", "KW-1024").expect("field write");
    sink.upsert_property(&property(PhysicalParameter::Weight, "112.5", "", "5.6"))
        .expect("weight row");
    sink.upsert_property(&property(PhysicalParameter::Otr, "0.5", "0", "0.5"))
        .expect("otr row");

    let output = sink.regenerate("KW-1024").expect("state should be saved");
    assert_eq!(output, state_path);

    let state = FormState::load(&state_path).expect("state should load");
    assert_eq!(state.fields.get("Producer").map(String::as_str), Some("Acme Films"));
    assert_eq!(state.fields.get("Card no").map(String::as_str), Some("KW-1024"));
    assert_eq!(state.properties.len(), 2);

    let weight = &state.properties[0];
    assert_eq!(weight.value, "112.5");
    assert_eq!(weight.minus, "0");
    assert_eq!(weight.plus, "5.6");
    assert_eq!(weight.unit, "g/m²");
    assert_eq!(weight.method, "PN-81/P 50129");
    assert_eq!(state.properties[1].name, "OTR (O₂ barrier)");

    sink.new_card().expect("new card");
    sink.regenerate("blank").expect("state should be saved");
    let state = FormState::load(&state_path).expect("state should load");
    assert_eq!(state, template);
}

#[test]
fn form_state_sink_rejects_unnamed_fields() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let mut sink = FormStateSink::open(&dir.path().join("state.json"), None, dir.path(), None)
        .expect("form sink should open");

    let err = sink.fill_field("  ", "value").expect_err("empty name should fail");
    assert_eq!(err.kind(), FailureKind::FormInteraction);
}

#[cfg(unix)]
#[test]
fn form_state_sink_runs_the_regenerate_command() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let state_path = dir.path().join("state.json");

    let mut sink = FormStateSink::open(
        &state_path,
        None,
        dir.path(),
        Some("cp {form} {output}".to_string()),
    )
    .expect("form sink should open");
    let output = sink.regenerate("KW-1024").expect("document should be produced");
    assert_eq!(output, dir.path().join("KW-1024.pdf"));
    assert!(output.exists());

    let mut failing = FormStateSink::open(&state_path, None, dir.path(), Some("false".to_string()))
        .expect("form sink should open");
    let err = failing.regenerate("KW-2048").expect_err("failing command should fail");
    assert_eq!(err.kind(), FailureKind::FormInteraction);

    let mut silent = FormStateSink::open(&state_path, None, dir.path(), Some("true".to_string()))
        .expect("form sink should open");
    let err = silent.regenerate("KW-4096").expect_err("missing output should fail");
    assert_eq!(err.kind(), FailureKind::FormInteraction);
}

#[cfg(unix)]
#[test]
fn form_state_sink_ignores_documents_left_by_earlier_runs() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let state_path = dir.path().join("state.json");
    let stale = write_file(dir.path(), "KW-1024.pdf", b"%PDF from an earlier card");

    let mut silent = FormStateSink::open(&state_path, None, dir.path(), Some("true".to_string()))
        .expect("form sink should open");
    let err = silent
        .regenerate("KW-1024")
        .expect_err("a stale document is not a regenerated one");
    assert_eq!(err.kind(), FailureKind::FormInteraction);
    assert!(!stale.exists());

    let mut copying = FormStateSink::open(
        &state_path,
        None,
        dir.path(),
        Some("cp {form} {output}".to_string()),
    )
    .expect("form sink should open");
    let output = copying.regenerate("KW-1024").expect("document should be produced");
    let contents = fs::read_to_string(&output).expect("document should be readable");
    assert!(contents.starts_with('{'));
}

#[test]
fn card_store_keeps_the_last_import_of_a_card() {
    let mut store = CardStore::open_in_memory().expect("store should open");
    let mapper = FormMapper::new("2024-05-01");

    let mut record = extractor(CaptureMode::Auto).extract(SAMPLE_SHEET);
    let first = mapper.map_to_form(&record);
    let key = store
        .upsert_card(&record, &first, "abc")
        .expect("first import");
    assert_eq!(key, "KW-1024");
    assert_eq!(store.count_properties().expect("count"), 4);

    record.article_index = "ART-9999".to_string();
    record.otr = ParameterReading::default();
    record.wvtr = ParameterReading::default();
    let second = mapper.map_to_form(&record);
    store
        .upsert_card(&record, &second, "def")
        .expect("second import");

    assert_eq!(store.count_cards().expect("count"), 1);
    assert_eq!(store.count_properties().expect("count"), 2);
    assert!(store.last_imported_at().expect("timestamp").is_some());

    let stored: FormRecord = store
        .load_card("KW-1024")
        .expect("load")
        .expect("card should exist");
    assert_eq!(stored, second);
    assert!(store.load_card("missing").expect("load").is_none());
}

#[test]
fn card_store_keys_cards_without_number_by_file_stem() {
    let mut store = CardStore::open_in_memory().expect("store should open");
    let record = ExtractedRecord {
        source_file: "sheet-7.pdf".to_string(),
        source_stem: "sheet-7".to_string(),
        ..ExtractedRecord::default()
    };

    let key = store
        .upsert_card(&record, &FormRecord::default(), "abc")
        .expect("import");
    assert_eq!(key, "sheet-7");

    assert!(
        store
            .upsert_card(&ExtractedRecord::default(), &FormRecord::default(), "abc")
            .is_err()
    );
}

#[test]
fn card_store_opens_a_database_file_in_a_new_directory() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let db_path = dir.path().join("nested").join("cards.sqlite");

    let store = CardStore::open(&db_path).expect("store should open");
    assert_eq!(store.count_cards().expect("count"), 0);
    assert!(db_path.exists());
}

#[test]
fn card_store_summary_counts_cards_and_properties() {
    let mut store = CardStore::open_in_memory().expect("store should open");
    let empty = store.summary().expect("empty store should summarize");
    assert_eq!(empty.cards, 0);
    assert_eq!(empty.last_imported_at, None);

    let mut record = extractor(CaptureMode::Auto).extract(SAMPLE_SHEET);
    record.source_stem = "kw_1024".to_string();
    let form = FormMapper::new("2024-05-01").map_to_form(&record);
    store.upsert_card(&record, &form, "abc").expect("import");

    let summary = store.summary().expect("store should summarize");
    assert_eq!(summary.cards, 1);
    assert_eq!(summary.properties, 4);
    assert!(summary.last_imported_at.is_some());
}

#[test]
fn card_store_summary_reports_unreadable_rows() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let db_path = dir.path().join("cards.sqlite");

    let mut store = CardStore::open(&db_path).expect("store should open");
    let record = extractor(CaptureMode::Auto).extract(SAMPLE_SHEET);
    let form = FormMapper::new("2024-05-01").map_to_form(&record);
    store.upsert_card(&record, &form, "abc").expect("import");
    drop(store);

    let raw = rusqlite::Connection::open(&db_path).expect("raw connection should open");
    raw.execute("UPDATE cards SET imported_at = X'00'", [])
        .expect("import time should be overwritten");
    drop(raw);

    let store = CardStore::open(&db_path).expect("store should reopen");
    store
        .summary()
        .expect_err("a non-text import time should be reported");
}

#[test]
fn discover_inputs_filters_by_extension_in_name_order() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    write_file(dir.path(), "b.TXT", b"");
    write_file(dir.path(), "a.txt", b"");
    write_file(dir.path(), "notes.md", b"");
    fs::create_dir(dir.path().join("nested.txt")).expect("dir should be created");

    let inputs = discover_inputs(dir.path(), "txt").expect("inputs should be listed");
    let names = inputs
        .iter()
        .map(|path| crate::util::file_stem_string(path))
        .collect::<Vec<String>>();
    assert_eq!(names, vec!["a", "b"]);

    assert!(discover_inputs(&dir.path().join("missing"), "txt").is_err());
}

#[test]
fn batch_counts_failures_and_matches_single_document_runs() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    write_file(dir.path(), "first.txt", short_sheet("KW-1", "ART-1").as_bytes());
    write_file(dir.path(), "second.txt", short_sheet("KW-2", "ART-2").as_bytes());
    write_file(dir.path(), "broken.txt", &[0x43, 0x61, 0xff, 0xfe, 0x00]);
    write_file(dir.path(), "readme.md", b"Card No : ignored\n");

    let extractor = extractor(CaptureMode::Auto);
    let enricher = RecordEnricher::disabled();
    let mapper = FormMapper::new("2024-05-01");
    let runner = BatchRunner {
        source: &PlainTextSource,
        extractor: &extractor,
        enricher: &enricher,
        mapper: &mapper,
    };

    let mut sink = ExportSink::new(&dir.path().join("exports"), ExportFormat::Json);
    let report = runner
        .process_all(dir.path(), "Anna Nowak", &mut sink)
        .expect("batch should run");

    assert_eq!(report.summary.success, 2);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.failures[0].file, "broken.txt");
    assert_eq!(report.summary.failures[0].kind, FailureKind::Io);
    assert_eq!(report.inputs.len(), 2);
    assert_eq!(report.outputs.len(), 1);
    assert!(Path::new(&report.outputs[0]).exists());

    let rows = sink.rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].source_file, "first");
    assert_eq!(rows[0].card_no, "KW-1");
    assert_eq!(rows[0].prepared_by, "Anna Nowak");
    assert_eq!(rows[0].otr_value, "1.5");

    for row in rows {
        let mut single = ExportSink::new(&dir.path().join("single"), ExportFormat::Json);
        runner
            .process_file(
                &dir.path().join(format!("{}.txt", row.source_file)),
                "Anna Nowak",
                &mut single,
            )
            .expect("single document should process");
        assert_eq!(
            serde_json::to_value(&single.rows()[0]).expect("row json"),
            serde_json::to_value(row).expect("row json")
        );
    }
}

#[test]
fn batch_over_empty_directory_succeeds_with_zero_counts() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let extractor = extractor(CaptureMode::Auto);
    let enricher = RecordEnricher::disabled();
    let mapper = FormMapper::new("2024-05-01");
    let runner = BatchRunner {
        source: &PlainTextSource,
        extractor: &extractor,
        enricher: &enricher,
        mapper: &mapper,
    };

    let mut sink = ExportSink::new(&dir.path().join("exports"), ExportFormat::All);
    let report = runner
        .process_all(dir.path(), "Anna Nowak", &mut sink)
        .expect("batch should run");

    assert_eq!(report.summary.success, 0);
    assert_eq!(report.summary.failed, 0);
    assert!(report.outputs.is_empty());
}

#[test]
fn batch_continues_after_a_form_rejects_a_card() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    write_file(dir.path(), "a.txt", short_sheet("KW-1", "ART-1").as_bytes());
    write_file(dir.path(), "b.txt", short_sheet("BAD", "ART-2").as_bytes());
    write_file(dir.path(), "c.txt", short_sheet("KW-3", "ART-3").as_bytes());

    let extractor = extractor(CaptureMode::Auto);
    let enricher = RecordEnricher::new(
        table(vec![LookupRow::new([("Article", "ART-3"), ("Winding", "W8")])]),
        vec![column(
            "Winding",
            RecordField::WindingCode,
            MergePolicy::FillGaps,
        )],
    );
    let mapper = FormMapper::new("2024-05-01");
    let runner = BatchRunner {
        source: &PlainTextSource,
        extractor: &extractor,
        enricher: &enricher,
        mapper: &mapper,
    };

    let mut form = RecordingFormSink {
        reject_card: Some("BAD".to_string()),
        ..RecordingFormSink::default()
    };
    let report = {
        let mut sink = FormFillSink::new(&mut form);
        runner
            .process_all(dir.path(), "Anna Nowak", &mut sink)
            .expect("batch should run")
    };

    assert_eq!(report.summary.success, 2);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.failures[0].file, "b.txt");
    assert_eq!(report.summary.failures[0].kind, FailureKind::FormInteraction);
    assert_eq!(report.outputs, vec!["a.pdf", "c.pdf"]);

    assert_eq!(form.cards, 3);
    assert_eq!(form.regenerated, vec!["a", "c"]);
    assert!(
        form.fields
            .iter()
            .any(|(name, value)| name == "Winding code" && value == "W8")
    );
    assert!(
        form.fields
            .iter()
            .any(|(name, value)| name == "Print layer" && value == "superficial")
    );
}

#[test]
fn store_sink_saves_every_processed_card() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    write_file(dir.path(), "a.txt", short_sheet("KW-1", "ART-1").as_bytes());
    write_file(dir.path(), "b.txt", short_sheet("KW-2", "ART-2").as_bytes());
    write_file(dir.path(), "c.txt", short_sheet("KW-1", "ART-1b").as_bytes());

    let extractor = extractor(CaptureMode::Auto);
    let enricher = RecordEnricher::disabled();
    let mapper = FormMapper::new("2024-05-01");
    let runner = BatchRunner {
        source: &PlainTextSource,
        extractor: &extractor,
        enricher: &enricher,
        mapper: &mapper,
    };

    let mut sink = StoreSink::new(CardStore::open_in_memory().expect("store should open"));
    let report = runner
        .process_all(dir.path(), "Anna Nowak", &mut sink)
        .expect("batch should run");

    assert_eq!(report.summary.success, 3);
    assert_eq!(report.outputs, vec!["KW-1", "KW-2", "KW-1"]);
    assert_eq!(sink.store().count_cards().expect("count"), 2);

    let card = sink
        .store()
        .load_card("KW-1")
        .expect("load")
        .expect("card should exist");
    assert_eq!(card.article.index, "ART-1b");
    assert_eq!(card.signatures.prepared_by, "Anna Nowak");
}

#[test]
fn plain_text_source_splits_form_feed_pages() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let path = write_file(dir.path(), "paged.txt", b"page one\r\n\x0cpage two\n\x0c\n\n");

    let text = PlainTextSource
        .extract_text(&path)
        .expect("text should be read");
    assert_eq!(text.pages, vec!["page one\n", "page two\n"]);
    assert_eq!(text.text(), "page one\n\npage two\n");
}

#[test]
fn export_sink_writes_an_excel_workbook() {
    use calamine::Reader;

    let dir = tempfile::tempdir().expect("temp dir should be created");
    let record = extractor(CaptureMode::Auto).extract(SAMPLE_SHEET);
    let form = FormMapper::new("2024-05-01").map_to_form(&record);
    let document = InputDocument {
        path: dir.path().join("sheet.pdf"),
        file_name: "sheet.pdf".to_string(),
        stem: "sheet".to_string(),
        sha256: String::new(),
    };

    let mut sink = ExportSink::new(dir.path(), ExportFormat::Excel);
    sink.accept(&document, &record, &form).expect("row accepted");
    let outputs = sink.finish().expect("export written");

    assert_eq!(outputs.len(), 1);
    assert!(outputs[0].ends_with(".xlsx"));

    let mut workbook =
        calamine::open_workbook_auto(&outputs[0]).expect("export should open as a workbook");
    assert_eq!(workbook.sheet_names(), vec!["Specifications".to_string()]);
    let range = workbook
        .worksheet_range_at(0)
        .expect("export should have a worksheet")
        .expect("worksheet should be readable");
    let rows = range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect::<Vec<String>>())
        .collect::<Vec<Vec<String>>>();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][..3], ["source_file", "prepared_by", "card_no"]);
    assert_eq!(rows[1][0], "sheet.pdf");
    assert_eq!(rows[1][2], "KW-1024");
    assert!(rows[1].contains(&"112.5".to_string()));
}

#[test]
fn export_sink_writes_csv_with_byte_order_mark() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let record = extractor(CaptureMode::Auto).extract(SAMPLE_SHEET);
    let form = FormMapper::new("2024-05-01").map_to_form(&record);
    let document = InputDocument {
        path: dir.path().join("sheet.pdf"),
        file_name: "sheet.pdf".to_string(),
        stem: "sheet".to_string(),
        sha256: String::new(),
    };

    let mut sink = ExportSink::new(dir.path(), ExportFormat::Csv);
    sink.accept(&document, &record, &form).expect("row accepted");
    let outputs = sink.finish().expect("export written");

    assert_eq!(outputs.len(), 1);
    let raw = fs::read(&outputs[0]).expect("csv should be readable");
    assert!(raw.starts_with(b"\xEF\xBB\xBF"));
    let text = String::from_utf8(raw[3..].to_vec()).expect("csv should be UTF-8");
    let header = text.lines().next().expect("header row");
    assert!(header.starts_with("source_file,prepared_by,card_no,"));
    assert!(text.contains("KW-1024"));
}
