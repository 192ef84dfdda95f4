use crate::model::{
    ApplicationSection, ArticleSection, ExtractedRecord, FormRecord, PackingSection,
    PhysicalParameter, PrintDirection, PrintLayer, PrintSection, PrintSymmetry, ProducerSection,
    PropertyRow, SignatureSection,
};
use crate::util::{condense_whitespace, local_date_string};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrintTypeParts {
    pub layer: Option<PrintLayer>,
    pub direction: Option<PrintDirection>,
    pub symmetry: Option<PrintSymmetry>,
}

/// Splits `layer/direction/symmetry`. A token outside its position's
/// vocabulary leaves that part unset.
pub fn split_print_type(raw: &str) -> PrintTypeParts {
    let tokens = raw
        .split('/')
        .map(|token| condense_whitespace(token).to_lowercase())
        .collect::<Vec<String>>();
    let token = |index: usize| tokens.get(index).map(String::as_str);

    PrintTypeParts {
        layer: match token(0) {
            Some("sandwich printing") => Some(PrintLayer::SandwichPrinting),
            Some("superficial") => Some(PrintLayer::Superficial),
            _ => None,
        },
        direction: match token(1) {
            Some("simple") => Some(PrintDirection::Simple),
            Some("reverse") => Some(PrintDirection::Reverse),
            _ => None,
        },
        symmetry: match token(2) {
            Some("symmetrical") => Some(PrintSymmetry::Symmetrical),
            Some("asymmetrical") => Some(PrintSymmetry::Asymmetrical),
            _ => None,
        },
    }
}

/// Maps extracted records onto the product card. Only data sheet values are
/// carried over; every other form field stays empty.
#[derive(Debug, Clone)]
pub struct FormMapper {
    issued_on: String,
}

impl FormMapper {
    pub fn new(issued_on: impl Into<String>) -> Self {
        Self {
            issued_on: issued_on.into(),
        }
    }

    pub fn today() -> Self {
        Self::new(local_date_string())
    }

    pub fn map_to_form(&self, record: &ExtractedRecord) -> FormRecord {
        let parts = split_print_type(&record.print_type);

        FormRecord {
            producer: ProducerSection::default(),
            article: ArticleSection {
                card_no: record.card_no.clone(),
                issue_date: self.issued_on.clone(),
                index: record.article_index.clone(),
                client_index: record.client_article_index.clone(),
                description: record.article_description.clone(),
                structure: record.product_structure.clone(),
                structure_description: record.structure_description.clone(),
                chemical_composition: record.chemical_composition.clone(),
                structure_thickness: record.structure_thickness.clone(),
                client_specification: String::new(),
            },
            properties: PhysicalParameter::ALL
                .iter()
                .filter_map(|parameter| property_row(record, *parameter))
                .collect(),
            print: PrintSection {
                print_type: record.print_type.clone(),
                layer: parts.layer,
                direction: parts.direction,
                symmetry: parts.symmetry,
                colour_count: record.number_of_colours.clone(),
                lacquer: record.lacquer_type.clone(),
                ..PrintSection::default()
            },
            packing: PackingSection {
                winding_code: record.winding_code.clone(),
                external_diameter: record.external_diameter.clone(),
                inner_core: record.core_identifier.clone(),
                core_width: record.core_width.clone(),
                core_extension: record.core_extension.clone(),
                ..PackingSection::default()
            },
            application: ApplicationSection::default(),
            signatures: SignatureSection {
                prepared_by: record.prepared_by.clone(),
                prepared_on: self.issued_on.clone(),
                ..SignatureSection::default()
            },
        }
    }
}

fn property_row(record: &ExtractedRecord, parameter: PhysicalParameter) -> Option<PropertyRow> {
    let reading = record.parameter(parameter);
    if !reading.is_present() {
        return None;
    }

    let unit = if reading.unit.is_empty() {
        parameter.default_unit().to_string()
    } else {
        reading.unit.clone()
    };

    Some(PropertyRow {
        parameter,
        name: parameter.display_name().to_string(),
        method: parameter.default_method().to_string(),
        value: reading.value.clone(),
        minus: reading.minus.clone(),
        plus: reading.plus.clone(),
        unit,
    })
}
