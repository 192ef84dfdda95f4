use serde::{Deserialize, Serialize};

use crate::error::FailureKind;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterReading {
    pub value: String,
    pub minus: String,
    pub plus: String,
    pub unit: String,
}

impl ParameterReading {
    pub fn is_present(&self) -> bool {
        !self.value.is_empty()
    }

    pub fn numeric(&self) -> Option<f64> {
        self.value.parse::<f64>().ok()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicalParameter {
    Weight,
    Otr,
    Wvtr,
    Thickness,
}

impl PhysicalParameter {
    pub const ALL: [Self; 4] = [Self::Weight, Self::Otr, Self::Wvtr, Self::Thickness];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weight => "weight",
            Self::Otr => "otr",
            Self::Wvtr => "wvtr",
            Self::Thickness => "thickness",
        }
    }

    /// Row name used by the property table of the product card form.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Weight => "Weight",
            Self::Otr => "OTR (O₂ barrier)",
            Self::Wvtr => "WVTR (H₂O barrier)",
            Self::Thickness => "Thickness",
        }
    }

    pub fn default_method(self) -> &'static str {
        match self {
            Self::Weight => "PN-81/P 50129",
            Self::Otr => "DIN 53380",
            Self::Wvtr => "DIN 53122",
            Self::Thickness => "PN-ISO 4593",
        }
    }

    pub fn default_unit(self) -> &'static str {
        match self {
            Self::Weight => "g/m²",
            Self::Otr => "cm³/m²/24h",
            Self::Wvtr => "g/m²/24h",
            Self::Thickness => "μm",
        }
    }
}

/// Flat record produced from one data sheet. Every field defaults to empty;
/// an empty string means the label was not found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub card_no: String,
    pub article_index: String,
    pub client_article_index: String,
    pub article_description: String,

    pub product_structure: String,
    pub structure_thickness: String,
    pub structure_description: String,
    pub chemical_composition: String,

    pub weight: ParameterReading,
    pub otr: ParameterReading,
    pub wvtr: ParameterReading,
    pub thickness: ParameterReading,

    pub print_type: String,
    pub number_of_colours: String,
    pub lacquer_type: String,

    pub winding_code: String,
    pub core_identifier: String,
    pub external_diameter: String,
    pub core_width: String,
    pub core_extension: String,

    pub prepared_by: String,
    pub source_file: String,
    pub source_stem: String,
}

impl ExtractedRecord {
    pub fn parameter(&self, parameter: PhysicalParameter) -> &ParameterReading {
        match parameter {
            PhysicalParameter::Weight => &self.weight,
            PhysicalParameter::Otr => &self.otr,
            PhysicalParameter::Wvtr => &self.wvtr,
            PhysicalParameter::Thickness => &self.thickness,
        }
    }

    pub fn parameter_mut(&mut self, parameter: PhysicalParameter) -> &mut ParameterReading {
        match parameter {
            PhysicalParameter::Weight => &mut self.weight,
            PhysicalParameter::Otr => &mut self.otr,
            PhysicalParameter::Wvtr => &mut self.wvtr,
            PhysicalParameter::Thickness => &mut self.thickness,
        }
    }

    pub fn field(&self, field: RecordField) -> &str {
        match field {
            RecordField::CardNo => &self.card_no,
            RecordField::ArticleIndex => &self.article_index,
            RecordField::ClientArticleIndex => &self.client_article_index,
            RecordField::ArticleDescription => &self.article_description,
            RecordField::ProductStructure => &self.product_structure,
            RecordField::StructureThickness => &self.structure_thickness,
            RecordField::StructureDescription => &self.structure_description,
            RecordField::ChemicalComposition => &self.chemical_composition,
            RecordField::WeightValue => &self.weight.value,
            RecordField::WeightUnit => &self.weight.unit,
            RecordField::OtrValue => &self.otr.value,
            RecordField::OtrUnit => &self.otr.unit,
            RecordField::WvtrValue => &self.wvtr.value,
            RecordField::WvtrUnit => &self.wvtr.unit,
            RecordField::ThicknessValue => &self.thickness.value,
            RecordField::ThicknessUnit => &self.thickness.unit,
            RecordField::PrintType => &self.print_type,
            RecordField::NumberOfColours => &self.number_of_colours,
            RecordField::LacquerType => &self.lacquer_type,
            RecordField::WindingCode => &self.winding_code,
            RecordField::CoreIdentifier => &self.core_identifier,
            RecordField::ExternalDiameter => &self.external_diameter,
            RecordField::CoreWidth => &self.core_width,
            RecordField::CoreExtension => &self.core_extension,
        }
    }

    pub fn field_mut(&mut self, field: RecordField) -> &mut String {
        match field {
            RecordField::CardNo => &mut self.card_no,
            RecordField::ArticleIndex => &mut self.article_index,
            RecordField::ClientArticleIndex => &mut self.client_article_index,
            RecordField::ArticleDescription => &mut self.article_description,
            RecordField::ProductStructure => &mut self.product_structure,
            RecordField::StructureThickness => &mut self.structure_thickness,
            RecordField::StructureDescription => &mut self.structure_description,
            RecordField::ChemicalComposition => &mut self.chemical_composition,
            RecordField::WeightValue => &mut self.weight.value,
            RecordField::WeightUnit => &mut self.weight.unit,
            RecordField::OtrValue => &mut self.otr.value,
            RecordField::OtrUnit => &mut self.otr.unit,
            RecordField::WvtrValue => &mut self.wvtr.value,
            RecordField::WvtrUnit => &mut self.wvtr.unit,
            RecordField::ThicknessValue => &mut self.thickness.value,
            RecordField::ThicknessUnit => &mut self.thickness.unit,
            RecordField::PrintType => &mut self.print_type,
            RecordField::NumberOfColours => &mut self.number_of_colours,
            RecordField::LacquerType => &mut self.lacquer_type,
            RecordField::WindingCode => &mut self.winding_code,
            RecordField::CoreIdentifier => &mut self.core_identifier,
            RecordField::ExternalDiameter => &mut self.external_diameter,
            RecordField::CoreWidth => &mut self.core_width,
            RecordField::CoreExtension => &mut self.core_extension,
        }
    }
}

/// Scalar slots of [`ExtractedRecord`] that an enrichment column may target.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    CardNo,
    ArticleIndex,
    ClientArticleIndex,
    ArticleDescription,
    ProductStructure,
    StructureThickness,
    StructureDescription,
    ChemicalComposition,
    WeightValue,
    WeightUnit,
    OtrValue,
    OtrUnit,
    WvtrValue,
    WvtrUnit,
    ThicknessValue,
    ThicknessUnit,
    PrintType,
    NumberOfColours,
    LacquerType,
    WindingCode,
    CoreIdentifier,
    ExternalDiameter,
    CoreWidth,
    CoreExtension,
}

impl RecordField {
    pub const ALL: [Self; 24] = [
        Self::CardNo,
        Self::ArticleIndex,
        Self::ClientArticleIndex,
        Self::ArticleDescription,
        Self::ProductStructure,
        Self::StructureThickness,
        Self::StructureDescription,
        Self::ChemicalComposition,
        Self::WeightValue,
        Self::WeightUnit,
        Self::OtrValue,
        Self::OtrUnit,
        Self::WvtrValue,
        Self::WvtrUnit,
        Self::ThicknessValue,
        Self::ThicknessUnit,
        Self::PrintType,
        Self::NumberOfColours,
        Self::LacquerType,
        Self::WindingCode,
        Self::CoreIdentifier,
        Self::ExternalDiameter,
        Self::CoreWidth,
        Self::CoreExtension,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CardNo => "card_no",
            Self::ArticleIndex => "article_index",
            Self::ClientArticleIndex => "client_article_index",
            Self::ArticleDescription => "article_description",
            Self::ProductStructure => "product_structure",
            Self::StructureThickness => "structure_thickness",
            Self::StructureDescription => "structure_description",
            Self::ChemicalComposition => "chemical_composition",
            Self::WeightValue => "weight_value",
            Self::WeightUnit => "weight_unit",
            Self::OtrValue => "otr_value",
            Self::OtrUnit => "otr_unit",
            Self::WvtrValue => "wvtr_value",
            Self::WvtrUnit => "wvtr_unit",
            Self::ThicknessValue => "thickness_value",
            Self::ThicknessUnit => "thickness_unit",
            Self::PrintType => "print_type",
            Self::NumberOfColours => "number_of_colours",
            Self::LacquerType => "lacquer_type",
            Self::WindingCode => "winding_code",
            Self::CoreIdentifier => "core_identifier",
            Self::ExternalDiameter => "external_diameter",
            Self::CoreWidth => "core_width",
            Self::CoreExtension => "core_extension",
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    #[default]
    FillGaps,
    Overwrite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentColumn {
    pub column: String,
    pub field: RecordField,
    #[serde(default)]
    pub policy: MergePolicy,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum PrintLayer {
    #[serde(rename = "sandwich printing")]
    SandwichPrinting,
    #[serde(rename = "superficial")]
    Superficial,
}

impl PrintLayer {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SandwichPrinting => "sandwich printing",
            Self::Superficial => "superficial",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrintDirection {
    Simple,
    Reverse,
}

impl PrintDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Reverse => "reverse",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrintSymmetry {
    Symmetrical,
    Asymmetrical,
}

impl PrintSymmetry {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Symmetrical => "symmetrical",
            Self::Asymmetrical => "asymmetrical",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerSection {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleSection {
    pub card_no: String,
    pub issue_date: String,
    pub index: String,
    pub client_index: String,
    pub description: String,
    pub structure: String,
    pub structure_description: String,
    pub chemical_composition: String,
    pub structure_thickness: String,
    pub client_specification: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRow {
    pub parameter: PhysicalParameter,
    pub name: String,
    pub method: String,
    pub value: String,
    pub minus: String,
    pub plus: String,
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintSection {
    pub print_type: String,
    pub layer: Option<PrintLayer>,
    pub direction: Option<PrintDirection>,
    pub symmetry: Option<PrintSymmetry>,
    pub colour_count: String,
    pub adhesion: String,
    pub colour_scheme: String,
    pub lacquer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackingSection {
    pub winding_code: String,
    pub reel_weight: String,
    pub external_diameter: String,
    pub reels_per_pallet: String,
    pub inner_core: String,
    pub core_width: String,
    pub core_extension: String,
    pub pallet_type: String,
    pub identification: String,
    pub storage: String,
    pub shelf_life: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSection {
    pub description: String,
    pub approval: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSection {
    pub prepared_by: String,
    pub approved_by: String,
    pub prepared_on: String,
    pub approved_on: String,
}

/// Product card as the form application sees it. Empty strings and `None`
/// are left for the operator to complete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormRecord {
    pub producer: ProducerSection,
    pub article: ArticleSection,
    pub properties: Vec<PropertyRow>,
    pub print: PrintSection,
    pub packing: PackingSection,
    pub application: ApplicationSection,
    pub signatures: SignatureSection,
}

impl FormRecord {
    #[cfg(test)]
    pub fn property(&self, parameter: PhysicalParameter) -> Option<&PropertyRow> {
        self.properties
            .iter()
            .find(|row| row.parameter == parameter)
    }
}

/// One export line per input document.
#[derive(Debug, Clone, Serialize)]
pub struct ExportRow {
    pub source_file: String,
    pub prepared_by: String,
    pub card_no: String,
    pub article_index: String,
    pub client_article_index: String,
    pub article_description: String,
    pub product_structure: String,
    pub structure_thickness: String,
    pub structure_description: String,
    pub chemical_composition: String,
    pub weight_value: String,
    pub weight_minus: String,
    pub weight_plus: String,
    pub weight_unit: String,
    pub otr_value: String,
    pub otr_minus: String,
    pub otr_plus: String,
    pub otr_unit: String,
    pub wvtr_value: String,
    pub wvtr_minus: String,
    pub wvtr_plus: String,
    pub wvtr_unit: String,
    pub thickness_value: String,
    pub thickness_minus: String,
    pub thickness_plus: String,
    pub thickness_unit: String,
    pub print_type: String,
    pub number_of_colours: String,
    pub lacquer_type: String,
    pub winding_code: String,
    pub core_identifier: String,
    pub external_diameter: String,
    pub core_width: String,
    pub core_extension: String,
}

impl From<&ExtractedRecord> for ExportRow {
    fn from(record: &ExtractedRecord) -> Self {
        Self {
            source_file: record.source_stem.clone(),
            prepared_by: record.prepared_by.clone(),
            card_no: record.card_no.clone(),
            article_index: record.article_index.clone(),
            client_article_index: record.client_article_index.clone(),
            article_description: record.article_description.clone(),
            product_structure: record.product_structure.clone(),
            structure_thickness: record.structure_thickness.clone(),
            structure_description: record.structure_description.clone(),
            chemical_composition: record.chemical_composition.clone(),
            weight_value: record.weight.value.clone(),
            weight_minus: record.weight.minus.clone(),
            weight_plus: record.weight.plus.clone(),
            weight_unit: record.weight.unit.clone(),
            otr_value: record.otr.value.clone(),
            otr_minus: record.otr.minus.clone(),
            otr_plus: record.otr.plus.clone(),
            otr_unit: record.otr.unit.clone(),
            wvtr_value: record.wvtr.value.clone(),
            wvtr_minus: record.wvtr.minus.clone(),
            wvtr_plus: record.wvtr.plus.clone(),
            wvtr_unit: record.wvtr.unit.clone(),
            thickness_value: record.thickness.value.clone(),
            thickness_minus: record.thickness.minus.clone(),
            thickness_plus: record.thickness.plus.clone(),
            thickness_unit: record.thickness.unit.clone(),
            print_type: record.print_type.clone(),
            number_of_colours: record.number_of_colours.clone(),
            lacquer_type: record.lacquer_type.clone(),
            winding_code: record.winding_code.clone(),
            core_identifier: record.core_identifier.clone(),
            external_diameter: record.external_diameter.clone(),
            core_width: record.core_width.clone(),
            core_extension: record.core_extension.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileFailure {
    pub file: String,
    pub kind: FailureKind,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchSummary {
    pub success: usize,
    pub failed: usize,
    pub failures: Vec<FileFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputDigest {
    pub filename: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub mode: String,
    pub started_at: String,
    pub finished_at: String,
    pub input_dir: String,
    pub prepared_by: String,
    pub enrichment_source: Option<String>,
    pub input_count: usize,
    pub success: usize,
    pub failed: usize,
    pub failures: Vec<FileFailure>,
    pub inputs: Vec<InputDigest>,
    pub outputs: Vec<String>,
}
