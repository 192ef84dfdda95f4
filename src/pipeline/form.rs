use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::model::{FormRecord, PropertyRow};
use crate::util::write_json_pretty;

/// Named widgets of the product card form.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FormSlot {
    CardNo,
    ArticleIndex,
    ClientArticle,
    ArticleName,
    ArticleStructure,
    StructureThickness,
    StructureDescription,
    ChemicalComposition,
    PrintLayer,
    PrintDirection,
    PrintSymmetry,
    ColourCount,
    Lacquer,
    WindingCode,
    ReelDiameter,
    InnerCore,
    CoreWidth,
    CoreExtension,
    PreparedBy,
}

impl FormSlot {
    pub fn widget_name(self) -> &'static str {
        match self {
            Self::CardNo => "Card no",
            Self::ArticleIndex => "Article index",
            Self::ClientArticle => "Client article",
            Self::ArticleName => "Article name",
            Self::ArticleStructure => "Article structure",
            Self::StructureThickness => "Structure thickness",
            Self::StructureDescription => "Structure description",
            Self::ChemicalComposition => "Chemical composition",
            Self::PrintLayer => "Print layer",
            Self::PrintDirection => "Print direction",
            Self::PrintSymmetry => "Print symmetry",
            Self::ColourCount => "Number of colours",
            Self::Lacquer => "Lacquer",
            Self::WindingCode => "Winding code",
            Self::ReelDiameter => "Reel diameter",
            Self::InnerCore => "Inner core",
            Self::CoreWidth => "Core width",
            Self::CoreExtension => "Core extension",
            Self::PreparedBy => "Prepared by",
        }
    }
}

/// Capabilities the form application exposes to the pipeline.
pub trait FormSink {
    /// Clears the form before a new card is entered.
    fn new_card(&mut self) -> Result<(), PipelineError>;

    fn fill_field(&mut self, name: &str, value: &str) -> Result<(), PipelineError>;

    /// Updates the property row with the same display name, or appends one.
    fn upsert_property(&mut self, row: &PropertyRow) -> Result<(), PipelineError>;

    /// Produces the output document and returns its path.
    fn regenerate(&mut self, output_stem: &str) -> Result<PathBuf, PipelineError>;
}

impl<T: FormSink + ?Sized> FormSink for &mut T {
    fn new_card(&mut self) -> Result<(), PipelineError> {
        (**self).new_card()
    }

    fn fill_field(&mut self, name: &str, value: &str) -> Result<(), PipelineError> {
        (**self).fill_field(name, value)
    }

    fn upsert_property(&mut self, row: &PropertyRow) -> Result<(), PipelineError> {
        (**self).upsert_property(row)
    }

    fn regenerate(&mut self, output_stem: &str) -> Result<PathBuf, PipelineError> {
        (**self).regenerate(output_stem)
    }
}

/// Writes every present value of the card into its form slot. Returns the
/// number of writes issued.
pub fn fill_form(sink: &mut dyn FormSink, form: &FormRecord) -> Result<usize, PipelineError> {
    let layer = form.print.layer.map(|value| value.as_str()).unwrap_or_default();
    let direction = form
        .print
        .direction
        .map(|value| value.as_str())
        .unwrap_or_default();
    let symmetry = form
        .print
        .symmetry
        .map(|value| value.as_str())
        .unwrap_or_default();

    let fields = [
        (FormSlot::CardNo, form.article.card_no.as_str()),
        (FormSlot::ArticleIndex, form.article.index.as_str()),
        (FormSlot::ClientArticle, form.article.client_index.as_str()),
        (FormSlot::ArticleName, form.article.description.as_str()),
        (FormSlot::ArticleStructure, form.article.structure.as_str()),
        (
            FormSlot::StructureThickness,
            form.article.structure_thickness.as_str(),
        ),
        (
            FormSlot::StructureDescription,
            form.article.structure_description.as_str(),
        ),
        (
            FormSlot::ChemicalComposition,
            form.article.chemical_composition.as_str(),
        ),
        (FormSlot::PrintLayer, layer),
        (FormSlot::PrintDirection, direction),
        (FormSlot::PrintSymmetry, symmetry),
        (FormSlot::ColourCount, form.print.colour_count.as_str()),
        (FormSlot::Lacquer, form.print.lacquer.as_str()),
        (FormSlot::WindingCode, form.packing.winding_code.as_str()),
        (FormSlot::ReelDiameter, form.packing.external_diameter.as_str()),
        (FormSlot::InnerCore, form.packing.inner_core.as_str()),
        (FormSlot::CoreWidth, form.packing.core_width.as_str()),
        (FormSlot::CoreExtension, form.packing.core_extension.as_str()),
        (FormSlot::PreparedBy, form.signatures.prepared_by.as_str()),
    ];

    let mut writes = 0usize;
    for (slot, value) in fields {
        if value.is_empty() {
            continue;
        }
        sink.fill_field(slot.widget_name(), value)?;
        writes += 1;
    }

    for row in &form.properties {
        sink.upsert_property(row)?;
        writes += 1;
    }

    Ok(writes)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormPropertyRow {
    pub name: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub minus: String,
    #[serde(default)]
    pub plus: String,
    #[serde(default)]
    pub unit: String,
}

/// Saved state of the form application: widget values plus the property table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormState {
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub properties: Vec<FormPropertyRow>,
}

impl FormState {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    fn upsert_property(&mut self, row: &PropertyRow) {
        if let Some(existing) = self
            .properties
            .iter_mut()
            .find(|existing| existing.name == row.name)
        {
            existing.value = row.value.clone();
            if !row.minus.is_empty() {
                existing.minus = row.minus.clone();
            }
            if !row.plus.is_empty() {
                existing.plus = row.plus.clone();
            }
            if existing.unit.is_empty() {
                existing.unit = row.unit.clone();
            }
            if existing.method.is_empty() {
                existing.method = row.method.clone();
            }
            return;
        }

        self.properties.push(FormPropertyRow {
            name: row.name.clone(),
            method: row.method.clone(),
            value: row.value.clone(),
            minus: row.minus.clone(),
            plus: row.plus.clone(),
            unit: row.unit.clone(),
        });
    }
}

const CONFIRMATION_ANSWERS: usize = 3;

/// Drives the form application through its state file and an external
/// regenerate command.
///
/// The command is split on whitespace before the `{form}` and `{output}`
/// placeholders are substituted, so paths with spaces stay single arguments.
#[derive(Debug)]
pub struct FormStateSink {
    state_path: PathBuf,
    output_dir: PathBuf,
    template: FormState,
    state: FormState,
    regenerate_command: Option<String>,
}

impl FormStateSink {
    pub fn open(
        state_path: &Path,
        template_path: Option<&Path>,
        output_dir: &Path,
        regenerate_command: Option<String>,
    ) -> Result<Self> {
        let template = match template_path {
            Some(path) => FormState::load(path)?,
            None => FormState::default(),
        };

        Ok(Self {
            state_path: state_path.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            state: template.clone(),
            template,
            regenerate_command,
        })
    }

    fn run_regenerate_command(
        &self,
        template: &str,
        output_path: &Path,
    ) -> Result<(), PipelineError> {
        let args = template
            .split_whitespace()
            .map(|arg| {
                arg.replace("{form}", &self.state_path.display().to_string())
                    .replace("{output}", &output_path.display().to_string())
            })
            .collect::<Vec<String>>();
        let Some((program, rest)) = args.split_first() else {
            return Err(PipelineError::FormInteraction(
                "regenerate command is empty".to_string(),
            ));
        };

        // A document left by an earlier run must not count as this card's output.
        if output_path.exists() {
            fs::remove_file(output_path).map_err(|err| {
                PipelineError::FormInteraction(format!(
                    "failed to remove stale {}: {err}",
                    output_path.display()
                ))
            })?;
        }

        let mut child = Command::new(program)
            .args(rest)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                PipelineError::FormInteraction(format!("failed to start {program}: {err}"))
            })?;

        // Answer confirmation prompts; the program may exit without reading them.
        if let Some(mut stdin) = child.stdin.take() {
            for _ in 0..CONFIRMATION_ANSWERS {
                if stdin.write_all(b"y\n").is_err() {
                    break;
                }
            }
        }

        let output = child.wait_with_output().map_err(|err| {
            PipelineError::FormInteraction(format!("failed to wait for {program}: {err}"))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::FormInteraction(format!(
                "{program} returned non-zero exit status: {}",
                stderr.trim()
            )));
        }

        if !output_path.exists() {
            return Err(PipelineError::FormInteraction(format!(
                "{program} did not produce {}",
                output_path.display()
            )));
        }

        Ok(())
    }
}

impl FormSink for FormStateSink {
    fn new_card(&mut self) -> Result<(), PipelineError> {
        self.state = self.template.clone();
        Ok(())
    }

    fn fill_field(&mut self, name: &str, value: &str) -> Result<(), PipelineError> {
        if name.trim().is_empty() {
            return Err(PipelineError::FormInteraction(
                "form field name is empty".to_string(),
            ));
        }
        self.state.fields.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn upsert_property(&mut self, row: &PropertyRow) -> Result<(), PipelineError> {
        self.state.upsert_property(row);
        Ok(())
    }

    fn regenerate(&mut self, output_stem: &str) -> Result<PathBuf, PipelineError> {
        write_json_pretty(&self.state_path, &self.state)
            .map_err(|err| PipelineError::FormInteraction(format!("{err:#}")))?;
        debug!(path = %self.state_path.display(), "saved form state");

        let Some(template) = self.regenerate_command.clone() else {
            return Ok(self.state_path.clone());
        };

        let output_path = self.output_dir.join(format!("{output_stem}.pdf"));
        self.run_regenerate_command(&template, &output_path)?;
        info!(path = %output_path.display(), "regenerated card document");

        Ok(output_path)
    }
}
