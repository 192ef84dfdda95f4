use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::model::EnrichmentColumn;

/// Operator settings shared by all batch commands.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Names allowed in `--prepared-by`; any name is accepted when empty.
    #[serde(default)]
    pub preparers: Vec<String>,

    /// Replaces the default enrichment allow-list.
    #[serde(default)]
    pub enrichment_columns: Option<Vec<EnrichmentColumn>>,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn resolve_preparer(&self, requested: &str) -> Result<String> {
        let requested = requested.trim();
        if requested.is_empty() {
            bail!("--prepared-by must not be empty");
        }

        if self.preparers.is_empty() {
            return Ok(requested.to_string());
        }

        self.preparers
            .iter()
            .find(|known| known.trim().to_lowercase() == requested.to_lowercase())
            .cloned()
            .with_context(|| {
                format!(
                    "unknown preparer '{requested}', expected one of: {}",
                    self.preparers.join(", ")
                )
            })
    }
}
