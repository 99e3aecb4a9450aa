//! Hazard resolution
//!
//! Turns the operator's hazard selection into the rows of the risk
//! register. The register always opens with the site establishment row,
//! followed by the selected hazards in the order the operator picked them
//! and, last, a site specific row for any free-text hazard.

use crate::catalog::HazardCatalog;
use crate::error::{Result, TmpError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

pub const BASELINE_LABEL: &str = "Site Establishment";
pub const BASELINE_SCORE: u32 = 16;
pub const BASELINE_CONTROLS: &str = "Standard setup controls...";
pub const CUSTOM_LABEL: &str = "Site Specific";

/// Ordered, duplicate-free set of catalog keys plus optional free text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSelection")]
pub struct HazardSelection {
    keys: Vec<String>,
    custom: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSelection {
    #[serde(default)]
    keys: Vec<String>,
    #[serde(default)]
    custom: Option<String>,
}

impl TryFrom<RawSelection> for HazardSelection {
    type Error = TmpError;

    fn try_from(raw: RawSelection) -> Result<Self> {
        HazardSelection::new(raw.keys, raw.custom)
    }
}

impl HazardSelection {
    pub fn new<K, S>(keys: K, custom: Option<String>) -> Result<Self>
    where
        K: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();

        let mut seen = HashSet::new();
        for key in &keys {
            if !seen.insert(key.as_str()) {
                return Err(TmpError::DuplicateHazardKey(key.clone()));
            }
        }

        Ok(Self { keys, custom })
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Custom hazard text, if it contains anything besides whitespace
    pub fn custom(&self) -> Option<&str> {
        self.custom
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }

    /// Number of register rows this selection resolves to
    pub fn row_count(&self) -> usize {
        1 + self.keys.len() + usize::from(self.custom().is_some())
    }
}

/// One line of the risk register
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HazardRow {
    pub label: String,
    pub score: Option<u32>,
    pub controls: String,
    pub residual: Option<u32>,
}

impl HazardRow {
    pub fn baseline() -> Self {
        Self {
            label: BASELINE_LABEL.to_string(),
            score: Some(BASELINE_SCORE),
            controls: BASELINE_CONTROLS.to_string(),
            residual: None,
        }
    }

    fn custom(text: &str) -> Self {
        Self {
            label: CUSTOM_LABEL.to_string(),
            score: None,
            controls: text.to_string(),
            residual: None,
        }
    }
}

/// Resolve a selection against the catalog.
///
/// Every key is checked before anything is returned, so a bad selection
/// never reaches the document.
pub fn resolve(selection: &HazardSelection, catalog: &HazardCatalog) -> Result<Vec<HazardRow>> {
    let mut rows = Vec::with_capacity(selection.row_count());
    rows.push(HazardRow::baseline());

    for key in selection.keys() {
        let descriptor = catalog
            .get(key)
            .ok_or_else(|| TmpError::UnknownHazardKey(key.clone()))?;
        rows.push(HazardRow {
            label: descriptor.label.clone(),
            score: Some(descriptor.score),
            controls: descriptor.controls.clone(),
            residual: Some(descriptor.residual),
        });
    }

    if let Some(text) = selection.custom() {
        rows.push(HazardRow::custom(text));
    }

    debug!(rows = rows.len(), "Resolved hazard selection");
    Ok(rows)
}
