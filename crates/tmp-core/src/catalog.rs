//! Hazard catalog
//!
//! The catalog is the knowledge table the risk register is built from: a
//! stable key per hazard mapped to its label, raw severity score, standard
//! controls and post-control (residual) score. It is built once and only
//! ever read afterwards.

use crate::error::{Result, TmpError};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

lazy_static! {
    /// The hazards every TMP generator ships with
    static ref STANDARD_CATALOG: HazardCatalog = HazardCatalog {
        entries: vec![
            entry(
                "lvr",
                "Low Volume Rural (LVR)",
                25,
                "Extended tapers. TSL mandatory. 100km/h warning distance.",
                6,
            ),
            entry(
                "live_lane",
                "Work in Live Lane",
                25,
                "Safety spotter required. High-vis PPE. Cone delineation.",
                9,
            ),
            entry(
                "height",
                "Overhead Services / Height",
                15,
                "Maintain 4m MAD. Dedicated spotter. Permit-to-dig.",
                4,
            ),
            entry(
                "pedestrian",
                "Pedestrian Interface",
                16,
                "Cone bars/fencing. Safe alternative route. Accessible for prams.",
                4,
            ),
            entry(
                "machinery",
                "Plant & Machinery",
                16,
                "360 checks. Spotter for reversing. Competent operators.",
                4,
            ),
            entry(
                "stopgo",
                "Stop/Go Operation",
                16,
                "Maintain safety zones. Clear sight lines. Radio comms.",
                6,
            ),
        ],
    };
}

fn entry(
    key: &str,
    label: &str,
    score: u32,
    controls: &str,
    residual: u32,
) -> (String, HazardDescriptor) {
    (
        key.to_string(),
        HazardDescriptor {
            label: label.to_string(),
            score,
            controls: controls.to_string(),
            residual,
        },
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HazardDescriptor {
    pub label: String,
    /// Raw severity score before controls
    pub score: u32,
    /// Standard controls text printed in the register
    pub controls: String,
    /// Score once the controls are in place
    pub residual: u32,
}

/// On-disk shape of a catalog file: a list of `[[hazard]]` tables
#[derive(Debug, Deserialize)]
struct CatalogFile {
    hazard: Vec<CatalogFileEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogFileEntry {
    key: String,
    label: String,
    score: u32,
    controls: String,
    residual: u32,
}

/// Read-only lookup table from hazard key to descriptor.
///
/// Entries keep their declaration order so listings are stable; lookups
/// never depend on that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HazardCatalog {
    entries: Vec<(String, HazardDescriptor)>,
}

impl HazardCatalog {
    /// The built-in catalog, constructed on first use and shared for the
    /// lifetime of the process.
    pub fn standard() -> &'static HazardCatalog {
        &STANDARD_CATALOG
    }

    /// Build a catalog from explicit entries.
    ///
    /// Keys must be non-blank and unique, labels non-blank.
    pub fn new(entries: Vec<(String, HazardDescriptor)>) -> Result<Self> {
        if entries.is_empty() {
            return Err(TmpError::Config("Hazard catalog has no entries".into()));
        }

        let mut seen = HashSet::new();
        for (key, descriptor) in &entries {
            if key.trim().is_empty() {
                return Err(TmpError::Config("Hazard key must not be blank".into()));
            }
            if descriptor.label.trim().is_empty() {
                return Err(TmpError::Config(format!(
                    "Hazard '{}' has a blank label",
                    key
                )));
            }
            if !seen.insert(key.as_str()) {
                return Err(TmpError::Config(format!(
                    "Hazard key '{}' is defined more than once",
                    key
                )));
            }
        }

        Ok(Self { entries })
    }

    /// Load a catalog from a TOML file of `[[hazard]]` tables
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            TmpError::Config(format!(
                "Failed to read hazard catalog {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(s)
            .map_err(|e| TmpError::Config(format!("Failed to parse hazard catalog: {}", e)))?;

        let entries = file
            .hazard
            .into_iter()
            .map(|e| {
                (
                    e.key,
                    HazardDescriptor {
                        label: e.label,
                        score: e.score,
                        controls: e.controls,
                        residual: e.residual,
                    },
                )
            })
            .collect();

        Self::new(entries)
    }

    pub fn get(&self, key: &str) -> Option<&HazardDescriptor> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, descriptor)| descriptor)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HazardDescriptor)> {
        self.entries.iter().map(|(k, d)| (k.as_str(), d))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
