//! Layout configuration
//!
//! Everything the engine needs to know about where things go on the
//! template lives here: per-field text placements, the hazard table region
//! and the diagram region. Coordinates are in PDF points with the origin at
//! the top-left corner of the page and y growing downward; text positions
//! are baselines.
//!
//! The defaults match the standard TMP template. A TOML file can override
//! any section:
//!
//! ```toml
//! [fields.reference]
//! page = 0
//! x = 450.0
//! y = 100.0
//! font_size = 12.0
//!
//! [table]
//! page = 6
//! origin_y = 200.0
//! row_height = 40.0
//!
//! [image]
//! page = "last"
//! rect = [50.0, 100.0, 550.0, 700.0]
//! ```

use crate::error::{Result, TmpError};
use crate::job::Field;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

pub const DEFAULT_FONT_SIZE: f32 = 10.0;
pub const DEFAULT_ANNOTATION_FONT_SIZE: f32 = 8.0;

/// Where a single field is printed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPlacement {
    /// Zero-based page index
    pub page: usize,
    pub x: f32,
    pub y: f32,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    /// Appended to the rendered value, e.g. " km/h"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

impl FieldPlacement {
    pub fn new(page: usize, x: f32, y: f32) -> Self {
        Self {
            page,
            x,
            y,
            font_size: DEFAULT_FONT_SIZE,
            suffix: None,
        }
    }

    pub fn with_font_size(mut self, font_size: f32) -> Self {
        self.font_size = font_size;
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }
}

/// The risk register region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableRegion {
    pub page: usize,
    /// Baseline of the first row
    pub origin_y: f32,
    pub row_height: f32,
    pub label_x: f32,
    pub score_x: f32,
    pub controls_x: f32,
    pub residual_x: f32,
    pub font_size: f32,
    /// Smaller size used for the controls column
    pub annotation_font_size: f32,
}

impl Default for TableRegion {
    fn default() -> Self {
        Self {
            page: 6,
            origin_y: 200.0,
            row_height: 40.0,
            label_x: 50.0,
            score_x: 200.0,
            controls_x: 250.0,
            residual_x: 500.0,
            font_size: DEFAULT_FONT_SIZE,
            annotation_font_size: DEFAULT_ANNOTATION_FONT_SIZE,
        }
    }
}

/// Page addressed either by index or relative to the end of the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageRef {
    Index(usize),
    Anchor(PageAnchor),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageAnchor {
    Last,
}

impl PageRef {
    /// Resolve against a document's page count, `None` if out of range
    pub fn resolve(&self, page_count: usize) -> Option<usize> {
        match self {
            PageRef::Index(index) if *index < page_count => Some(*index),
            PageRef::Index(_) => None,
            PageRef::Anchor(PageAnchor::Last) => page_count.checked_sub(1),
        }
    }

    /// The index this reference asked for, for reporting
    pub fn requested(&self, page_count: usize) -> usize {
        match self {
            PageRef::Index(index) => *index,
            PageRef::Anchor(PageAnchor::Last) => page_count.saturating_sub(1),
        }
    }
}

/// Top-left origin rectangle: `[x0, y0, x1, y1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

impl From<[f32; 4]> for Rect {
    fn from(v: [f32; 4]) -> Self {
        Rect::new(v[0], v[1], v[2], v[3])
    }
}

impl From<Rect> for [f32; 4] {
    fn from(r: Rect) -> Self {
        [r.x0, r.y0, r.x1, r.y1]
    }
}

/// The traffic management diagram region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageRegion {
    pub page: PageRef,
    pub rect: Rect,
}

impl Default for ImageRegion {
    fn default() -> Self {
        Self {
            page: PageRef::Anchor(PageAnchor::Last),
            rect: Rect::new(50.0, 100.0, 550.0, 700.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub fields: BTreeMap<Field, FieldPlacement>,
    pub table: TableRegion,
    pub image: ImageRegion,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        let fields = BTreeMap::from([
            // Page 1: general form
            (Field::Reference, FieldPlacement::new(0, 450.0, 100.0).with_font_size(12.0)),
            (Field::ContractReference, FieldPlacement::new(0, 450.0, 130.0)),
            (Field::RoadName, FieldPlacement::new(0, 50.0, 280.0)),
            (Field::Suburb, FieldPlacement::new(0, 150.0, 280.0)),
            (Field::RoadLevel, FieldPlacement::new(0, 300.0, 280.0)),
            (Field::Speed, FieldPlacement::new(0, 400.0, 280.0).with_suffix(" km/h")),
            (Field::Aadt, FieldPlacement::new(0, 480.0, 280.0)),
            (Field::StartDate, FieldPlacement::new(0, 150.0, 380.0)),
            (Field::EndDate, FieldPlacement::new(0, 400.0, 380.0)),
            (Field::StartTime, FieldPlacement::new(0, 150.0, 410.0)),
            (Field::EndTime, FieldPlacement::new(0, 400.0, 410.0)),
            // Page 2: activity
            (Field::Description, FieldPlacement::new(1, 50.0, 150.0)),
            (Field::Plant, FieldPlacement::new(1, 50.0, 200.0)),
            (Field::Methodology, FieldPlacement::new(1, 50.0, 300.0)),
        ]);

        Self {
            fields,
            table: TableRegion::default(),
            image: ImageRegion::default(),
        }
    }
}

/// What a skipped placement was meant to draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementTarget {
    Field(Field),
    HazardTable,
    Diagram,
}

impl fmt::Display for PlacementTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlacementTarget::Field(field) => write!(f, "field '{}'", field),
            PlacementTarget::HazardTable => f.write_str("hazard table"),
            PlacementTarget::Diagram => f.write_str("diagram"),
        }
    }
}

/// A placement the template could not take because the page is missing.
///
/// These are not errors: the run carries on without them and hands the
/// list back so callers can spot a layout that no longer fits its template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPlacement {
    pub target: PlacementTarget,
    /// Zero-based page index that was asked for
    pub page: usize,
    /// Pages the template actually has
    pub page_count: usize,
}

impl SkippedPlacement {
    pub fn new(target: PlacementTarget, page: usize, page_count: usize) -> Self {
        Self {
            target,
            page,
            page_count,
        }
    }
}

impl fmt::Display for SkippedPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} targets page {} but the template has {} pages",
            self.target, self.page, self.page_count
        )
    }
}

fn default_font_size() -> f32 {
    DEFAULT_FONT_SIZE
}

impl LayoutConfig {
    /// Load and validate a layout from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            TmpError::Config(format!("Failed to read layout {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a layout from a TOML string.
    ///
    /// Sections that are left out keep their defaults; a `[fields]` table,
    /// when present, replaces the default field set entirely.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let layout: LayoutConfig = toml::from_str(s)
            .map_err(|e| TmpError::Config(format!("Failed to parse layout: {}", e)))?;
        layout.validate()?;
        Ok(layout)
    }

    /// Reject layouts that cannot produce a sensible document
    pub fn validate(&self) -> Result<()> {
        for (field, placement) in &self.fields {
            check_finite(field.name(), &[placement.x, placement.y])?;
            check_positive(&format!("{} font_size", field), placement.font_size)?;
        }

        let table = &self.table;
        check_finite(
            "table",
            &[
                table.origin_y,
                table.label_x,
                table.score_x,
                table.controls_x,
                table.residual_x,
            ],
        )?;
        check_positive("table row_height", table.row_height)?;
        check_positive("table font_size", table.font_size)?;
        check_positive("table annotation_font_size", table.annotation_font_size)?;

        let rect = &self.image.rect;
        check_finite("image rect", &[rect.x0, rect.y0, rect.x1, rect.y1])?;
        if rect.width() <= 0.0 || rect.height() <= 0.0 {
            return Err(TmpError::Config(format!(
                "image rect [{}, {}, {}, {}] has no area",
                rect.x0, rect.y0, rect.x1, rect.y1
            )));
        }

        Ok(())
    }

    /// Highest page index any placement refers to, for template checks
    pub fn max_page_index(&self) -> usize {
        let field_max = self.fields.values().map(|p| p.page).max().unwrap_or(0);
        let image = match self.image.page {
            PageRef::Index(index) => index,
            PageRef::Anchor(_) => 0,
        };
        field_max.max(self.table.page).max(image)
    }
}

fn check_finite(what: &str, values: &[f32]) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(TmpError::Config(format!(
            "{} has a non-finite coordinate",
            what
        )))
    }
}

fn check_positive(what: &str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(TmpError::Config(format!(
            "{} must be positive, got {}",
            what, value
        )))
    }
}
