//! Assembly engine
//!
//! One assembly is a single pass through fixed stages:
//!
//! ```text
//! Idle -> Loaded -> Mapped -> LaidOut -> Composited -> Serialized
//! ```
//!
//! Any error ends the run where it happened. Nothing is serialized for a
//! failed run, so whatever was drawn up to that point is dropped with the
//! document.

use crate::catalog::HazardCatalog;
use crate::diagram;
use crate::error::Result;
use crate::fields;
use crate::hazards::{self, HazardRow, HazardSelection};
use crate::job::JobRecord;
use crate::layout::{LayoutConfig, SkippedPlacement};
use crate::table::{self, TableOutcome};
use crate::template::TemplateDocument;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Loaded,
    Mapped,
    LaidOut,
    Composited,
    Serialized,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Loaded => "loaded",
            Stage::Mapped => "mapped",
            Stage::LaidOut => "laid-out",
            Stage::Composited => "composited",
            Stage::Serialized => "serialized",
        };
        f.write_str(name)
    }
}

/// Everything a caller supplies for one TMP
#[derive(Debug, Clone, Default)]
pub struct AssemblyInput {
    pub job: JobRecord,
    pub hazards: HazardSelection,
    /// Encoded diagram image, already read into memory
    pub diagram: Option<Vec<u8>>,
}

/// What happened during a run, besides the document itself
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssemblyReport {
    pub page_count: usize,
    pub hazard_rows: usize,
    /// Baseline y of each hazard row, empty when the table was skipped
    pub row_positions: Vec<f32>,
    pub diagram_placed: bool,
    pub skipped: Vec<SkippedPlacement>,
}

/// A finished TMP
#[derive(Debug, Clone)]
pub struct AssemblyResult {
    pub pdf: Vec<u8>,
    pub report: AssemblyReport,
}

/// A template with every stage applied, waiting to be serialized
#[derive(Debug)]
pub struct ComposedDocument {
    document: TemplateDocument,
    rows: Vec<HazardRow>,
    report: AssemblyReport,
}

impl ComposedDocument {
    pub fn rows(&self) -> &[HazardRow] {
        &self.rows
    }

    pub fn report(&self) -> &AssemblyReport {
        &self.report
    }

    pub fn emit(self) -> Result<AssemblyResult> {
        let pdf = self.document.emit()?;
        debug!(from = %Stage::Composited, to = %Stage::Serialized, "Stage transition");
        info!(bytes = pdf.len(), "TMP assembled");
        Ok(AssemblyResult {
            pdf,
            report: self.report,
        })
    }

    pub fn save<P: AsRef<Path>>(self, path: P) -> Result<AssemblyReport> {
        let path = path.as_ref();
        self.document.save(path)?;
        debug!(from = %Stage::Composited, to = %Stage::Serialized, "Stage transition");
        info!(path = %path.display(), "TMP assembled");
        Ok(self.report)
    }
}

/// Shared, read-only assembly engine.
///
/// Holds the hazard catalog and layout; every run brings its own template
/// document, so one engine can serve concurrent runs.
#[derive(Debug, Clone)]
pub struct TmpEngine<'c> {
    catalog: &'c HazardCatalog,
    layout: LayoutConfig,
}

impl TmpEngine<'static> {
    /// Standard catalog with the default template layout
    pub fn standard() -> Self {
        Self {
            catalog: HazardCatalog::standard(),
            layout: LayoutConfig::default(),
        }
    }
}

impl<'c> TmpEngine<'c> {
    pub fn new(catalog: &'c HazardCatalog, layout: LayoutConfig) -> Result<Self> {
        layout.validate()?;
        Ok(Self { catalog, layout })
    }

    pub fn catalog(&self) -> &HazardCatalog {
        self.catalog
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    /// Run every drawing stage against an already loaded template
    pub fn compose(
        &self,
        mut document: TemplateDocument,
        input: &AssemblyInput,
    ) -> Result<ComposedDocument> {
        info!(
            reference = %input.job.reference,
            hazards = input.hazards.keys().len(),
            diagram = input.diagram.is_some(),
            "Assembling TMP"
        );
        debug!(from = %Stage::Idle, to = %Stage::Loaded, "Stage transition");

        // Resolve before drawing anything so a bad key leaves the document untouched
        let rows = hazards::resolve(&input.hazards, self.catalog)?;

        let mut skipped = fields::apply(&mut document, &input.job, &self.layout)?;
        debug!(from = %Stage::Loaded, to = %Stage::Mapped, "Stage transition");

        let row_positions =
            match table::layout_hazard_table(&mut document, &rows, &self.layout.table)? {
                TableOutcome::Placed(positions) => positions,
                TableOutcome::Skipped(skip) => {
                    skipped.push(skip);
                    Vec::new()
                }
            };
        debug!(from = %Stage::Mapped, to = %Stage::LaidOut, "Stage transition");

        let mut diagram_placed = false;
        if let Some(bytes) = &input.diagram {
            match diagram::overlay_image(&mut document, bytes, &self.layout.image)? {
                Some(skip) => skipped.push(skip),
                None => diagram_placed = true,
            }
        }
        debug!(from = %Stage::LaidOut, to = %Stage::Composited, "Stage transition");

        let report = AssemblyReport {
            page_count: document.page_count(),
            hazard_rows: rows.len(),
            row_positions,
            diagram_placed,
            skipped,
        };
        Ok(ComposedDocument {
            document,
            rows,
            report,
        })
    }

    /// Load the template at `path` and assemble it into bytes
    pub fn assemble<P: AsRef<Path>>(&self, path: P, input: &AssemblyInput) -> Result<AssemblyResult> {
        let document = TemplateDocument::load(path)?;
        self.compose(document, input)?.emit()
    }

    /// Assemble from template bytes already in memory
    pub fn assemble_mem(&self, template: &[u8], input: &AssemblyInput) -> Result<AssemblyResult> {
        let document = TemplateDocument::load_mem(template)?;
        self.compose(document, input)?.emit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TmpError;
    use crate::layout::PlacementTarget;
    use crate::test_support::{png_bytes, template_pdf};
    use pretty_assertions::assert_eq;

    fn input(keys: &[&str], custom: Option<&str>) -> AssemblyInput {
        AssemblyInput {
            job: JobRecord {
                reference: "150126001".into(),
                road_name: "Meremere Road".into(),
                speed: Some(100),
                ..Default::default()
            },
            hazards: HazardSelection::new(keys.iter().copied(), custom.map(String::from))
                .unwrap(),
            diagram: None,
        }
    }

    #[test]
    fn test_standard_engine_layout_is_valid() {
        let engine = TmpEngine::standard();
        engine.layout().validate().unwrap();
        assert_eq!(engine.catalog().len(), 6);
    }

    #[test]
    fn test_new_rejects_invalid_layout() {
        let mut layout = LayoutConfig::default();
        layout.table.row_height = -1.0;
        let err = TmpEngine::new(HazardCatalog::standard(), layout).unwrap_err();
        assert!(matches!(err, TmpError::Config(_)));
    }

    #[test]
    fn test_meremere_scenario() {
        let engine = TmpEngine::standard();
        let result = engine
            .assemble_mem(&template_pdf(8), &input(&["lvr", "pedestrian"], None))
            .unwrap();

        assert_eq!(result.report.hazard_rows, 3);
        assert_eq!(result.report.row_positions, vec![200.0, 240.0, 280.0]);
        assert!(!result.report.diagram_placed);
        assert!(result.report.skipped.is_empty());

        let reloaded = TemplateDocument::load_mem(&result.pdf).unwrap();
        assert_eq!(reloaded.page_count(), 8);
        let table = reloaded.page_text(6).unwrap();
        assert!(table.contains(&"Low Volume Rural (LVR)".to_string()));
        assert!(table.contains(&"Pedestrian Interface".to_string()));
        // No diagram means the last page is untouched
        assert_eq!(reloaded.page_text(7).unwrap(), vec!["Page 8".to_string()]);
    }

    #[test]
    fn test_unknown_hazard_aborts_before_drawing() {
        let engine = TmpEngine::standard();
        let document = TemplateDocument::load_mem(&template_pdf(8)).unwrap();
        let err = engine
            .compose(document, &input(&["lvr", "meteor"], None))
            .unwrap_err();
        assert!(matches!(err, TmpError::UnknownHazardKey(ref k) if k == "meteor"));
    }

    #[test]
    fn test_short_template_skips_table_but_serializes() {
        let engine = TmpEngine::standard();
        let result = engine
            .assemble_mem(&template_pdf(2), &input(&["lvr"], None))
            .unwrap();

        assert!(result.report.row_positions.is_empty());
        assert!(result
            .report
            .skipped
            .iter()
            .any(|s| s.target == PlacementTarget::HazardTable && s.page == 6));
        assert_eq!(
            TemplateDocument::load_mem(&result.pdf).unwrap().page_count(),
            2
        );
    }

    #[test]
    fn test_diagram_is_composited_on_last_page() {
        let engine = TmpEngine::standard();
        let mut request = input(&[], None);
        request.diagram = Some(png_bytes(20, 10, 255));

        let composed = engine
            .compose(TemplateDocument::load_mem(&template_pdf(8)).unwrap(), &request)
            .unwrap();
        assert!(composed.report().diagram_placed);
        assert_eq!(composed.rows().len(), 1);

        let result = composed.emit().unwrap();
        let doc = lopdf::Document::load_mem(&result.pdf).unwrap();
        let last = *doc.get_pages().get(&8).unwrap();
        let resources = doc.get_dictionary(last).unwrap().get(b"Resources").unwrap();
        let xobjects = resources.as_dict().unwrap().get(b"XObject").unwrap();
        assert!(xobjects.as_dict().unwrap().has(b"TmpImg1"));
    }

    #[test]
    fn test_engine_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TmpEngine<'static>>();
        assert_send_sync::<AssemblyInput>();
    }

    #[test]
    fn test_concurrent_runs_share_one_engine() {
        let engine = TmpEngine::standard();
        let template = template_pdf(8);
        let first = input(&["lvr"], None);
        let second = input(&["stopgo", "height"], Some("Unmarked cable crossing"));

        let (a, b) = std::thread::scope(|scope| {
            let a = scope.spawn(|| engine.assemble_mem(&template, &first));
            let b = scope.spawn(|| engine.assemble_mem(&template, &second));
            (a.join().unwrap().unwrap(), b.join().unwrap().unwrap())
        });

        assert_eq!(a.report.hazard_rows, 2);
        assert_eq!(b.report.hazard_rows, 4);

        let a_text = TemplateDocument::load_mem(&a.pdf).unwrap().page_text(6).unwrap();
        let b_text = TemplateDocument::load_mem(&b.pdf).unwrap().page_text(6).unwrap();
        assert!(a_text.contains(&"Low Volume Rural (LVR)".to_string()));
        assert!(!a_text.contains(&"Stop/Go Operation".to_string()));
        assert!(b_text.contains(&"Stop/Go Operation".to_string()));
        assert!(b_text.contains(&"Overhead Services / Height".to_string()));
        assert!(b_text.contains(&"Unmarked cable crossing".to_string()));
        assert!(!b_text.contains(&"Low Volume Rural (LVR)".to_string()));
    }

    #[test]
    fn test_bad_diagram_fails_the_run() {
        let engine = TmpEngine::standard();
        let mut request = input(&["lvr"], None);
        request.diagram = Some(b"GIF89a nonsense".to_vec());
        let err = engine
            .assemble_mem(&template_pdf(8), &request)
            .unwrap_err();
        assert!(matches!(err, TmpError::ImageDecode(_)));
    }

    #[test]
    fn test_corrupt_template_fails_to_load() {
        let engine = TmpEngine::standard();
        let err = engine
            .assemble_mem(b"%PDF-1.7 truncated", &input(&[], None))
            .unwrap_err();
        assert!(matches!(err, TmpError::TemplateLoad(_)));
    }
}
