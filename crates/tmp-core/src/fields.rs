//! Field mapping: job record values onto their configured placements

use crate::error::Result;
use crate::job::JobRecord;
use crate::layout::{LayoutConfig, PlacementTarget, SkippedPlacement};
use crate::template::TemplateDocument;
use tracing::{debug, warn};

/// Write every configured field of `record` into the document.
///
/// Placements on pages the template does not have are skipped and
/// returned; blank values are skipped without a trace. Text is placed
/// verbatim with no wrapping, but explicit line breaks start a new line.
pub fn apply(
    document: &mut TemplateDocument,
    record: &JobRecord,
    layout: &LayoutConfig,
) -> Result<Vec<SkippedPlacement>> {
    let page_count = document.page_count();
    let mut skipped = Vec::new();

    for (field, placement) in &layout.fields {
        if placement.page >= page_count {
            let skip =
                SkippedPlacement::new(PlacementTarget::Field(*field), placement.page, page_count);
            warn!(%skip, "Skipping field placement");
            skipped.push(skip);
            continue;
        }

        let Some(mut text) = record.field_text(*field) else {
            continue;
        };
        if let Some(suffix) = &placement.suffix {
            text.push_str(suffix);
        }

        let lines = document.draw_lines(
            placement.page,
            placement.x,
            placement.y,
            placement.font_size,
            &text,
        )?;
        debug!(%field, page = placement.page, lines, "Placed field");
    }

    Ok(skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Field, RoadLevel};
    use crate::layout::FieldPlacement;
    use crate::test_support::template_pdf;
    use pretty_assertions::assert_eq;

    fn job() -> JobRecord {
        JobRecord {
            reference: "150126001".into(),
            road_name: "Meremere Road".into(),
            road_level: Some(RoadLevel::LowVolume),
            speed: Some(100),
            methodology: "Mobile Operation for install/removal.\nStop/Go for works.".into(),
            ..Default::default()
        }
    }

    fn emitted_text(document: TemplateDocument, page: usize) -> Vec<String> {
        let bytes = document.emit().unwrap();
        TemplateDocument::load_mem(&bytes)
            .unwrap()
            .page_text(page)
            .unwrap()
    }

    #[test]
    fn test_fields_land_on_their_pages() {
        let mut document = TemplateDocument::load_mem(&template_pdf(2)).unwrap();
        let skipped = apply(&mut document, &job(), &LayoutConfig::default()).unwrap();
        assert!(skipped.is_empty());

        let bytes = document.emit().unwrap();
        let reloaded = TemplateDocument::load_mem(&bytes).unwrap();
        let page0 = reloaded.page_text(0).unwrap();
        assert!(page0.contains(&"150126001".to_string()));
        assert!(page0.contains(&"Meremere Road".to_string()));
        assert!(page0.contains(&"Low Volume".to_string()));
        assert!(page0.contains(&"100 km/h".to_string()));

        let page1 = reloaded.page_text(1).unwrap();
        assert!(page1.contains(&"Mobile Operation for install/removal.".to_string()));
        assert!(page1.contains(&"Stop/Go for works.".to_string()));
    }

    #[test]
    fn test_blank_fields_write_nothing() {
        let mut document = TemplateDocument::load_mem(&template_pdf(2)).unwrap();
        apply(&mut document, &JobRecord::default(), &LayoutConfig::default()).unwrap();
        assert!(document.pending_pages().is_empty());
        assert_eq!(emitted_text(document, 0), vec!["Page 1".to_string()]);
    }

    #[test]
    fn test_out_of_range_fields_are_reported() {
        let mut document = TemplateDocument::load_mem(&template_pdf(1)).unwrap();
        let skipped = apply(&mut document, &job(), &LayoutConfig::default()).unwrap();

        let fields: Vec<PlacementTarget> = skipped.iter().map(|s| s.target).collect();
        assert_eq!(
            fields,
            vec![
                PlacementTarget::Field(Field::Description),
                PlacementTarget::Field(Field::Plant),
                PlacementTarget::Field(Field::Methodology),
            ]
        );
        assert!(skipped.iter().all(|s| s.page == 1 && s.page_count == 1));

        // Page 0 fields are still written
        assert!(emitted_text(document, 0).contains(&"150126001".to_string()));
    }

    #[test]
    fn test_multiline_value_advances_by_leading() {
        let mut layout = LayoutConfig::default();
        layout.fields = [(Field::Methodology, FieldPlacement::new(0, 50.0, 300.0))]
            .into_iter()
            .collect();

        let mut document = TemplateDocument::load_mem(&template_pdf(1)).unwrap();
        apply(&mut document, &job(), &layout).unwrap();
        let bytes = document.emit().unwrap();

        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        let page_id = *doc.get_pages().get(&1).unwrap();
        let content =
            lopdf::content::Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        let baselines: Vec<f32> = content
            .operations
            .iter()
            .filter(|op| op.operator == "Tm")
            .filter_map(|op| crate::overlay::number(&op.operands[5]))
            .collect();
        // 792 - 300, then one 12pt line lower
        assert_eq!(baselines.len(), 2);
        assert!((baselines[0] - 492.0).abs() < 0.01);
        assert!((baselines[1] - 480.0).abs() < 0.01);
    }
}
