//! Risk register table layout
//!
//! Rows are stacked downward from the region's origin, one fixed row height
//! apart. Nothing bounds them by the bottom of the page, so a long enough
//! selection runs off it.

use crate::error::Result;
use crate::hazards::HazardRow;
use crate::layout::{PlacementTarget, SkippedPlacement, TableRegion};
use crate::template::TemplateDocument;
use tracing::{debug, warn};

/// Outcome of laying out the hazard table
#[derive(Debug, Clone, PartialEq)]
pub enum TableOutcome {
    /// Baseline y (top-left origin) of each row, in row order
    Placed(Vec<f32>),
    /// The table page is not in the template
    Skipped(SkippedPlacement),
}

/// Baseline y of each of `count` rows
pub fn row_positions(origin_y: f32, row_height: f32, count: usize) -> Vec<f32> {
    (0..count)
        .map(|i| origin_y + i as f32 * row_height)
        .collect()
}

/// Table cells are single-line; line breaks collapse to spaces
fn cell_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn layout_hazard_table(
    document: &mut TemplateDocument,
    rows: &[HazardRow],
    region: &TableRegion,
) -> Result<TableOutcome> {
    let page_count = document.page_count();
    if region.page >= page_count {
        let skipped = SkippedPlacement::new(PlacementTarget::HazardTable, region.page, page_count);
        warn!(%skipped, "Skipping hazard table");
        return Ok(TableOutcome::Skipped(skipped));
    }

    let positions = row_positions(region.origin_y, region.row_height, rows.len());
    for (row, &y) in rows.iter().zip(&positions) {
        document.draw_text(
            region.page,
            region.label_x,
            y,
            region.font_size,
            &cell_text(&row.label),
        )?;
        if let Some(score) = row.score {
            document.draw_text(
                region.page,
                region.score_x,
                y,
                region.font_size,
                &score.to_string(),
            )?;
        }
        let controls = cell_text(&row.controls);
        if !controls.is_empty() {
            document.draw_text(
                region.page,
                region.controls_x,
                y,
                region.annotation_font_size,
                &controls,
            )?;
        }
        if let Some(residual) = row.residual {
            document.draw_text(
                region.page,
                region.residual_x,
                y,
                region.font_size,
                &residual.to_string(),
            )?;
        }
        debug!(label = %row.label, y, "Placed hazard row");
    }

    Ok(TableOutcome::Placed(positions))
}
