//! JSON request/response seam for form front-ends
//!
//! A front-end posts one [`AssemblyRequest`] and gets a [`ProcessResult`]
//! back; binary payloads travel as base64.

use crate::engine::{AssemblyInput, TmpEngine};
use crate::error::{Result, TmpError};
use crate::hazards::HazardSelection;
use crate::job::JobRecord;
use crate::layout::SkippedPlacement;
use crate::output_file_name;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone, Deserialize)]
pub struct AssemblyRequest {
    pub job: JobRecord,
    /// Selected hazard keys, in display order
    #[serde(default)]
    pub hazards: Vec<String>,
    #[serde(default)]
    pub custom_hazard: Option<String>,
    /// Base64-encoded PNG or JPEG diagram
    #[serde(default)]
    pub diagram: Option<String>,
}

impl AssemblyRequest {
    /// Validate the selection and decode the diagram payload
    pub fn into_input(self) -> Result<AssemblyInput> {
        let hazards = HazardSelection::new(self.hazards, self.custom_hazard)?;
        let diagram = self
            .diagram
            .filter(|data| !data.trim().is_empty())
            .map(|data| {
                STANDARD
                    .decode(data.trim())
                    .map_err(|e| TmpError::ImageDecode(format!("Invalid base64 diagram: {}", e)))
            })
            .transpose()?;

        Ok(AssemblyInput {
            job: self.job,
            hazards,
            diagram,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub success: bool,
    /// Base64-encoded PDF data
    pub data: Option<String>,
    pub file_name: Option<String>,
    pub skipped: Vec<SkippedPlacement>,
    pub error: Option<String>,
    pub error_kind: Option<String>,
    pub metrics: Option<ProcessMetrics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessMetrics {
    pub input_size_bytes: usize,
    pub output_size_bytes: usize,
    pub page_count: usize,
    pub hazard_rows: usize,
    pub processing_time_ms: u64,
}

impl ProcessResult {
    fn failure(err: TmpError) -> Self {
        Self {
            success: false,
            data: None,
            file_name: None,
            skipped: Vec::new(),
            error: Some(err.to_string()),
            error_kind: Some(err.kind().to_string()),
            metrics: None,
        }
    }
}

/// Assemble one request against template bytes. Never fails: errors are
/// reported inside the result.
pub fn process_request(
    engine: &TmpEngine<'_>,
    template: &[u8],
    request: AssemblyRequest,
    now: NaiveDateTime,
) -> ProcessResult {
    let started = Instant::now();

    let input = match request.into_input() {
        Ok(input) => input,
        Err(err) => return ProcessResult::failure(err),
    };

    match engine.assemble_mem(template, &input) {
        Ok(result) => ProcessResult {
            success: true,
            file_name: Some(output_file_name(&input.job.reference, now)),
            metrics: Some(ProcessMetrics {
                input_size_bytes: template.len(),
                output_size_bytes: result.pdf.len(),
                page_count: result.report.page_count,
                hazard_rows: result.report.hazard_rows,
                processing_time_ms: started.elapsed().as_millis() as u64,
            }),
            data: Some(STANDARD.encode(&result.pdf)),
            skipped: result.report.skipped,
            error: None,
            error_kind: None,
        },
        Err(err) => ProcessResult::failure(err),
    }
}
