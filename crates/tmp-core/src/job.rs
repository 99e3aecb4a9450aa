//! Job record: the operator-supplied data a TMP is filled from

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Road level classification as printed on the general form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoadLevel {
    #[serde(alias = "Low Volume")]
    LowVolume,
    #[serde(alias = "Level 1")]
    Level1,
    #[serde(alias = "Level 2")]
    Level2,
    #[serde(alias = "Level 3")]
    Level3,
}

impl RoadLevel {
    pub fn label(&self) -> &'static str {
        match self {
            RoadLevel::LowVolume => "Low Volume",
            RoadLevel::Level1 => "Level 1",
            RoadLevel::Level2 => "Level 2",
            RoadLevel::Level3 => "Level 3",
        }
    }
}

impl fmt::Display for RoadLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobRecord {
    /// TMP reference number, e.g. "150126001"
    pub reference: String,
    /// RCA / contract reference
    pub contract_reference: String,
    pub road_name: String,
    pub suburb: String,
    pub road_level: Option<RoadLevel>,
    /// Permanent speed limit in km/h
    pub speed: Option<u32>,
    /// Average annual daily traffic
    pub aadt: Option<u32>,
    pub start_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_date: Option<NaiveDate>,
    pub end_time: Option<NaiveTime>,
    pub description: String,
    pub plant: String,
    pub methodology: String,
}

/// Logical fields a layout can place on the template
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Reference,
    ContractReference,
    RoadName,
    Suburb,
    RoadLevel,
    Speed,
    Aadt,
    StartDate,
    EndDate,
    StartTime,
    EndTime,
    Description,
    Plant,
    Methodology,
}

impl Field {
    pub const ALL: [Field; 14] = [
        Field::Reference,
        Field::ContractReference,
        Field::RoadName,
        Field::Suburb,
        Field::RoadLevel,
        Field::Speed,
        Field::Aadt,
        Field::StartDate,
        Field::EndDate,
        Field::StartTime,
        Field::EndTime,
        Field::Description,
        Field::Plant,
        Field::Methodology,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Reference => "reference",
            Field::ContractReference => "contract_reference",
            Field::RoadName => "road_name",
            Field::Suburb => "suburb",
            Field::RoadLevel => "road_level",
            Field::Speed => "speed",
            Field::Aadt => "aadt",
            Field::StartDate => "start_date",
            Field::EndDate => "end_date",
            Field::StartTime => "start_time",
            Field::EndTime => "end_time",
            Field::Description => "description",
            Field::Plant => "plant",
            Field::Methodology => "methodology",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn non_blank(s: &str) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

impl JobRecord {
    /// Plain-text rendering of a field, `None` when there is nothing to print.
    ///
    /// Dates render as `YYYY-MM-DD`, times as `HH:MM:SS`, numbers without
    /// grouping.
    pub fn field_text(&self, field: Field) -> Option<String> {
        match field {
            Field::Reference => non_blank(&self.reference),
            Field::ContractReference => non_blank(&self.contract_reference),
            Field::RoadName => non_blank(&self.road_name),
            Field::Suburb => non_blank(&self.suburb),
            Field::RoadLevel => self.road_level.map(|level| level.to_string()),
            Field::Speed => self.speed.map(|v| v.to_string()),
            Field::Aadt => self.aadt.map(|v| v.to_string()),
            Field::StartDate => self.start_date.map(|d| d.format("%Y-%m-%d").to_string()),
            Field::EndDate => self.end_date.map(|d| d.format("%Y-%m-%d").to_string()),
            Field::StartTime => self.start_time.map(|t| t.format("%H:%M:%S").to_string()),
            Field::EndTime => self.end_time.map(|t| t.format("%H:%M:%S").to_string()),
            Field::Description => non_blank(&self.description),
            Field::Plant => non_blank(&self.plant),
            Field::Methodology => non_blank(&self.methodology),
        }
    }
}
