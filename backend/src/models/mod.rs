//! Domain models for the validation service.
//!
//! - [`CellValue`] - Typed Extended CSV cell
//! - [`SubmissionRecord`] - Mutable working copy of the metadata under validation
//! - [`Document`] - Reference registry document

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::parser::ExtCsv;

// =============================================================================
// Cell Values
// =============================================================================

/// Typed value of one Extended CSV cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    /// Empty cell or absent column.
    #[default]
    Missing,
    Text(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl CellValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Missing)
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            CellValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            CellValue::Time(t) => Some(*t),
            _ => None,
        }
    }

    /// Text form, `None` when missing.
    pub fn to_text(&self) -> Option<String> {
        match self {
            CellValue::Missing => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Missing => Ok(()),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::Float(x) => write!(f, "{}", format_float(*x)),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            CellValue::Time(t) => write!(f, "{}", t.format("%H:%M:%S")),
        }
    }
}

/// Render a float the way level labels are written (`1.0`, `2.5`).
pub fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

// =============================================================================
// Submission Record
// =============================================================================

/// Metadata fields that a submission must provide.
///
/// Required tables and the fields each must define. Optional fields
/// (`DATA_GENERATION.Version`, `LOCATION.Height`, `TIMESTAMP.Time`) are read
/// when present.
pub const REQUIRED_FIELDS: &[(&str, &[&str])] = &[
    ("CONTENT", &["Class", "Category", "Level", "Form"]),
    ("DATA_GENERATION", &["Date", "Agency"]),
    ("PLATFORM", &["Type", "ID", "Name", "Country"]),
    ("INSTRUMENT", &["Name", "Model", "Number"]),
    ("LOCATION", &["Latitude", "Longitude"]),
    ("TIMESTAMP", &["Date"]),
];

/// Why a record could not be extracted from a document.
#[derive(Debug, Clone, PartialEq)]
pub enum MissingMetadata {
    Table(String),
    Field { table: String, field: String },
}

/// Mutable working copy of the metadata fields under validation.
///
/// Checks normalise fields in place; a rewritten field is what dependent
/// checks see.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionRecord {
    pub project: String,
    pub dataset: String,
    pub level: CellValue,
    pub form: CellValue,
    pub agency: String,
    pub generation_date: CellValue,
    pub generation_version: Option<String>,
    pub station_type: String,
    pub station_id: String,
    pub station_name: String,
    pub country: Option<String>,
    pub instrument_name: Option<String>,
    pub instrument_model: Option<String>,
    pub instrument_number: Option<String>,
    /// Derived by the instrument check.
    pub instrument_id: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub height: Option<String>,
    pub timestamp_date: CellValue,
    pub timestamp_time: CellValue,
}

impl SubmissionRecord {
    /// Extract the metadata fields from a parsed document.
    pub fn from_extcsv(doc: &ExtCsv) -> Result<Self, MissingMetadata> {
        for (table, fields) in REQUIRED_FIELDS {
            let t = doc
                .table(table)
                .ok_or_else(|| MissingMetadata::Table(table.to_string()))?;
            if let Some(field) = fields.iter().find(|f| !t.has_field(f)) {
                return Err(MissingMetadata::Field {
                    table: table.to_string(),
                    field: field.to_string(),
                });
            }
        }

        let cell = |table: &str, field: &str| -> CellValue {
            doc.table(table)
                .and_then(|t| t.first(field))
                .cloned()
                .unwrap_or_default()
        };
        let text = |table: &str, field: &str| cell(table, field).to_text();

        Ok(Self {
            project: text("CONTENT", "Class").unwrap_or_default(),
            dataset: text("CONTENT", "Category").unwrap_or_default(),
            level: cell("CONTENT", "Level"),
            form: cell("CONTENT", "Form"),
            agency: text("DATA_GENERATION", "Agency").unwrap_or_default(),
            generation_date: cell("DATA_GENERATION", "Date"),
            generation_version: text("DATA_GENERATION", "Version"),
            station_type: text("PLATFORM", "Type").unwrap_or_default(),
            station_id: text("PLATFORM", "ID").unwrap_or_default(),
            station_name: text("PLATFORM", "Name").unwrap_or_default(),
            country: text("PLATFORM", "Country"),
            instrument_name: text("INSTRUMENT", "Name"),
            instrument_model: text("INSTRUMENT", "Model"),
            instrument_number: text("INSTRUMENT", "Number"),
            instrument_id: None,
            latitude: text("LOCATION", "Latitude"),
            longitude: text("LOCATION", "Longitude"),
            height: text("LOCATION", "Height"),
            timestamp_date: cell("TIMESTAMP", "Date"),
            timestamp_time: cell("TIMESTAMP", "Time"),
        })
    }
}

// =============================================================================
// Registry Documents
// =============================================================================

/// Point geometry of a registry document.
///
/// Coordinates are `[longitude, latitude, height]`; any component may be null.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Geometry {
    #[serde(default)]
    pub coordinates: Vec<Option<f64>>,
}

impl Geometry {
    pub fn longitude(&self) -> Option<f64> {
        self.coordinates.first().copied().flatten()
    }

    pub fn latitude(&self) -> Option<f64> {
        self.coordinates.get(1).copied().flatten()
    }

    pub fn height(&self) -> Option<f64> {
        self.coordinates.get(2).copied().flatten()
    }
}

/// A reference registry document (the `_source` of a search hit).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
}

impl Document {
    /// A string property, if present and a string.
    pub fn property_str(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(Value::as_str)
    }
}

// =============================================================================
// Tests
// =============================================================================
