//! `#DATA_GENERATION` and time-series checks.

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{Check, CheckContext};
use crate::error::RunResult;
use crate::models::CellValue;
use crate::validation::graph::CheckId;
use crate::validation::report::{Diagnostic, DiagnosticCode};

const DATA_GENERATION: &str = "DATA_GENERATION";

/// Version used when the submitted one is unusable.
pub const DEFAULT_VERSION: &str = "1.0";

const VERSION_RANGE: (f64, f64) = (0.0, 20.0);

/// Generation date presence and version format.
pub struct DataGenerationCheck;

#[async_trait]
impl Check for DataGenerationCheck {
    fn id(&self) -> CheckId {
        CheckId::DataGeneration
    }

    async fn run(&self, ctx: &mut CheckContext<'_>) -> RunResult<bool> {
        let line = ctx.value_line(DATA_GENERATION);
        let mut success = true;

        if ctx.record.generation_date.is_missing() {
            success &= !ctx.add(Diagnostic::new(DiagnosticCode::GenerationDateMissing, line));
        }

        let raw = ctx.record.generation_version.clone().unwrap_or_default();
        let Ok(version) = raw.trim().parse::<f64>() else {
            ctx.record.generation_version = Some(DEFAULT_VERSION.to_string());
            ctx.add(Diagnostic::new(DiagnosticCode::VersionNotNumeric, line).with("default", DEFAULT_VERSION));
            return Ok(false);
        };

        if !(VERSION_RANGE.0..=VERSION_RANGE.1).contains(&version) {
            success &= !ctx.add(
                Diagnostic::new(DiagnosticCode::VersionOutOfRange, line)
                    .with("lower", format!("{:.1}", VERSION_RANGE.0))
                    .with("upper", format!("{:.1}", VERSION_RANGE.1)),
            );
        }

        if raw.trim() == (version as i64).to_string() {
            success &= !ctx.add(Diagnostic::new(DiagnosticCode::VersionWithoutFraction, line));
        }

        Ok(success)
    }
}

/// Observation dates must not follow the generation date, and observation
/// times must not precede the `#TIMESTAMP` time.
pub struct TimeSeriesCheck;

#[async_trait]
impl Check for TimeSeriesCheck {
    fn id(&self) -> CheckId {
        CheckId::TimeSeries
    }

    async fn run(&self, ctx: &mut CheckContext<'_>) -> RunResult<bool> {
        let generated = ctx.record.generation_date.as_date();
        let reference_time = ctx.record.timestamp_time.as_time();
        let mut found = Vec::new();

        for table in ctx.extcsv.tables.iter().filter(|t| t.name != DATA_GENERATION) {
            let date_code = if table.name.starts_with("TIMESTAMP") {
                DiagnosticCode::TimestampDateAfterGeneration
            } else {
                DiagnosticCode::DateAfterGeneration
            };

            for (line, value) in table.column("Date") {
                if date_after(value, generated) {
                    found.push(Diagnostic::new(date_code, line).with("table", &table.name));
                }
            }

            if let Some(reference) = reference_time {
                for (line, value) in table.column("Time") {
                    if value.as_time().is_some_and(|t| t < reference) {
                        found.push(Diagnostic::new(DiagnosticCode::TimeBeforeTimestamp, line));
                    }
                }
            }
        }

        let mut success = true;
        for diagnostic in found {
            success &= !ctx.add(diagnostic);
        }
        Ok(success)
    }
}

/// Whether a date cell fails against the generation date. Empty and
/// non-date cells are not comparable and always fail.
fn date_after(value: &CellValue, generated: Option<NaiveDate>) -> bool {
    match (value.as_date(), generated) {
        (Some(date), Some(generated)) => date > generated,
        _ => true,
    }
}
