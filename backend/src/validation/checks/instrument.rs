//! `#INSTRUMENT` and `#LOCATION` checks.

use async_trait::async_trait;
use tracing::debug;

use super::{is_placeholder, Check, CheckContext, UNKNOWN};
use crate::error::RunResult;
use crate::validation::graph::CheckId;
use crate::validation::report::{Diagnostic, DiagnosticCode};

const INSTRUMENT: &str = "INSTRUMENT";
const LOCATION: &str = "LOCATION";

const LATITUDE_RANGE: (f64, f64) = (-90.0, 90.0);
const LONGITUDE_RANGE: (f64, f64) = (-180.0, 180.0);
const HEIGHT_RANGE: (f64, f64) = (-50.0, 5100.0);

/// Instrument name and model: placeholders become `UNKNOWN`, other values
/// must be known to the registry. Only ever warns.
pub struct InstrumentNameModelCheck;

#[async_trait]
impl Check for InstrumentNameModelCheck {
    fn id(&self) -> CheckId {
        CheckId::InstrumentNameModel
    }

    async fn run(&self, ctx: &mut CheckContext<'_>) -> RunResult<bool> {
        let line = ctx.value_line(INSTRUMENT);
        let mut success = true;

        if is_placeholder(ctx.record.instrument_name.as_deref()) {
            ctx.record.instrument_name = Some(UNKNOWN.to_string());
            success &= !ctx.add(Diagnostic::new(DiagnosticCode::InstrumentNameMissing, line));
        } else {
            let name = ctx.record.instrument_name.clone().unwrap_or_default();
            let names = ctx.distinct("instrument", "name").await?;
            if !names.contains(&name) {
                success &= !ctx.add(
                    Diagnostic::new(DiagnosticCode::InstrumentNameUnknown, line).with("value", name),
                );
            }
        }

        if is_placeholder(ctx.record.instrument_model.as_deref()) {
            ctx.record.instrument_model = Some(UNKNOWN.to_string());
            success &= !ctx.add(Diagnostic::new(DiagnosticCode::InstrumentModelMissing, line));
        } else {
            let model = ctx.record.instrument_model.clone().unwrap_or_default();
            let models = ctx.distinct("instrument", "model").await?;
            if !models.contains(&model) {
                success &= !ctx.add(Diagnostic::new(DiagnosticCode::InstrumentModelUnknown, line));
            }
        }

        Ok(success)
    }
}

/// The full instrument identifier must be registered exactly once.
pub struct InstrumentCheck;

impl InstrumentCheck {
    /// `name:model:number:dataset:station:agency:project`.
    pub fn identifier(ctx: &CheckContext<'_>) -> String {
        let record = &ctx.record;
        [
            record.instrument_name.as_deref().unwrap_or(UNKNOWN),
            record.instrument_model.as_deref().unwrap_or(UNKNOWN),
            record.instrument_number.as_deref().unwrap_or(UNKNOWN),
            record.dataset.as_str(),
            record.station_id.as_str(),
            record.agency.as_str(),
            record.project.as_str(),
        ]
        .join(":")
    }
}

#[async_trait]
impl Check for InstrumentCheck {
    fn id(&self) -> CheckId {
        CheckId::Instrument
    }

    async fn run(&self, ctx: &mut CheckContext<'_>) -> RunResult<bool> {
        if is_placeholder(ctx.record.instrument_number.as_deref()) {
            ctx.record.instrument_number = Some(UNKNOWN.to_string());
        }

        let ident = Self::identifier(ctx);
        debug!("Looking up instrument {}", ident);
        let instruments = ctx.find("instrument", "identifier", &ident).await?;
        ctx.record.instrument_id = Some(ident);
        if instruments.len() == 1 {
            return Ok(true);
        }
        let line = ctx.value_line(INSTRUMENT);
        Ok(!ctx.add(Diagnostic::new(DiagnosticCode::InstrumentNotFound, line)))
    }
}

/// Coordinate ranges and distance from the registered instrument.
pub struct LocationCheck;

fn parse_number(value: Option<&str>) -> Option<f64> {
    value.and_then(|v| v.trim().parse::<f64>().ok())
}

/// True for values outside the inclusive range, and for NaN.
fn out_of_range(value: f64, (lower, upper): (f64, f64)) -> bool {
    !(lower..=upper).contains(&value)
}

impl LocationCheck {
    /// Parse and range-check one coordinate, nulling it when not numeric.
    fn check_coordinate(
        ctx: &mut CheckContext<'_>,
        field: &str,
        raw: Option<String>,
        range: (f64, f64),
        line: usize,
    ) -> (Option<f64>, bool) {
        let Some(value) = parse_number(raw.as_deref()) else {
            let failed = ctx.add(Diagnostic::new(DiagnosticCode::CoordinateNotNumeric, line).with("field", field));
            return (None, !failed);
        };
        if out_of_range(value, range) {
            let failed = ctx.add(
                Diagnostic::new(DiagnosticCode::CoordinateOutOfRange, line)
                    .with("field", field)
                    .with("lower", range.0)
                    .with("upper", range.1),
            );
            return (Some(value), !failed);
        }
        (Some(value), true)
    }
}

#[async_trait]
impl Check for LocationCheck {
    fn id(&self) -> CheckId {
        CheckId::Location
    }

    async fn run(&self, ctx: &mut CheckContext<'_>) -> RunResult<bool> {
        let line = ctx.value_line(LOCATION);

        let raw = ctx.record.latitude.clone();
        let (lat, lat_ok) = Self::check_coordinate(ctx, "Latitude", raw, LATITUDE_RANGE, line);
        if lat.is_none() {
            ctx.record.latitude = None;
        }
        let raw = ctx.record.longitude.clone();
        let (lon, lon_ok) = Self::check_coordinate(ctx, "Longitude", raw, LONGITUDE_RANGE, line);
        if lon.is_none() {
            ctx.record.longitude = None;
        }
        let mut success = lat_ok && lon_ok;

        let mut height = None;
        if ctx.record.height.as_deref().is_some_and(|h| !h.trim().is_empty()) {
            height = parse_number(ctx.record.height.as_deref());
            match height {
                None => {
                    ctx.record.height = None;
                    success &= !ctx.add(Diagnostic::new(DiagnosticCode::HeightNotNumeric, line));
                }
                Some(h) if out_of_range(h, HEIGHT_RANGE) => {
                    success &= !ctx.add(
                        Diagnostic::new(DiagnosticCode::HeightOutOfRange, line)
                            .with("lower", HEIGHT_RANGE.0)
                            .with("upper", HEIGHT_RANGE.1),
                    );
                }
                Some(_) => {}
            }
        }

        if !success {
            return Ok(false);
        }

        if ctx.record.station_type == "SHP" && ctx.settings.ships_ignore_location {
            debug!("Skipping location comparison for ship");
            return Ok(true);
        }

        let ident = ctx.record.instrument_id.clone().unwrap_or_default();
        let instruments = ctx.find("instrument", "identifier", &ident).await?;
        let Some(geometry) = instruments.into_iter().next().and_then(|doc| doc.geometry) else {
            return Ok(true);
        };

        let settings = ctx.settings;
        if let (Some(lat), Some(reference)) = (lat, geometry.latitude()) {
            if (lat - reference).abs() >= settings.latitude_error_distance {
                success &= !ctx.add(Diagnostic::new(DiagnosticCode::CoordinateTooFar, line).with("field", "Latitude"));
            }
        }

        let polar = lat.is_some_and(|l| l.abs() > 90.0 - settings.polar_latitude_range);
        let ignore_longitude = polar && settings.polar_ignore_longitude;
        if let (Some(lon), Some(reference)) = (lon, geometry.longitude()) {
            if !ignore_longitude && (lon - reference).abs() >= settings.longitude_error_distance {
                success &= !ctx.add(Diagnostic::new(DiagnosticCode::CoordinateTooFar, line).with("field", "Longitude"));
            }
        }

        if let (Some(h), Some(reference)) = (height, geometry.height()) {
            if (h - reference).abs() >= settings.height_error_distance {
                success &= !ctx.add(Diagnostic::new(DiagnosticCode::HeightTooFar, line));
            }
        }

        Ok(success)
    }
}
