//! Contributor, `#PLATFORM` and deployment checks.

use async_trait::async_trait;
use tracing::debug;

use super::{Check, CheckContext};
use crate::error::RunResult;
use crate::registry::ReferenceQuery;
use crate::validation::graph::CheckId;
use crate::validation::report::{Diagnostic, DiagnosticCode};

const PLATFORM: &str = "PLATFORM";

/// Country codes meaning "at sea".
const WATER_CODES: [&str; 3] = ["*IW", "IW", "XZ"];

/// Country assigned to ships reporting no country or an at-sea code.
pub const SHIP_COUNTRY: &str = "XY";

const PLATFORM_TYPES: [&str; 2] = ["STN", "SHP"];

/// The agency must be registered exactly once for the project.
pub struct ContributorCheck;

#[async_trait]
impl Check for ContributorCheck {
    fn id(&self) -> CheckId {
        CheckId::Contributor
    }

    async fn run(&self, ctx: &mut CheckContext<'_>) -> RunResult<bool> {
        let query = ReferenceQuery::field_match("contributor", "project", &ctx.record.project)
            .and("acronym", &ctx.record.agency);
        let matches = ctx.find_where(&query).await?;
        if matches.len() == 1 {
            return Ok(true);
        }
        let line = ctx.value_line("DATA_GENERATION");
        Ok(!ctx.add(Diagnostic::new(DiagnosticCode::ContributorNotFound, line)))
    }
}

/// Station id, type, name and country against the registry.
pub struct StationCheck;

#[async_trait]
impl Check for StationCheck {
    fn id(&self) -> CheckId {
        CheckId::Station
    }

    async fn run(&self, ctx: &mut CheckContext<'_>) -> RunResult<bool> {
        let line = ctx.value_line(PLATFORM);
        let mut success = true;
        debug!("Validating station {}:{}", ctx.record.station_id, ctx.record.station_name);

        let at_sea = match ctx.record.country.as_deref() {
            None | Some("") => true,
            Some(code) => WATER_CODES.contains(&code),
        };
        if ctx.record.station_type == "SHP" && at_sea {
            ctx.record.country = Some(SHIP_COUNTRY.to_string());
            if ctx.add(Diagnostic::new(DiagnosticCode::ShipCountryCorrected, line)) {
                success = false;
            }
        }

        if ctx.record.station_id.chars().count() < 3
            && ctx.add(Diagnostic::new(DiagnosticCode::StationIdTooShort, line))
        {
            success = false;
        }
        ctx.record.station_id = format!("{:0>3}", ctx.record.station_id);

        let station_id = ctx.record.station_id.clone();
        let stations = ctx.find("station", "woudc_id", &station_id).await?;
        let station = match stations.as_slice() {
            [station] => station,
            _ => {
                ctx.add(Diagnostic::new(DiagnosticCode::StationNotFound, line));
                return Ok(false);
            }
        };

        let station_type = ctx.record.station_type.as_str();
        if !(PLATFORM_TYPES.contains(&station_type) && station.property_str("type") == Some(station_type))
            && ctx.add(Diagnostic::new(DiagnosticCode::StationTypeMismatch, line))
        {
            success = false;
        }

        if station.property_str("name") != Some(ctx.record.station_name.as_str())
            && ctx.add(Diagnostic::new(DiagnosticCode::StationNameMismatch, line))
        {
            success = false;
        }

        if !success {
            return Ok(false);
        }

        let station_country = station.property_str("country_name_en").map(str::to_string);
        let countries = match ctx.record.country.clone() {
            Some(code) => ctx.find("country", "identifier", &code).await?,
            None => Vec::new(),
        };
        let country_name = match countries.as_slice() {
            [country] => country.property_str("country_name_en").map(str::to_string),
            _ => None,
        };

        if country_name.is_none() || country_name != station_country {
            return Ok(!ctx.add(Diagnostic::new(DiagnosticCode::StationCountryMismatch, line)));
        }
        debug!("Validated with country: {:?} for id: {}", country_name, station_id);
        Ok(true)
    }
}

/// `station:agency:project` must be a registered deployment.
pub struct DeploymentCheck;

impl DeploymentCheck {
    pub fn identifier(ctx: &CheckContext<'_>) -> String {
        [
            ctx.record.station_id.as_str(),
            ctx.record.agency.as_str(),
            ctx.record.project.as_str(),
        ]
        .join(":")
    }
}

#[async_trait]
impl Check for DeploymentCheck {
    fn id(&self) -> CheckId {
        CheckId::Deployment
    }

    async fn run(&self, ctx: &mut CheckContext<'_>) -> RunResult<bool> {
        let ident = Self::identifier(ctx);
        let deployments = ctx.find("deployment", "identifier", &ident).await?;
        if deployments.len() == 1 {
            return Ok(true);
        }
        let line = ctx.value_line(PLATFORM);
        Ok(!ctx.add(Diagnostic::new(DiagnosticCode::DeploymentNotFound, line).with("ident", ident)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocationSettings;
    use crate::models::SubmissionRecord;
    use crate::parser::ExtCsv;
    use crate::registry::RegistryClient;
    use crate::validation::fixtures;

    struct Setup {
        extcsv: ExtCsv,
        registry: RegistryClient,
        settings: LocationSettings,
    }

    impl Setup {
        fn new() -> Self {
            Self {
                extcsv: fixtures::valid_extcsv(),
                registry: fixtures::registry(),
                settings: LocationSettings::default(),
            }
        }

        fn context(&self, record: SubmissionRecord) -> CheckContext<'_> {
            CheckContext::new(record, &self.extcsv, &self.registry, &self.settings)
        }
    }

    #[tokio::test]
    async fn test_valid_platform() {
        let setup = Setup::new();
        let mut ctx = setup.context(fixtures::valid_record());
        assert!(ContributorCheck.run(&mut ctx).await.unwrap());
        assert!(StationCheck.run(&mut ctx).await.unwrap());
        assert!(DeploymentCheck.run(&mut ctx).await.unwrap());
        assert!(ctx.report.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_agency() {
        let setup = Setup::new();
        let mut record = fixtures::valid_record();
        record.agency = "NOAA".into();
        let mut ctx = setup.context(record);
        assert!(!ContributorCheck.run(&mut ctx).await.unwrap());
        let diag = ctx.report.find(DiagnosticCode::ContributorNotFound).unwrap();
        assert_eq!(diag.line, 8);
    }

    #[tokio::test]
    async fn test_short_station_id_padded() {
        let setup = Setup::new();
        let mut record = fixtures::valid_record();
        record.station_id = "5".into();
        let mut ctx = setup.context(record);

        assert!(!StationCheck.run(&mut ctx).await.unwrap());
        assert_eq!(ctx.record.station_id, "005");
        // 70 comes before the registry miss on the padded id.
        assert_eq!(ctx.report.codes(), vec![70, 71]);
    }

    #[tokio::test]
    async fn test_empty_station_id() {
        let setup = Setup::new();
        let mut record = fixtures::valid_record();
        record.station_id = String::new();
        let mut ctx = setup.context(record);

        assert!(!StationCheck.run(&mut ctx).await.unwrap());
        assert_eq!(ctx.record.station_id, "000");
        assert_eq!(ctx.report.codes()[0], 70);
    }

    #[tokio::test]
    async fn test_ship_at_sea_rewritten() {
        let setup = Setup::new();
        let mut record = fixtures::valid_record();
        record.station_type = "SHP".into();
        record.station_id = "401".into();
        record.station_name = "Polarstern".into();
        record.country = Some("IW".into());
        let mut ctx = setup.context(record);

        assert!(StationCheck.run(&mut ctx).await.unwrap());
        assert_eq!(ctx.record.country.as_deref(), Some(SHIP_COUNTRY));
        assert_eq!(ctx.report.codes(), vec![75]);
        assert!(ctx.report.passed());
    }

    #[tokio::test]
    async fn test_type_and_name_mismatch() {
        let setup = Setup::new();
        let mut record = fixtures::valid_record();
        record.station_type = "SHP".into();
        record.station_name = "Churchill Falls".into();
        let mut ctx = setup.context(record);

        assert!(!StationCheck.run(&mut ctx).await.unwrap());
        assert_eq!(ctx.report.codes(), vec![72, 73]);
    }

    #[tokio::test]
    async fn test_country_mismatch() {
        let setup = Setup::new();
        let mut record = fixtures::valid_record();
        record.country = Some("XY".into());
        let mut ctx = setup.context(record);

        assert!(!StationCheck.run(&mut ctx).await.unwrap());
        assert_eq!(ctx.report.codes(), vec![74]);

        let mut record = fixtures::valid_record();
        record.country = Some("ZZZ".into());
        let mut ctx = setup.context(record);
        assert!(!StationCheck.run(&mut ctx).await.unwrap());
        assert_eq!(ctx.report.codes(), vec![74]);
    }

    #[tokio::test]
    async fn test_unknown_deployment() {
        let setup = Setup::new();
        let mut record = fixtures::valid_record();
        record.project = "GAW".into();
        let mut ctx = setup.context(record);

        assert!(!DeploymentCheck.run(&mut ctx).await.unwrap());
        let diag = ctx.report.find(DiagnosticCode::DeploymentNotFound).unwrap();
        assert_eq!(diag.params["ident"], "077:MSC:GAW");
        assert_eq!(diag.line, 12);
    }
}
