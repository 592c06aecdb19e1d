//! Check nodes, their dependencies and the execution plan.
//!
//! ```text
//! content      <- dataset
//! contributor  <- project
//! deployment   <- project, contributor, station
//! instrument   <- dataset, station, contributor, instrument_name_model
//! location     <- instrument
//! ```

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{RunError, RunResult};

/// A named validation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckId {
    Project,
    Dataset,
    Content,
    Contributor,
    Station,
    Deployment,
    InstrumentNameModel,
    Instrument,
    Location,
    DataGeneration,
    TimeSeries,
}

impl CheckId {
    /// All checks in their fixed execution order.
    pub const ORDER: [CheckId; 11] = [
        CheckId::Project,
        CheckId::Dataset,
        CheckId::Content,
        CheckId::Contributor,
        CheckId::Station,
        CheckId::Deployment,
        CheckId::InstrumentNameModel,
        CheckId::Instrument,
        CheckId::Location,
        CheckId::DataGeneration,
        CheckId::TimeSeries,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CheckId::Project => "project",
            CheckId::Dataset => "dataset",
            CheckId::Content => "content",
            CheckId::Contributor => "contributor",
            CheckId::Station => "station",
            CheckId::Deployment => "deployment",
            CheckId::InstrumentNameModel => "instrument_name_model",
            CheckId::Instrument => "instrument",
            CheckId::Location => "location",
            CheckId::DataGeneration => "data_generation",
            CheckId::TimeSeries => "time_series",
        }
    }

    /// Checks that must pass before this one runs.
    pub fn dependencies(self) -> &'static [CheckId] {
        match self {
            CheckId::Content => &[CheckId::Dataset],
            CheckId::Contributor => &[CheckId::Project],
            CheckId::Deployment => &[CheckId::Project, CheckId::Contributor, CheckId::Station],
            CheckId::Instrument => &[
                CheckId::Dataset,
                CheckId::Station,
                CheckId::Contributor,
                CheckId::InstrumentNameModel,
            ],
            CheckId::Location => &[CheckId::Instrument],
            _ => &[],
        }
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one check in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passed,
    Failed,
    /// Not invoked; counts as failed for dependents.
    Skipped,
}

impl CheckStatus {
    pub fn from_success(success: bool) -> Self {
        if success {
            CheckStatus::Passed
        } else {
            CheckStatus::Failed
        }
    }
}

pub type CheckStatuses = BTreeMap<CheckId, CheckStatus>;

/// Validated execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckPlan {
    order: Vec<CheckId>,
}

impl CheckPlan {
    /// Accept `order` only if every dependency precedes its dependent.
    pub fn new(order: Vec<CheckId>) -> RunResult<Self> {
        for (pos, check) in order.iter().enumerate() {
            for dep in check.dependencies() {
                if !order[..pos].contains(dep) {
                    return Err(RunError::PlanOrder {
                        check: check.name().to_string(),
                        dependency: dep.name().to_string(),
                    });
                }
            }
        }
        Ok(Self { order })
    }

    /// The fixed plan of all checks.
    pub fn standard() -> Self {
        Self {
            order: CheckId::ORDER.to_vec(),
        }
    }

    pub fn order(&self) -> &[CheckId] {
        &self.order
    }

    /// First dependency of `check` that did not pass, if any.
    pub fn blocking_dependency(check: CheckId, statuses: &CheckStatuses) -> Option<CheckId> {
        check
            .dependencies()
            .iter()
            .copied()
            .find(|dep| statuses.get(dep) != Some(&CheckStatus::Passed))
    }
}
