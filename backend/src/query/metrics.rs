//! Submission metrics process.
//!
//! Counts files and observations in the data record collections per year or
//! month, optionally filtered by dataset, level, country, station, network
//! or (peer records) source.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::error::{QueryError, QueryResult};
use crate::registry::RegistryClient;

/// Dataset value that routes a query to the peer data records.
pub const PEER_DATASET: &str = "peer_data_records";

const FILTER_AGGREGATION: &str = "filters";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Files and observations per dataset.
    Dataset,
    /// Files and observations per contributing agency.
    Contributor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timescale {
    Year,
    Month,
}

impl Timescale {
    pub fn calendar_interval(self) -> &'static str {
        match self {
            Timescale::Year => "1y",
            Timescale::Month => "1M",
        }
    }

    pub fn format(self) -> &'static str {
        match self {
            Timescale::Year => "yyyy",
            Timescale::Month => "yyyy-MM",
        }
    }

    /// Key of the period in output rows.
    pub fn key(self) -> &'static str {
        match self {
            Timescale::Year => "year",
            Timescale::Month => "month",
        }
    }

    fn aggregation_name(self) -> String {
        format!("{}ly", self.key())
    }
}

/// Inputs of the metrics process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRequest {
    pub domain: Domain,
    pub timescale: Timescale,
    #[serde(default)]
    pub dataset: Option<String>,
    /// Matched against the numeric content level.
    #[serde(default)]
    pub level: Option<Value>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub station: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// One non-empty period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsRow {
    pub total_files: u64,
    pub total_obs: i64,
    /// `year` or `month` in the serialized form.
    #[serde(flatten)]
    pub period: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsResponse {
    pub total_files: u64,
    pub metrics: Vec<MetricsRow>,
}

impl MetricsRequest {
    pub fn is_peer(&self) -> bool {
        self.dataset.as_deref() == Some(PEER_DATASET)
    }

    /// Collection holding the records this request counts.
    pub fn collection(&self) -> &'static str {
        if self.is_peer() {
            "peer_data_record"
        } else {
            "data_record"
        }
    }

    fn date_field(&self) -> &'static str {
        if self.is_peer() {
            "properties.start_datetime"
        } else {
            "properties.timestamp_date"
        }
    }

    /// Term conditions as `(path, value)` pairs.
    pub fn filters(&self) -> Vec<(&'static str, Value)> {
        let text = |v: &Option<String>| v.as_ref().map(|s| Value::String(s.clone()));
        let candidates: Vec<(&'static str, Option<Value>)> = match (self.domain, self.is_peer()) {
            (Domain::Dataset, false) => vec![
                ("properties.content_category.raw", text(&self.dataset)),
                ("properties.content_level", self.level.clone()),
            ],
            (Domain::Dataset, true) => vec![("properties.source.raw", text(&self.source))],
            (Domain::Contributor, false) => vec![
                ("properties.content_category.raw", text(&self.dataset)),
                ("properties.platform_country.raw", text(&self.country)),
                ("properties.platform_id.raw", text(&self.station)),
                ("properties.instrument_name.raw", text(&self.network)),
            ],
            (Domain::Contributor, true) => vec![
                ("properties.source.raw", text(&self.source)),
                ("properties.station_id.raw", text(&self.station)),
                ("properties.instrument_type.raw", text(&self.network)),
            ],
        };
        candidates
            .into_iter()
            .filter_map(|(path, value)| value.map(|v| (path, v)))
            .collect()
    }

    /// Full search body.
    pub fn to_body(&self) -> Value {
        let conditions: Vec<Value> = self
            .filters()
            .into_iter()
            .map(|(path, value)| json!({ "term": { path: value } }))
            .collect();

        json!({
            "size": 0,
            "aggregations": {
                FILTER_AGGREGATION: {
                    "filter": { "bool": { "must": conditions } },
                    "aggregations": {
                        self.timescale.aggregation_name(): {
                            "date_histogram": {
                                "field": self.date_field(),
                                "calendar_interval": self.timescale.calendar_interval(),
                                "format": self.timescale.format()
                            },
                            "aggregations": {
                                "total_obs": { "sum": { "field": "properties.number_of_observations" } }
                            }
                        }
                    }
                }
            }
        })
    }
}

/// Run the process against the registry.
pub async fn execute(registry: &RegistryClient, request: &MetricsRequest) -> QueryResult<MetricsResponse> {
    info!(
        domain = ?request.domain,
        timescale = ?request.timescale,
        collection = request.collection(),
        "metrics"
    );
    let response = registry.search(request.collection(), &request.to_body()).await?;

    let filtered = response
        .pointer(&format!("/aggregations/{}", FILTER_AGGREGATION))
        .ok_or_else(|| QueryError::MissingAggregation(FILTER_AGGREGATION.to_string()))?;
    let total_files = filtered.get("doc_count").and_then(Value::as_u64).unwrap_or(0);

    let name = request.timescale.aggregation_name();
    let buckets = filtered
        .get(&name)
        .ok_or_else(|| QueryError::MissingAggregation(name.clone()))?
        .get("buckets")
        .and_then(Value::as_array)
        .ok_or_else(|| QueryError::UnexpectedShape(format!("{} has no buckets", name)))?;

    let mut metrics = Vec::new();
    for bucket in buckets {
        let doc_count = bucket.get("doc_count").and_then(Value::as_u64).unwrap_or(0);
        if doc_count == 0 {
            continue;
        }
        let total_obs = bucket
            .pointer("/total_obs/value")
            .and_then(Value::as_f64)
            .unwrap_or(0.0) as i64;
        let key = bucket.get("key_as_string").cloned().unwrap_or(Value::Null);

        let mut period = Map::new();
        period.insert(request.timescale.key().to_string(), key);
        metrics.push(MetricsRow {
            total_files: doc_count,
            total_obs,
            period,
        });
    }

    Ok(MetricsResponse { total_files, metrics })
}
