//! Select-distinct groups process.
//!
//! Approximates SQL `SELECT DISTINCT` over a registry collection: one row per
//! unique combination of the `distinct` fields, each row carrying the
//! `source` fields of one representative document.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::info;

use super::aggregation::{build_group_query, unwrap};
use crate::error::{QueryError, QueryResult};
use crate::registry::RegistryClient;

/// Grouping fields: one list, or several named lists queried at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DistinctSpec {
    Fields(Vec<String>),
    Named(BTreeMap<String, Vec<String>>),
}

/// Inputs of the select-distinct process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistinctRequest {
    /// Collection name, without the index prefix.
    pub index: String,
    pub distinct: DistinctSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Vec<String>>,
}

/// Output mirrors the shape of [`DistinctSpec`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DistinctResponse {
    Rows(Vec<Value>),
    Named(BTreeMap<String, Vec<Value>>),
}

/// Run the process against the registry.
pub async fn execute(registry: &RegistryClient, request: &DistinctRequest) -> QueryResult<DistinctResponse> {
    if request.index.trim().is_empty() {
        return Err(QueryError::InvalidInput {
            field: "index".to_string(),
            message: "must not be empty".to_string(),
        });
    }
    let source = request.source.as_deref();

    match &request.distinct {
        DistinctSpec::Fields(fields) => {
            info!(index = %request.index, fields = ?fields, "select distinct");
            let tree = build_group_query(fields, source);
            let rows = registry.group_rows(&request.index, &tree).await?;
            Ok(DistinctResponse::Rows(rows))
        }
        DistinctSpec::Named(groups) => {
            info!(index = %request.index, groups = groups.len(), "select distinct (named)");
            let mut aggregations = Map::new();
            for (name, fields) in groups {
                aggregations.insert(
                    name.clone(),
                    json!({
                        "global": {},
                        "aggregations": build_group_query(fields, source).to_json()
                    }),
                );
            }
            let body = json!({ "size": 0, "aggregations": aggregations });
            let response = registry.search(&request.index, &body).await?;

            let mut out = BTreeMap::new();
            for (name, fields) in groups {
                let node = response
                    .pointer(&format!("/aggregations/{}", name))
                    .ok_or_else(|| QueryError::MissingAggregation(name.clone()))?;
                out.insert(name.clone(), unwrap(node, fields)?);
            }
            Ok(DistinctResponse::Named(out))
        }
    }
}
