//! Nested terms-aggregation builder and flattener.
//!
//! [`wrap`] turns an ordered list of grouping fields into nested terms
//! aggregations around a leaf query; [`unwrap`] turns the nested bucket
//! response back into flat rows, one per distinct combination of values.
//!
//! ```text
//! wrap([station, dataset], leaf)
//!
//! distinct_station            <- first field, outermost
//! └── distinct_dataset        <- last field, innermost
//!     └── example (top_hits)  <- leaf
//! ```

use serde_json::{json, Map, Value};

use crate::error::{QueryError, QueryResult};

/// Bucket cap for every grouping layer.
pub const MAX_BUCKETS: usize = 10_000;

/// Reserved representative field resolved as a min date aggregate.
pub const START_DATE: &str = "start_date";

/// Reserved representative field resolved as a max date aggregate.
pub const END_DATE: &str = "end_date";

/// Name of the terms aggregation grouping by `field`.
pub fn aggregation_name(field: &str) -> String {
    format!("distinct_{}", field)
}

/// Untokenized document path of a property.
pub fn raw_field(field: &str) -> String {
    format!("properties.{}.raw", field)
}

/// Innermost query: one representative document plus optional date range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeafQuery {
    /// `_source` includes for the representative; `None` returns it whole.
    pub includes: Option<Vec<String>>,
    /// Request the minimum `properties.start_date` of the group.
    pub start_date: bool,
    /// Request the maximum `properties.end_date` of the group.
    pub end_date: bool,
}

impl LeafQuery {
    /// Render as search-DSL aggregations.
    pub fn to_json(&self) -> Value {
        let mut top_hits = Map::new();
        top_hits.insert("size".to_string(), json!(1));
        if let Some(includes) = &self.includes {
            top_hits.insert("_source".to_string(), json!({ "includes": includes }));
        }

        let mut aggs = Map::new();
        aggs.insert("example".to_string(), json!({ "top_hits": top_hits }));
        if self.start_date {
            aggs.insert(
                START_DATE.to_string(),
                json!({ "min": { "field": "properties.start_date" } }),
            );
        }
        if self.end_date {
            aggs.insert(
                END_DATE.to_string(),
                json!({ "max": { "field": "properties.end_date" } }),
            );
        }
        Value::Object(aggs)
    }
}

/// A leaf query wrapped in zero or more grouping layers.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationTree {
    Leaf(LeafQuery),
    Terms {
        field: String,
        size: usize,
        inner: Box<AggregationTree>,
    },
}

impl AggregationTree {
    /// Grouping fields from the outermost layer inwards.
    pub fn fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        let mut node = self;
        while let AggregationTree::Terms { field, inner, .. } = node {
            fields.push(field.as_str());
            node = inner;
        }
        fields
    }

    /// Render as the `aggregations` object of a search body.
    pub fn to_json(&self) -> Value {
        match self {
            AggregationTree::Leaf(leaf) => leaf.to_json(),
            AggregationTree::Terms { field, size, inner } => json!({
                aggregation_name(field): {
                    "terms": {
                        "size": size,
                        "field": raw_field(field),
                        "order": { "_key": "asc" }
                    },
                    "aggregations": inner.to_json()
                }
            }),
        }
    }
}

/// Wrap `leaf` in one terms layer per field.
///
/// The last field ends up innermost, the first field outermost. An empty
/// field list returns the leaf unchanged.
pub fn wrap(fields: &[String], leaf: AggregationTree) -> AggregationTree {
    match fields.split_last() {
        None => leaf,
        Some((last, rest)) => {
            let wrapped = AggregationTree::Terms {
                field: last.clone(),
                size: MAX_BUCKETS,
                inner: Box::new(leaf),
            };
            wrap(rest, wrapped)
        }
    }
}

/// Build the group query of the select-distinct process.
///
/// `source` lists representative fields copied from one document per group;
/// the reserved names `start_date` and `end_date` become min/max aggregates
/// instead.
pub fn build_group_query(distinct: &[String], source: Option<&[String]>) -> AggregationTree {
    let leaf = match source {
        None => LeafQuery::default(),
        Some(fields) => {
            let mut includes: Vec<String> = fields
                .iter()
                .filter(|f| f.as_str() != START_DATE && f.as_str() != END_DATE)
                .map(|f| format!("properties.{}", f))
                .collect();
            includes.push("geometry".to_string());
            LeafQuery {
                includes: Some(includes),
                start_date: fields.iter().any(|f| f == START_DATE),
                end_date: fields.iter().any(|f| f == END_DATE),
            }
        }
    };

    wrap(distinct, AggregationTree::Leaf(leaf))
}

/// Flatten a nested aggregation response into rows.
///
/// `fields` must be the list given to [`wrap`]. Each row is a document
/// `_source` whose `properties` carry the group's key for every field.
pub fn unwrap(response: &Value, fields: &[String]) -> QueryResult<Vec<Value>> {
    let Some((field, rest)) = fields.split_first() else {
        return unwrap_leaf(response).map(|row| row.into_iter().collect());
    };

    let name = aggregation_name(field);
    let buckets = response
        .get(&name)
        .ok_or_else(|| QueryError::MissingAggregation(name.clone()))?
        .get("buckets")
        .and_then(Value::as_array)
        .ok_or_else(|| QueryError::UnexpectedShape(format!("{} has no buckets", name)))?;

    let mut rows = Vec::new();
    for bucket in buckets {
        let key = bucket
            .get("key")
            .cloned()
            .ok_or_else(|| QueryError::UnexpectedShape(format!("{} bucket without key", name)))?;

        for mut row in unwrap(bucket, rest)? {
            properties_mut(&mut row)?.insert(field.clone(), key.clone());
            rows.push(row);
        }
    }

    Ok(rows)
}

/// Base case: the representative document with its date aggregates.
fn unwrap_leaf(response: &Value) -> QueryResult<Option<Value>> {
    let hits = response
        .get("example")
        .ok_or_else(|| QueryError::MissingAggregation("example".to_string()))?
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .ok_or_else(|| QueryError::UnexpectedShape("example has no hits".to_string()))?;

    let Some(hit) = hits.first() else {
        return Ok(None);
    };

    let mut source = hit.get("_source").cloned().unwrap_or_else(|| json!({}));
    if let Some(obj) = source.as_object_mut() {
        obj.remove("id");
        obj.remove("type");
    }

    if let Some(agg) = response.get(START_DATE) {
        let value = agg.get("value_as_string").cloned().unwrap_or(Value::Null);
        properties_mut(&mut source)?.insert(START_DATE.to_string(), value);
    }

    if let Some(agg) = response.get(END_DATE) {
        let value = match agg.get("value") {
            Some(v) if !v.is_null() => agg.get("value_as_string").cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        };
        properties_mut(&mut source)?.insert(END_DATE.to_string(), value);
    }

    Ok(Some(source))
}

fn properties_mut(row: &mut Value) -> QueryResult<&mut Map<String, Value>> {
    let obj = row
        .as_object_mut()
        .ok_or_else(|| QueryError::UnexpectedShape("row is not an object".to_string()))?;
    obj.entry("properties")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or_else(|| QueryError::UnexpectedShape("properties is not an object".to_string()))
}
