//! Registry aggregation queries and the reporting processes built on them.
//!
//! - [`aggregation`] - nested terms builder/flattener
//! - [`distinct`] - select-distinct groups process
//! - [`metrics`] - submission metrics process

pub mod aggregation;
pub mod distinct;
pub mod metrics;

pub use aggregation::{build_group_query, unwrap, wrap, AggregationTree, LeafQuery};
pub use distinct::{DistinctRequest, DistinctResponse, DistinctSpec};
pub use metrics::{Domain, MetricsRequest, MetricsResponse, Timescale};
