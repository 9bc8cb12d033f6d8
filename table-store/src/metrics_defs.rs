//! Metrics definitions for the table store client.

use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "table_store.request.duration",
    metric_type: MetricType::Histogram,
    description: "Table service request duration in seconds. Tagged with operation, status.",
};

pub const ROWS_RETURNED: MetricDef = MetricDef {
    name: "table_store.query.rows",
    metric_type: MetricType::Histogram,
    description: "Number of rows returned by a query, across all continuation pages",
};

pub const ALL_METRICS: &[MetricDef] = &[REQUEST_DURATION, ROWS_RETURNED];
