use shared::metrics_defs::{MetricDef, MetricType};

pub const UPSERT_OUTCOME: MetricDef = MetricDef {
    name: "upsert.outcome",
    metric_type: MetricType::Counter,
    description: "Resolved upserts. Tagged with outcome: updated, inserted_divergent, inserted.",
};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "trigger.request.duration",
    metric_type: MetricType::Histogram,
    description: "Trigger request duration in seconds. Tagged with status.",
};

pub const ALL_METRICS: &[MetricDef] = &[UPSERT_OUTCOME, REQUEST_DURATION];
