//! Metrics definitions for the rating API.

use shared::metrics_defs::{MetricDef, MetricType};

pub const RATING_SUBMITTED: MetricDef = MetricDef {
    name: "rating.submitted",
    metric_type: MetricType::Counter,
    description: "Number of rating submissions that completed successfully",
};

pub const RATING_CREATED: MetricDef = MetricDef {
    name: "rating.created",
    metric_type: MetricType::Counter,
    description: "Number of first-time ratings of a repository by a user",
};

pub const RATING_UPDATED: MetricDef = MetricDef {
    name: "rating.updated",
    metric_type: MetricType::Counter,
    description: "Number of submissions that replaced a user's earlier rating",
};

pub const REPO_CREATED: MetricDef = MetricDef {
    name: "repo.created",
    metric_type: MetricType::Counter,
    description: "Number of repositories rated for the first time",
};

pub const RATING_REJECTED: MetricDef = MetricDef {
    name: "rating.rejected",
    metric_type: MetricType::Counter,
    description: "Number of submissions rejected before any write, tagged by reason",
};

pub const RATING_SUBMIT_DURATION: MetricDef = MetricDef {
    name: "rating.submit.duration",
    metric_type: MetricType::Histogram,
    description: "Time to process a rating submission in seconds",
};

pub const ALL_METRICS: &[MetricDef] = &[
    RATING_SUBMITTED,
    RATING_CREATED,
    RATING_UPDATED,
    REPO_CREATED,
    RATING_REJECTED,
    RATING_SUBMIT_DURATION,
];
