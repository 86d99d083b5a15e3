use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One resource usage sample of a running submission container.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageStat {
    /// Submission name
    pub name: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub sampled_at: DateTime<Utc>,
}
