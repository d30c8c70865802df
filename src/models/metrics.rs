use serde::Serialize;
use std::collections::HashSet;

/// Resource usage of one managed analysis process.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetrics {
    pub analysis_id: String,
    pub running: bool,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
}

/// Totals over a set of per-analysis rows. Always re-derived from the rows a
/// recipient is allowed to see, never copied from the full aggregate.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsTotals {
    pub analyses: usize,
    pub running: usize,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
}

/// Aggregate snapshot produced by the metrics subsystem.
#[derive(Clone, Debug, Default)]
pub struct AggregateMetrics {
    pub analyses: Vec<AnalysisMetrics>,
}

impl AggregateMetrics {
    /// Rows restricted to the given accessible analysis ids.
    pub fn restrict(&self, accessible: &HashSet<String>) -> Vec<AnalysisMetrics> {
        self.analyses
            .iter()
            .filter(|row| accessible.contains(&row.analysis_id))
            .cloned()
            .collect()
    }

    pub fn totals(rows: &[AnalysisMetrics]) -> MetricsTotals {
        MetricsTotals {
            analyses: rows.len(),
            running: rows.iter().filter(|row| row.running).count(),
            cpu_percent: rows.iter().map(|row| row.cpu_percent).sum(),
            memory_bytes: rows.iter().map(|row| row.memory_bytes).sum(),
        }
    }
}
