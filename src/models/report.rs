use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate statistics over an endpoint pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolReport {
    /// Number of endpoints in the pool
    pub total: usize,
    /// Endpoints whose score is at least `min_score`
    pub healthy: usize,
    /// Healthy endpoints that are also out of cooldown
    pub available: usize,
    /// Selection threshold the pool was configured with
    pub min_score: f64,
    /// Mean score (0 for an empty pool)
    pub average_score: f64,
    /// Endpoint count keyed by source
    pub by_source: BTreeMap<String, usize>,
    /// Endpoint count keyed by country tag (`unknown` when untagged)
    pub by_country: BTreeMap<String, usize>,
    pub generated_at: DateTime<Utc>,
}

impl std::fmt::Display for PoolReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Proxy Pool Report")?;
        writeln!(f, "- Total proxies: {}", self.total)?;
        writeln!(
            f,
            "- Healthy (score >= {}): {}",
            self.min_score, self.healthy
        )?;
        writeln!(f, "- Available now: {}", self.available)?;
        writeln!(f, "- Average score: {:.2}", self.average_score)?;

        if !self.by_source.is_empty() {
            let sources: Vec<String> = self
                .by_source
                .iter()
                .map(|(source, count)| format!("{}={}", source, count))
                .collect();
            writeln!(f, "- By source: {}", sources.join(", "))?;
        }

        if !self.by_country.is_empty() {
            let countries: Vec<String> = self
                .by_country
                .iter()
                .map(|(country, count)| format!("{}={}", country, count))
                .collect();
            writeln!(f, "- By country: {}", countries.join(", "))?;
        }

        Ok(())
    }
}
