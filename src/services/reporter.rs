//! Read-only pool statistics

use std::collections::BTreeMap;

use chrono::Utc;
use tokio::time::Instant;

use crate::models::PoolReport;
use crate::proxy::EndpointPool;

const UNKNOWN_COUNTRY: &str = "unknown";

/// Summarize the pool from a single consistent snapshot
pub fn report(pool: &EndpointPool) -> PoolReport {
    report_at(pool, Instant::now())
}

/// Same as [`report`] with an explicit clock for the `available` count
pub fn report_at(pool: &EndpointPool, now: Instant) -> PoolReport {
    let endpoints = pool.snapshot();
    let min_score = pool.min_score();

    let mut by_source = BTreeMap::new();
    let mut by_country = BTreeMap::new();
    let mut healthy = 0;
    let mut available = 0;
    let mut score_sum = 0.0;

    for endpoint in &endpoints {
        if endpoint.score() >= min_score {
            healthy += 1;
        }
        if endpoint.is_available(now, min_score) {
            available += 1;
        }
        score_sum += endpoint.score();

        *by_source
            .entry(endpoint.source.as_str().to_string())
            .or_insert(0) += 1;
        *by_country
            .entry(
                endpoint
                    .country
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string()),
            )
            .or_insert(0) += 1;
    }

    let average_score = if endpoints.is_empty() {
        0.0
    } else {
        score_sum / endpoints.len() as f64
    };

    PoolReport {
        total: endpoints.len(),
        healthy,
        available,
        min_score,
        average_score,
        by_source,
        by_country,
        generated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::models::{Endpoint, EndpointProtocol, EndpointSource, FailureKind};

    fn endpoint(n: u8, source: EndpointSource, country: Option<&str>) -> Endpoint {
        let mut e = Endpoint::new(format!("10.0.1.{}", n), 3128, EndpointProtocol::Http, source);
        e.country = country.map(str::to_string);
        e
    }

    #[test]
    fn test_empty_pool_report() {
        let pool = EndpointPool::default();
        let report = report(&pool);
        assert_eq!(report.total, 0);
        assert_eq!(report.healthy, 0);
        assert_eq!(report.average_score, 0.0);
        assert!(report.by_source.is_empty());
    }

    #[test]
    fn test_report_counts() {
        let pool = EndpointPool::new(PoolConfig {
            min_score: 0.4,
            ..PoolConfig::default()
        });
        pool.add(endpoint(1, EndpointSource::Provider, Some("US")));
        pool.add(endpoint(2, EndpointSource::Provider, Some("DE")));
        pool.add(endpoint(3, EndpointSource::Discovered, None));

        let now = Instant::now();
        // 0.5 -> 0.35 drops endpoint 1 below the threshold
        pool.record_failure("10.0.1.1:3128:http", FailureKind::Soft, now);

        let report = report_at(&pool, now);
        assert_eq!(report.total, 3);
        assert_eq!(report.healthy, 2);
        assert_eq!(report.available, 2);
        assert_eq!(report.by_source.get("provider"), Some(&2));
        assert_eq!(report.by_source.get("discovered"), Some(&1));
        assert_eq!(report.by_country.get("US"), Some(&1));
        assert_eq!(report.by_country.get("unknown"), Some(&1));
        assert!((report.average_score - (0.35 + 0.5 + 0.5) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_report_does_not_mutate_pool() {
        let pool = EndpointPool::default();
        pool.add(endpoint(1, EndpointSource::Manual, None));
        let before = pool.snapshot();

        let _ = report(&pool);

        let after = pool.snapshot();
        assert_eq!(before.len(), after.len());
        assert_eq!(before[0].last_used(), after[0].last_used());
        assert_eq!(before[0].score(), after[0].score());
    }

    #[test]
    fn test_report_display_and_json() {
        let pool = EndpointPool::default();
        pool.add(endpoint(1, EndpointSource::Provider, Some("US")));

        let report = report(&pool);
        let text = report.to_string();
        assert!(text.starts_with("Proxy Pool Report"));
        assert!(text.contains("- Total proxies: 1"));
        assert!(text.contains("provider=1"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["by_country"]["US"], 1);
    }
}
