use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

/// Prometheus collectors shared by the tracker service and its outbound clients.
#[derive(Clone)]
pub struct TrackerMetrics {
    pub registry: Registry,
    pub http_errors_total: IntCounterVec,
    pub consumption_recorded_total: IntCounter,
    pub sessions_created_total: IntCounter,
    pub outbound_retries_total: IntCounterVec,
}

impl TrackerMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let http_errors_total = IntCounterVec::new(
            Opts::new(
                "http_errors_total",
                "Count of HTTP error responses emitted (status >= 400)",
            ),
            &["service", "code", "status"],
        )?;
        let consumption_recorded_total = IntCounter::new(
            "inventory_consumption_recorded_total",
            "Inventory consumption events appended to the ledger",
        )?;
        let sessions_created_total = IntCounter::new(
            "sessions_created_total",
            "Consumption sessions logged",
        )?;
        let outbound_retries_total = IntCounterVec::new(
            Opts::new(
                "outbound_retries_total",
                "Retries issued by the resilient outbound client",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(http_errors_total.clone()))?;
        registry.register(Box::new(consumption_recorded_total.clone()))?;
        registry.register(Box::new(sessions_created_total.clone()))?;
        registry.register(Box::new(outbound_retries_total.clone()))?;
        Ok(TrackerMetrics {
            registry,
            http_errors_total,
            consumption_recorded_total,
            sessions_created_total,
            outbound_retries_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collectors_are_registered() {
        let metrics = TrackerMetrics::new().expect("metrics");
        metrics.consumption_recorded_total.inc();
        metrics
            .outbound_retries_total
            .with_label_values(&["rate_limited"])
            .inc();
        metrics
            .http_errors_total
            .with_label_values(&["tracker-service", "not_found", "404"])
            .inc();
        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"inventory_consumption_recorded_total".to_string()));
        assert!(names.contains(&"outbound_retries_total".to_string()));
        assert!(names.contains(&"http_errors_total".to_string()));
    }
}
