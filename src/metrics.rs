//! Prometheus-style delivery and trigger-evaluation counters.

use prometheus::{IntCounterVec, Opts, Registry};

/// Two counter vectors registered against a caller-supplied [`Registry`]:
/// `<prefix>_notifications_deliveries_total{trigger,service,succeeded}` and
/// `<prefix>_notifications_trigger_eval_total{name,triggered}`.
pub struct Metrics {
    deliveries_total: IntCounterVec,
    trigger_eval_total: IntCounterVec,
}

impl Metrics {
    /// Registers both counter vectors on `registry`, namespacing their names
    /// with `prefix` (the same annotation prefix used elsewhere, so metrics
    /// and annotations agree on whose engine produced them).
    pub fn register(registry: &Registry, prefix: &str) -> prometheus::Result<Self> {
        let metric_prefix = prefix.replace(['.', '/'], "_");

        let deliveries_total = IntCounterVec::new(
            Opts::new(
                format!("{metric_prefix}_notifications_deliveries_total"),
                "Count of notification delivery attempts.",
            ),
            &["trigger", "service", "succeeded"],
        )?;
        registry.register(Box::new(deliveries_total.clone()))?;

        let trigger_eval_total = IntCounterVec::new(
            Opts::new(
                format!("{metric_prefix}_notifications_trigger_eval_total"),
                "Count of trigger evaluations.",
            ),
            &["name", "triggered"],
        )?;
        registry.register(Box::new(trigger_eval_total.clone()))?;

        Ok(Self { deliveries_total, trigger_eval_total })
    }

    pub fn record_delivery(&self, trigger: &str, service: &str, succeeded: bool) {
        self.deliveries_total
            .with_label_values(&[trigger, service, bool_label(succeeded)])
            .inc();
    }

    pub fn record_trigger_eval(&self, name: &str, triggered: bool) {
        self.trigger_eval_total
            .with_label_values(&[name, bool_label(triggered)])
            .inc();
    }
}

const fn bool_label(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_reflected_in_the_registry() {
        let registry = Registry::new();
        let metrics = Metrics::register(&registry, "notifications.argoproj.io").unwrap();
        metrics.record_delivery("on-sync-failed", "slack", true);
        metrics.record_delivery("on-sync-failed", "slack", false);
        metrics.record_trigger_eval("on-sync-failed", true);

        let families = registry.gather();
        let delivery_family = families
            .iter()
            .find(|f| f.get_name().ends_with("deliveries_total"))
            .unwrap();
        let total: u64 = delivery_family
            .get_metric()
            .iter()
            .map(|m| m.get_counter().get_value() as u64)
            .sum();
        assert_eq!(total, 2);
    }
}
