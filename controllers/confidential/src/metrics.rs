//! Prometheus metrics for the confidential controller.

use podvm_image::PreConfigOutcome;
use prometheus::{IntCounterVec, Opts, Registry, TextEncoder};

/// Controller metrics, registered in a private registry.
pub struct Metrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    preconfig_outcomes: IntCounterVec,
}

impl Metrics {
    /// Creates and registers the controller counters.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconciliations = IntCounterVec::new(
            Opts::new(
                "confidential_reconcile_total",
                "Confidential feature reconciliations by result",
            ),
            &["result"],
        )?;
        let preconfig_outcomes = IntCounterVec::new(
            Opts::new(
                "confidential_preconfig_outcomes_total",
                "Pod VM image preconfiguration outcomes",
            ),
            &["outcome"],
        )?;

        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(preconfig_outcomes.clone()))?;

        Ok(Self {
            registry,
            reconciliations,
            preconfig_outcomes,
        })
    }

    /// Counts one reconciliation; `result` is "success" or "error".
    pub fn record_reconcile(&self, result: &str) {
        self.reconciliations.with_label_values(&[result]).inc();
    }

    /// Counts one preconfiguration outcome.
    pub fn record_preconfig(&self, outcome: PreConfigOutcome) {
        self.preconfig_outcomes
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    /// Text exposition format for `/metrics`
    pub fn render(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }

    #[cfg(test)]
    pub fn preconfig_count(&self, outcome: PreConfigOutcome) -> u64 {
        self.preconfig_outcomes
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    #[cfg(test)]
    pub fn reconcile_count(&self, result: &str) -> u64 {
        self.reconciliations.with_label_values(&[result]).get()
    }
}
