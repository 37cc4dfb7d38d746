use crate::{Action, Error};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

/// Counts reconcile passes by controller and result.
#[derive(Clone, Debug, Default)]
pub struct ReconcileMetrics {
    reconciles: Family<Labels, Counter>,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct Labels {
    controller: &'static str,
    result: &'static str,
}

// === impl ReconcileMetrics ===

impl ReconcileMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let reconciles = Family::<Labels, Counter>::default();
        reg.register(
            "reconciles",
            "Total number of reconcile passes by controller and result",
            reconciles.clone(),
        );
        Self { reconciles }
    }

    pub fn record(&self, controller: &'static str, result: &Result<Action, Error>) {
        let result = match result {
            Ok(action) if *action == Action::await_change() => "done",
            Ok(_) => "requeue",
            Err(_) => "error",
        };
        self.reconciles
            .get_or_create(&Labels { controller, result })
            .inc();
    }

    #[cfg(test)]
    pub(crate) fn count(&self, controller: &'static str, result: &'static str) -> u64 {
        self.reconciles
            .get_or_create(&Labels { controller, result })
            .get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn records_results() {
        let metrics = ReconcileMetrics::register(&mut Registry::default());
        metrics.record("policy", &Ok(Action::await_change()));
        metrics.record("fanout", &Ok(Action::requeue(Duration::from_secs(5))));
        metrics.record("fanout", &Err(Error::Store(crate::StoreError::NotFound)));

        assert_eq!(metrics.count("policy", "done"), 1);
        assert_eq!(metrics.count("fanout", "requeue"), 1);
        assert_eq!(metrics.count("fanout", "error"), 1);
        assert_eq!(metrics.count("policy", "error"), 0);
    }
}
