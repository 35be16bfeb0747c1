//! Batch tally.

use regflow_application::FlowReport;
use regflow_core::ErrorKind;
use std::collections::BTreeMap;
use std::time::Duration;

/// What a batch run produced.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Identities refused by the attempt tracker before any flow started.
    pub rate_limited: usize,
    /// Input lines that could not be parsed into an identity.
    pub skipped_inputs: usize,
    /// Final failures by error kind. Failed attempts that were retried and
    /// later succeeded are not counted.
    pub failures: BTreeMap<ErrorKind, usize>,
    /// Flows re-run after a retryable failure.
    pub retries: usize,
    pub elapsed: Duration,
    /// Final report per identity, in completion order.
    pub reports: Vec<FlowReport>,
}

impl BatchSummary {
    pub fn with_skipped_inputs(mut self, skipped: usize) -> Self {
        self.skipped_inputs = skipped;
        self
    }

    pub fn record(&mut self, report: FlowReport) {
        if report.is_complete() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
            if let Some(error) = &report.error {
                *self.failures.entry(error.kind()).or_insert(0) += 1;
            }
        }
        self.reports.push(report);
    }

    pub fn record_rate_limited(&mut self) {
        self.rate_limited += 1;
    }

    /// Identities that were attempted or refused.
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.rate_limited
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.rate_limited == 0
    }
}
