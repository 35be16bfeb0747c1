//! Runs many identities through the flow with bounded concurrency.

use crate::attempt_tracker::AttemptTracker;
use crate::summary::BatchSummary;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use regflow_application::{FlowReport, SessionOrchestrator};
use regflow_core::identity::Identity;
use std::sync::Arc;
use std::time::Instant;

/// Runs one complete flow for an identity.
///
/// Implemented by [`SessionOrchestrator`]; the seam exists so the batch
/// logic can be exercised without a remote service.
#[async_trait]
pub trait FlowRunner: Send + Sync {
    async fn run_flow(&self, identity: Identity) -> FlowReport;
}

#[async_trait]
impl FlowRunner for SessionOrchestrator {
    async fn run_flow(&self, identity: Identity) -> FlowReport {
        self.run(identity).await
    }
}

enum IdentityOutcome {
    Finished { report: FlowReport, attempts: u32 },
    RateLimited,
}

/// Fans identities out over concurrent flows.
///
/// Flows share nothing but what the runner shares. A flow that fails with a
/// retryable error is re-run from the first step, up to `max_attempts`
/// times in total, as long as the attempt tracker allows it.
pub struct BatchExecutor {
    runner: Arc<dyn FlowRunner>,
    concurrency: usize,
    max_attempts: u32,
    tracker: Arc<AttemptTracker>,
}

impl BatchExecutor {
    pub fn new(runner: Arc<dyn FlowRunner>) -> Self {
        Self {
            runner,
            concurrency: 1,
            max_attempts: 1,
            tracker: Arc::new(AttemptTracker::disabled()),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<AttemptTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Runs every identity and tallies the outcomes. Individual failures
    /// never stop the batch.
    pub async fn run(&self, identities: Vec<Identity>) -> BatchSummary {
        let started = Instant::now();
        tracing::info!(
            identities = identities.len(),
            concurrency = self.concurrency,
            max_attempts = self.max_attempts,
            "Starting batch"
        );

        let outcomes: Vec<IdentityOutcome> = stream::iter(identities)
            .map(|identity| self.run_identity(identity))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut summary = BatchSummary::default();
        for outcome in outcomes {
            match outcome {
                IdentityOutcome::Finished { report, attempts } => {
                    summary.retries += attempts.saturating_sub(1) as usize;
                    summary.record(report);
                }
                IdentityOutcome::RateLimited => summary.record_rate_limited(),
            }
        }
        summary.elapsed = started.elapsed();

        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            rate_limited = summary.rate_limited,
            retries = summary.retries,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Batch finished"
        );
        summary
    }

    async fn run_identity(&self, identity: Identity) -> IdentityOutcome {
        let mut last: Option<FlowReport> = None;
        let mut attempts = 0;

        while attempts < self.max_attempts {
            if !self.tracker.try_acquire(&identity.email) {
                tracing::warn!(email = %identity.email, attempts, "Attempt limit reached, skipping");
                break;
            }
            attempts += 1;

            let report = self.runner.run_flow(identity.clone()).await;
            let retry = report
                .error
                .as_ref()
                .is_some_and(|error| error.is_flow_retryable());
            if report.is_complete() || !retry {
                return IdentityOutcome::Finished { report, attempts };
            }

            if attempts < self.max_attempts {
                tracing::info!(
                    email = %identity.email,
                    attempt = attempts,
                    max_attempts = self.max_attempts,
                    "Retrying flow"
                );
            }
            last = Some(report);
        }

        match last {
            Some(report) => IdentityOutcome::Finished { report, attempts },
            None => IdentityOutcome::RateLimited,
        }
    }
}
