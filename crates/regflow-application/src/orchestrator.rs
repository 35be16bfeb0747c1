//! Drives one identity through the workflow table.

use crate::step_executor::StepExecutor;
use regflow_core::error::{RegflowError, Result};
use regflow_core::identity::Identity;
use regflow_core::mail::CodeRetriever;
use regflow_core::session::{Session, SessionStatus};
use regflow_core::sink::ResultSink;
use regflow_core::workflow::WorkflowTable;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// How a single flow ended.
#[derive(Debug, Clone)]
pub struct FlowReport {
    pub flow_id: Uuid,
    pub email: String,
    pub status: SessionStatus,
    pub steps_completed: usize,
    pub code: Option<String>,
    pub error: Option<RegflowError>,
}

impl FlowReport {
    pub fn is_complete(&self) -> bool {
        self.status == SessionStatus::Complete
    }
}

/// Runs the table strictly in order, threading the session token from step
/// to step and pausing for the out-of-band code where a step asks for it.
///
/// The first failure ends the flow; retrying is the caller's business.
pub struct SessionOrchestrator {
    table: Arc<WorkflowTable>,
    executor: StepExecutor,
    retriever: Arc<dyn CodeRetriever>,
    sink: Arc<dyn ResultSink>,
}

impl SessionOrchestrator {
    pub fn new(
        table: Arc<WorkflowTable>,
        executor: StepExecutor,
        retriever: Arc<dyn CodeRetriever>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            table,
            executor,
            retriever,
            sink,
        }
    }

    pub fn table(&self) -> &WorkflowTable {
        &self.table
    }

    /// Runs one flow to `COMPLETE` or `FAILED`. Never returns an error:
    /// failures are reported in the [`FlowReport`].
    pub async fn run(&self, identity: Identity) -> FlowReport {
        let mut session = Session::new();
        let mut identity = identity;
        let span = tracing::info_span!("flow", flow_id = %session.flow_id, email = %identity.email);

        let result = self
            .drive(&mut session, &mut identity)
            .instrument(span.clone())
            .await;

        let error = match result {
            Ok(()) => {
                span.in_scope(|| {
                    tracing::info!(status = %session.status(), "Flow complete");
                });
                None
            }
            Err(e) => {
                session.fail();
                span.in_scope(|| {
                    tracing::warn!(
                        status = %session.status(),
                        steps_completed = session.step_index(),
                        error = %e,
                        "Flow failed"
                    );
                });
                Some(e)
            }
        };

        FlowReport {
            flow_id: session.flow_id,
            email: identity.email.clone(),
            status: session.status(),
            steps_completed: session.step_index(),
            code: identity.code().map(str::to_string),
            error,
        }
    }

    async fn drive(&self, session: &mut Session, identity: &mut Identity) -> Result<()> {
        for step in self.table.steps() {
            if step.awaits_code {
                session.set_status(SessionStatus::AwaitingCode);
                tracing::info!(step = %step.name, status = %session.status(), "Waiting for verification code");

                let code = self.retriever.retrieve(identity).await?;
                identity.record_code(&code)?;
                tracing::info!(step = %step.name, heuristic = %code.heuristic, "Verification code recorded");
            }

            tracing::debug!(step = %step.name, "Executing step");
            let outcome = self.executor.execute(session, identity, step).await?;
            session.advance(outcome.token, outcome.captures, step.reaches)?;
            tracing::info!(step = %step.name, status = %session.status(), "Step completed");
        }

        if session.status() != SessionStatus::Verified {
            return Err(RegflowError::sequence(
                "record",
                format!("workflow ended in {} instead of VERIFIED", session.status()),
            ));
        }

        self.sink.record(identity)?;
        session.set_status(SessionStatus::Complete);
        Ok(())
    }
}
