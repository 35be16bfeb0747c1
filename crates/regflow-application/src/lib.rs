//! Registration flow orchestration and out-of-band code retrieval.

pub mod code_extractor;
pub mod code_retriever;
pub mod mailbox_poller;
pub mod message_body;
pub mod orchestrator;
pub mod step_executor;
pub mod template_payload;
pub mod workflow;

pub use code_extractor::CodeExtractor;
pub use code_retriever::MailboxCodeRetriever;
pub use mailbox_poller::{MailboxPoller, PollClock, PollOutcome, SystemClock};
pub use orchestrator::{FlowReport, SessionOrchestrator};
pub use step_executor::{StepExecutor, StepOutcome};
pub use template_payload::TemplatePayload;
pub use workflow::build_workflow;
