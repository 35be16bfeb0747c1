//! Data-driven workflow definition.
//!
//! A workflow is an ordered [`WorkflowTable`] of [`StepDefinition`]s. Steps
//! carry their own payload builder, header profile and token rule, so the
//! orchestrator runs any table without per-step code.

mod step;
mod table;

pub use step::{
    EndpointRole, HeaderProfile, PayloadBuilder, StepDefinition, StepInput, TokenRule,
};
pub use table::WorkflowTable;
