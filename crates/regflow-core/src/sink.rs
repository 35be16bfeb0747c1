//! Result sink trait.

use crate::error::Result;
use crate::identity::Identity;

/// Append-only record of completed identities.
///
/// The orchestrator calls [`ResultSink::record`] once per identity, and only
/// after the final step succeeded.
pub trait ResultSink: Send + Sync {
    fn record(&self, identity: &Identity) -> Result<()>;
}
