//! Session domain model.
//!
//! A session lives for exactly one flow. It is created by the orchestrator,
//! threaded through every step, and dropped when the flow ends.

use crate::error::{RegflowError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Orchestrator states, in flow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    Init,
    SignupStarted,
    AwaitingCode,
    CodeSubmitted,
    ProfileSteps,
    LegalConfirmed,
    Verified,
    Complete,
    Failed,
}

impl SessionStatus {
    /// Position in the happy path. `Failed` has no rank.
    pub fn rank(self) -> Option<u8> {
        match self {
            SessionStatus::Init => Some(0),
            SessionStatus::SignupStarted => Some(1),
            SessionStatus::AwaitingCode => Some(2),
            SessionStatus::CodeSubmitted => Some(3),
            SessionStatus::ProfileSteps => Some(4),
            SessionStatus::LegalConfirmed => Some(5),
            SessionStatus::Verified => Some(6),
            SessionStatus::Complete => Some(7),
            SessionStatus::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Complete | SessionStatus::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Init => "INIT",
            SessionStatus::SignupStarted => "SIGNUP_STARTED",
            SessionStatus::AwaitingCode => "AWAITING_CODE",
            SessionStatus::CodeSubmitted => "CODE_SUBMITTED",
            SessionStatus::ProfileSteps => "PROFILE_STEPS",
            SessionStatus::LegalConfirmed => "LEGAL_CONFIRMED",
            SessionStatus::Verified => "VERIFIED",
            SessionStatus::Complete => "COMPLETE",
            SessionStatus::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// An opaque, non-empty session token returned by a workflow step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn parse(step: &str, raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(RegflowError::sequence(step, "empty session token"));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Mutable per-flow state.
#[derive(Debug, Clone)]
pub struct Session {
    pub flow_id: Uuid,
    token: Option<SessionToken>,
    step_index: usize,
    status: SessionStatus,
    captures: BTreeMap<String, String>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            flow_id: Uuid::new_v4(),
            token: None,
            step_index: 0,
            status: SessionStatus::Init,
            captures: BTreeMap::new(),
        }
    }

    pub fn token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn captures(&self) -> &BTreeMap<String, String> {
        &self.captures
    }

    /// Applies a successful step: the token is replaced (or kept when the step
    /// only acknowledges), captures are merged and the cursor moves on.
    pub fn advance(
        &mut self,
        token: Option<SessionToken>,
        captures: BTreeMap<String, String>,
        status: SessionStatus,
    ) -> Result<()> {
        if self.status.is_terminal() {
            return Err(RegflowError::sequence(
                "advance",
                format!("session already {}", self.status),
            ));
        }
        if let Some(token) = token {
            self.token = Some(token);
        }
        if self.token.is_none() {
            return Err(RegflowError::sequence(
                "advance",
                "step completed without any session token",
            ));
        }
        self.captures.extend(captures);
        self.step_index += 1;
        self.status = status;
        Ok(())
    }

    /// Moves to a status without consuming a step (awaiting code, complete).
    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
    }

    pub fn fail(&mut self) {
        self.status = SessionStatus::Failed;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_token_rejected() {
        assert!(SessionToken::parse("signup", "").is_err());
        assert!(SessionToken::parse("signup", "   ").is_err());
        assert_eq!(SessionToken::parse("signup", "abc").unwrap().as_str(), "abc");
    }

    #[test]
    fn test_advance_keeps_token_on_acknowledge() {
        let mut session = Session::new();
        let token = SessionToken::parse("signup", "t1").unwrap();
        session
            .advance(Some(token), BTreeMap::new(), SessionStatus::SignupStarted)
            .unwrap();
        session
            .advance(None, BTreeMap::new(), SessionStatus::CodeSubmitted)
            .unwrap();

        assert_eq!(session.token().unwrap().as_str(), "t1");
        assert_eq!(session.step_index(), 2);
        assert_eq!(session.status(), SessionStatus::CodeSubmitted);
    }

    #[test]
    fn test_advance_without_any_token_fails() {
        let mut session = Session::new();
        let result = session.advance(None, BTreeMap::new(), SessionStatus::SignupStarted);
        assert!(result.is_err());
        assert_eq!(session.step_index(), 0);
    }

    #[test]
    fn test_advance_after_failure_rejected() {
        let mut session = Session::new();
        session.fail();
        let token = SessionToken::parse("x", "t").unwrap();
        assert!(
            session
                .advance(Some(token), BTreeMap::new(), SessionStatus::SignupStarted)
                .is_err()
        );
    }

    #[test]
    fn test_status_rank_order() {
        assert!(SessionStatus::Init.rank() < SessionStatus::SignupStarted.rank());
        assert!(SessionStatus::LegalConfirmed.rank() < SessionStatus::Verified.rank());
        assert_eq!(SessionStatus::Failed.rank(), None);
        assert!(SessionStatus::Complete.is_terminal());
        assert!(!SessionStatus::Verified.is_terminal());
    }
}
