//! Deadline-bounded mailbox polling.

use regflow_core::error::{RegflowError, Result};
use regflow_core::identity::MailboxCredentials;
use regflow_core::mail::{MailSearchQuery, MailSession, MailboxConnector, MessageId, RawMessage};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Monotonic time source for the poll loop.
pub trait PollClock: Send + Sync {
    /// Time elapsed since some fixed origin.
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time and real sleeps.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PollClock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A clock that only moves when slept on. Polls against it finish
/// instantly while still observing the deadline arithmetic.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += duration;
        }
    }
}

impl PollClock for ManualClock {
    fn now(&self) -> Duration {
        self.now.lock().map(|now| *now).unwrap_or_default()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Result of a poll that managed to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Found(T),
    NotFound { waited: Duration },
}

/// Logs the session out however the poll ends.
struct SessionGuard(Box<dyn MailSession>);

impl Deref for SessionGuard {
    type Target = dyn MailSession;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.logout();
    }
}

/// Connects to a mailbox and searches it until a message for the target
/// arrives or the deadline passes.
///
/// Only the newest matching message (highest sequence number) is fetched,
/// and only once: a message that yields nothing is not fetched again.
#[derive(Clone)]
pub struct MailboxPoller {
    connector: Arc<dyn MailboxConnector>,
    clock: Arc<dyn PollClock>,
}

impl MailboxPoller {
    pub fn new(connector: Arc<dyn MailboxConnector>) -> Self {
        Self {
            connector,
            clock: Arc::new(SystemClock::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn PollClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Polls on the blocking pool, handing each fetched message to
    /// `inspect` until it returns `Some`.
    ///
    /// # Returns
    ///
    /// - `Ok(Found(T))`: `inspect` accepted a message
    /// - `Ok(NotFound)`: deadline elapsed
    /// - `Err(MailboxConnect)`: connect or login failed
    pub async fn poll_with<T, F>(
        &self,
        credentials: &MailboxCredentials,
        query: &MailSearchQuery,
        inspect: F,
    ) -> Result<PollOutcome<T>>
    where
        T: Send + 'static,
        F: FnMut(&RawMessage) -> Option<T> + Send + 'static,
    {
        let poller = self.clone();
        let credentials = credentials.clone();
        let query = query.clone();

        tokio::task::spawn_blocking(move || poller.poll_blocking(&credentials, &query, inspect))
            .await
            .map_err(|e| RegflowError::mailbox(format!("poll task failed: {e}")))?
    }

    /// Returns the newest message addressed to the target.
    pub async fn poll(
        &self,
        credentials: &MailboxCredentials,
        query: &MailSearchQuery,
    ) -> Result<PollOutcome<RawMessage>> {
        self.poll_with(credentials, query, |message| Some(message.clone()))
            .await
    }

    /// The poll loop itself. Blocks the calling thread.
    pub fn poll_blocking<T, F>(
        &self,
        credentials: &MailboxCredentials,
        query: &MailSearchQuery,
        mut inspect: F,
    ) -> Result<PollOutcome<T>>
    where
        F: FnMut(&RawMessage) -> Option<T>,
    {
        let start = self.clock.now();
        let elapsed = || self.clock.now().saturating_sub(start);

        let mut session = SessionGuard(self.connector.connect(credentials)?);
        let mut inspected: Option<MessageId> = None;
        let mut rounds = 0u32;

        loop {
            if elapsed() >= query.deadline {
                break;
            }
            rounds += 1;

            match session.search(query) {
                Ok(ids) => {
                    if let Some(&latest) = ids.iter().max() {
                        if inspected != Some(latest) {
                            match session.fetch(latest) {
                                Ok(Some(message)) => {
                                    inspected = Some(latest);
                                    if let Some(found) = inspect(&message) {
                                        tracing::info!(
                                            target_addr = %query.target,
                                            message = latest,
                                            rounds,
                                            "Matching message found"
                                        );
                                        return Ok(PollOutcome::Found(found));
                                    }
                                    tracing::debug!(message = latest, "Message had nothing usable");
                                }
                                Ok(None) => {}
                                Err(e) => tracing::warn!("Fetch failed, will retry: {}", e),
                            }
                        }
                    }
                }
                Err(e) => tracing::warn!("Search failed, will retry: {}", e),
            }

            let spent = elapsed();
            if spent >= query.deadline {
                break;
            }
            self.clock.sleep(query.interval.min(query.deadline - spent));
        }

        let waited = elapsed();
        tracing::info!(
            target_addr = %query.target,
            waited_secs = waited.as_secs(),
            rounds,
            "No matching message before deadline"
        );
        Ok(PollOutcome::NotFound { waited })
    }
}
