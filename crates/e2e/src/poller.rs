//! DOM condition polling
//!
//! Used as a fallback when a notification is unreliable and as confirmation
//! when a notification can fire before the page has re-rendered.

use std::time::Duration;

use campaign_common::{DomCondition, DomElement, DomProbe};
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, trace};

use crate::error::{E2eError, E2eResult};

const PROBE_STALLED: &str = "probe did not answer before the deadline";

/// The located elements at the poll where the condition held
#[derive(Debug, Clone, PartialEq)]
pub struct DomMatch {
    pub elements: Vec<DomElement>,
    pub polls: u32,
}

/// Result of a single evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomCheck {
    pub satisfied: bool,
    pub elements: Vec<DomElement>,
    pub error: Option<String>,
}

/// Polls a probe at a fixed cadence
#[derive(Clone, Copy)]
pub struct DomPoller<'a> {
    probe: &'a dyn DomProbe,
    interval: Duration,
}

impl<'a> DomPoller<'a> {
    pub fn new(probe: &'a dyn DomProbe, interval: Duration) -> Self {
        Self {
            probe,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Evaluate `condition` once. Probe errors count as not satisfied.
    pub async fn check_once(&self, condition: &DomCondition) -> DomCheck {
        match self.probe.locate(&condition.locator).await {
            Ok(elements) => DomCheck {
                satisfied: condition.evaluate(&elements),
                elements,
                error: None,
            },
            Err(e) => DomCheck {
                satisfied: false,
                elements: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }

    /// Evaluate `condition` once, giving up at `deadline`.
    ///
    /// A probe that has not answered by then counts as not satisfied.
    pub async fn check_before(&self, condition: &DomCondition, deadline: Instant) -> DomCheck {
        match timeout_at(deadline, self.check_once(condition)).await {
            Ok(check) => check,
            Err(_) => DomCheck {
                satisfied: false,
                elements: Vec::new(),
                error: Some(PROBE_STALLED.to_string()),
            },
        }
    }

    /// Poll until `condition` holds or `deadline` passes.
    ///
    /// `timeout` is only reported in the error.
    pub async fn poll_until(
        &self,
        condition: &DomCondition,
        deadline: Instant,
        timeout: Duration,
    ) -> E2eResult<DomMatch> {
        let mut polls = 0u32;
        let mut last_snapshot = Vec::new();
        let mut last_error = None;

        loop {
            polls += 1;
            let check = self.check_before(condition, deadline).await;
            if check.satisfied {
                debug!(%condition, polls, "dom condition satisfied");
                return Ok(DomMatch {
                    elements: check.elements,
                    polls,
                });
            }
            trace!(%condition, polls, located = check.elements.len(), "dom condition not yet satisfied");
            if check.error.is_some() {
                last_error = check.error;
            } else {
                last_snapshot = check.elements;
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(%condition, polls, "dom poll timed out");
                return Err(E2eError::PollTimeout {
                    condition: condition.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                    last_snapshot,
                    last_error,
                });
            }
            sleep_until((now + self.interval).min(deadline)).await;
        }
    }
}

/// Poll `condition` every `interval` for at most `timeout`
pub async fn poll_until(
    probe: &dyn DomProbe,
    condition: &DomCondition,
    timeout: Duration,
    interval: Duration,
) -> E2eResult<DomMatch> {
    DomPoller::new(probe, interval)
        .poll_until(condition, Instant::now() + timeout, timeout)
        .await
}
