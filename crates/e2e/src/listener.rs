//! Event channel listener
//!
//! [`listen`] attaches to the bus immediately, so a caller can create the
//! pending wait, trigger the UI action, and only then await it without
//! missing a fast notification.

use std::time::Duration;

use campaign_common::{Channel, MatchRule, Notification, NotificationBus, Subscription};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace};

use crate::error::{E2eError, E2eResult};

/// Attach a listener for the first notification on `channel` matching `rule`
pub fn listen(bus: &dyn NotificationBus, channel: Channel, rule: MatchRule) -> PendingNotification {
    debug!(%channel, field = %rule.field, expected = %rule.expected, "listener attached");
    PendingNotification {
        subscription: bus.subscribe(channel),
        rule,
        seen: 0,
    }
}

/// A subscribed listener that has not yet settled.
///
/// Dropping it, resolving it, or timing it out all detach the listener.
#[derive(Debug)]
pub struct PendingNotification {
    subscription: Subscription,
    rule: MatchRule,
    seen: usize,
}

impl PendingNotification {
    pub fn channel(&self) -> Channel {
        self.subscription.channel()
    }

    pub fn rule(&self) -> &MatchRule {
        &self.rule
    }

    /// Non-matching notifications observed so far
    pub fn seen(&self) -> usize {
        self.seen
    }

    /// Whether `notification` satisfies this listener's channel and rule
    pub fn matches(&self, notification: &Notification) -> bool {
        notification.channel() == self.channel()
            && notification
                .field(self.rule.field)
                .map(|value| self.rule.evaluate(value))
                .unwrap_or(false)
    }

    /// Take an already-buffered matching notification without waiting
    pub fn try_take(&mut self) -> Option<Notification> {
        while let Some(notification) = self.subscription.try_recv() {
            if self.matches(&notification) {
                return Some(notification);
            }
            self.seen += 1;
        }
        None
    }

    /// Wait until a matching notification arrives or `deadline` passes.
    ///
    /// Borrowing form used by the race coordinator; the listener stays
    /// attached until `self` is dropped.
    pub async fn next_match(&mut self, deadline: Instant, timeout: Duration) -> E2eResult<Notification> {
        loop {
            match timeout_at(deadline, self.subscription.recv()).await {
                Ok(Some(notification)) => {
                    if self.matches(&notification) {
                        debug!(channel = %self.channel(), "matching notification received");
                        return Ok(notification);
                    }
                    self.seen += 1;
                    trace!(channel = %self.channel(), seen = self.seen, "notification did not match");
                }
                Ok(None) => {
                    return Err(E2eError::ChannelClosed {
                        channel: self.channel(),
                    });
                }
                Err(_) => {
                    debug!(channel = %self.channel(), seen = self.seen, "listener timed out");
                    return Err(E2eError::ChannelTimeout {
                        channel: self.channel(),
                        expected: self.rule.expected.clone(),
                        timeout_ms: timeout.as_millis() as u64,
                        seen: self.seen,
                    });
                }
            }
        }
    }

    /// Wait up to `timeout` for a match, detaching the listener either way
    pub async fn wait(mut self, timeout: Duration) -> E2eResult<Notification> {
        let deadline = Instant::now() + timeout;
        self.next_match(deadline, timeout).await
    }
}
