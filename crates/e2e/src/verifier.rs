//! Action verification with bounded retries
//!
//! Clicks against a continuously re-rendering UI do not always register on
//! the first try. The verifier performs an action, lets the page settle,
//! checks the expected state and repeats the action with an escalating
//! settle delay. Retries are bounded so a real application bug surfaces as
//! [`E2eError::ActionNotRegistered`] instead of hanging the suite.

use std::future::Future;
use std::time::Duration;

use campaign_common::{DomCondition, DomProbe};
use tracing::{debug, warn};

use crate::config::VerifierConfig;
use crate::error::{E2eError, E2eResult};

/// Geometric settle delay with a cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub multiplier: u32,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, multiplier: u32, max: Duration) -> Self {
        Self {
            initial,
            multiplier: multiplier.max(1),
            max,
        }
    }

    /// Settle delay after the `attempt`-th action (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.saturating_pow(exponent);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Settle delays for the first `attempts` attempts
    pub fn schedule(&self, attempts: u32) -> Vec<Duration> {
        (1..=attempts).map(|a| self.delay(a)).collect()
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        VerifierConfig::default().backoff()
    }
}

/// Performs actions and re-checks their effect
#[derive(Debug, Clone)]
pub struct ActionVerifier {
    max_attempts: u32,
    backoff: BackoffPolicy,
    check_timeout: Duration,
}

impl ActionVerifier {
    pub fn new(max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            check_timeout: VerifierConfig::default().check_timeout(),
        }
    }

    pub fn from_config(config: &VerifierConfig) -> Self {
        Self::new(config.max_attempts, config.backoff()).with_check_timeout(config.check_timeout())
    }

    /// Bound each post-action check; a check that runs longer counts as unmet
    pub fn with_check_timeout(mut self, check_timeout: Duration) -> Self {
        self.check_timeout = check_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Run `action` until `check` holds, at most `max_attempts` times.
    ///
    /// Returns the number of attempts it took. An error from the action
    /// itself is returned immediately without retrying.
    pub async fn perform_and_verify<A, AF, C, CF>(
        &self,
        action_label: &str,
        action: A,
        expectation: &str,
        check: C,
    ) -> E2eResult<u32>
    where
        A: FnMut() -> AF,
        AF: Future<Output = E2eResult<()>>,
        C: FnMut() -> CF,
        CF: Future<Output = bool>,
    {
        self.perform_and_verify_with(self.max_attempts, action_label, action, expectation, check)
            .await
    }

    /// [`ActionVerifier::perform_and_verify`] with a per-call attempt limit
    pub async fn perform_and_verify_with<A, AF, C, CF>(
        &self,
        max_attempts: u32,
        action_label: &str,
        mut action: A,
        expectation: &str,
        mut check: C,
    ) -> E2eResult<u32>
    where
        A: FnMut() -> AF,
        AF: Future<Output = E2eResult<()>>,
        C: FnMut() -> CF,
        CF: Future<Output = bool>,
    {
        let max_attempts = max_attempts.max(1);
        for attempt in 1..=max_attempts {
            debug!(action = action_label, attempt, "performing action");
            action().await?;

            let settle = self.backoff.delay(attempt);
            tokio::time::sleep(settle).await;

            match tokio::time::timeout(self.check_timeout, check()).await {
                Ok(true) => {
                    debug!(action = action_label, attempt, "action registered");
                    return Ok(attempt);
                }
                Ok(false) => {}
                Err(_) => {
                    warn!(
                        action = action_label,
                        attempt,
                        check_timeout_ms = self.check_timeout.as_millis() as u64,
                        "check for {} did not finish",
                        expectation
                    );
                }
            }

            if attempt < max_attempts {
                warn!(
                    action = action_label,
                    attempt,
                    settle_ms = settle.as_millis() as u64,
                    "expected {} not observed, retrying",
                    expectation
                );
            }
        }

        Err(E2eError::ActionNotRegistered {
            action: action_label.to_string(),
            expectation: expectation.to_string(),
            attempts: max_attempts,
        })
    }

    /// Repeat `action` until `condition` holds in the rendered page
    pub async fn click_until<A, AF>(
        &self,
        action_label: &str,
        probe: &dyn DomProbe,
        condition: &DomCondition,
        action: A,
    ) -> E2eResult<u32>
    where
        A: FnMut() -> AF,
        AF: Future<Output = E2eResult<()>>,
    {
        let expectation = condition.to_string();
        self.perform_and_verify(action_label, action, &expectation, move || async move {
            match probe.locate(&condition.locator).await {
                Ok(elements) => condition.evaluate(&elements),
                Err(e) => {
                    debug!("probe failed during verification: {}", e);
                    false
                }
            }
        })
        .await
    }
}

impl Default for ActionVerifier {
    fn default() -> Self {
        Self::from_config(&VerifierConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campaign_common::{DomElement, InMemoryDom, Locator};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn verifier() -> ActionVerifier {
        ActionVerifier::new(
            3,
            BackoffPolicy::new(Duration::from_millis(100), 2, Duration::from_millis(250)),
        )
    }

    #[test]
    fn test_backoff_is_geometric_with_cap() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), 2, Duration::from_millis(250));
        assert_eq!(
            policy.schedule(4),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(250),
                Duration::from_millis(250),
            ]
        );
        assert_eq!(policy.delay(u32::MAX), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_registering_action_fails_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = verifier()
            .perform_and_verify(
                "click world tab",
                || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
                "world tab selected",
                || async { false },
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(E2eError::ActionNotRegistered { action, expectation, attempts }) => {
                assert_eq!(action, "click world tab");
                assert_eq!(expectation, "world tab selected");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected ActionNotRegistered, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_registered() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let observed = calls.clone();

        let attempts = verifier()
            .perform_and_verify(
                "click",
                || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
                "second click lands",
                || {
                    let observed = observed.clone();
                    async move { observed.load(Ordering::SeqCst) >= 2 }
                },
            )
            .await
            .unwrap();

        assert_eq!(attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_delay_escalates() {
        let start = tokio::time::Instant::now();
        let _ = verifier()
            .perform_and_verify("noop", || async { Ok(()) }, "never", || async { false })
            .await;
        // 100 + 200 + 250
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(550), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(560), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = verifier()
            .perform_and_verify(
                "click",
                || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err(E2eError::Action("element detached".to_string()))
                    }
                },
                "anything",
                || async { true },
            )
            .await;

        assert!(matches!(result, Err(E2eError::Action(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_until_selected() {
        let dom = InMemoryDom::with_elements([
            DomElement::new("tab", "Sessions"),
            DomElement::new("tab", "Story Arcs"),
        ]);
        let target = Locator::role_with_name("tab", "Story Arcs");
        let condition = DomCondition::selected(target.clone());

        let clicks = Arc::new(AtomicU32::new(0));
        let attempts = verifier()
            .click_until("click story arcs", &dom, &condition, || {
                let clicks = clicks.clone();
                let dom = dom.clone();
                let target = target.clone();
                async move {
                    // first click is swallowed by a re-render
                    if clicks.fetch_add(1, Ordering::SeqCst) > 0 {
                        dom.select(&target);
                    }
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_call_attempt_limit() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = verifier()
            .perform_and_verify_with(
                5,
                "click",
                || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
                "never",
                || async { false },
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(matches!(result, Err(E2eError::ActionNotRegistered { attempts: 5, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_probe_counts_as_unmet_attempt() {
        struct StalledProbe;

        #[async_trait::async_trait]
        impl DomProbe for StalledProbe {
            async fn locate(&self, _locator: &Locator) -> campaign_common::ProbeResult<Vec<DomElement>> {
                std::future::pending().await
            }
        }

        let condition = DomCondition::selected(Locator::role_with_name("tab", "Players"));
        let start = tokio::time::Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(60),
            verifier()
                .with_check_timeout(Duration::from_millis(200))
                .click_until("click players", &StalledProbe, &condition, || async { Ok(()) }),
        )
        .await
        .expect("verification must stay bounded");

        assert!(matches!(result, Err(E2eError::ActionNotRegistered { attempts: 3, .. })));
        // settle 100 + 200 + 250, plus three 200 ms check bounds
        assert_eq!(start.elapsed(), Duration::from_millis(1150));
    }
}
