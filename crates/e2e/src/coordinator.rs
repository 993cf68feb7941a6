//! Race coordination between the event channel and the DOM
//!
//! A wait subscribes first, then checks whether the transition has already
//! happened, then races the listener against the DOM poller on one shared
//! deadline. Whichever channel succeeds first wins and the other is torn
//! down. If both run out of time the caller gets [`E2eError::Timeout`] with
//! a diagnostic snapshot; nothing here retries or swallows a timeout.
//!
//! ```text
//!  arm() ──► subscribe ──► [action] ──► pre-check ──┬─► AlreadySatisfied
//!                                                   │
//!                                     ┌─────────────┴────────────┐
//!                                  listener                   poller
//!                                     └──── first success ───────┘
//!                                                   │
//!                                        Event | Dom | Timeout
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use campaign_common::{
    Channel, DomCondition, DomElement, DomProbe, MatchRule, Notification, NotificationBus,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult, SignalSource, TimeoutDiagnostics};
use crate::listener::{listen, PendingNotification};
use crate::poller::DomPoller;

/// Which signals count as proof of the transition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceMode {
    /// Either channel alone is sufficient
    #[default]
    FirstChannel,
    /// The event must arrive and the DOM must then reflect it
    EventConfirmedByDom,
}

/// Description of a single await
#[derive(Debug, Clone, PartialEq)]
pub struct WaitSpec {
    pub channel: Channel,
    pub rule: MatchRule,
    pub dom_fallback: Option<DomCondition>,
    pub timeout: Duration,
    pub race: RaceMode,
}

impl WaitSpec {
    pub fn new(channel: Channel, rule: MatchRule, timeout: Duration) -> Self {
        Self {
            channel,
            rule,
            dom_fallback: None,
            timeout,
            race: RaceMode::FirstChannel,
        }
    }

    pub fn with_dom_fallback(mut self, condition: DomCondition) -> Self {
        self.dom_fallback = Some(condition);
        self
    }

    /// Require DOM confirmation after the event
    pub fn confirmed_by(mut self, condition: DomCondition) -> Self {
        self.dom_fallback = Some(condition);
        self.race = RaceMode::EventConfirmedByDom;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.timeout.is_zero() {
            return Err(E2eError::InvalidWaitSpec(format!(
                "timeout for '{}' must be positive",
                self.channel
            )));
        }
        if !self.channel.carries(self.rule.field) {
            return Err(E2eError::InvalidWaitSpec(format!(
                "channel '{}' payload has no field '{}'",
                self.channel, self.rule.field
            )));
        }
        if self.rule.expected.trim().is_empty() {
            return Err(E2eError::InvalidWaitSpec(format!(
                "empty target for '{}'",
                self.channel
            )));
        }
        if self.race == RaceMode::EventConfirmedByDom && self.dom_fallback.is_none() {
            return Err(E2eError::InvalidWaitSpec(format!(
                "'{}' requires DOM confirmation but has no DOM condition",
                self.channel
            )));
        }
        Ok(())
    }
}

/// Channel that satisfied a wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SatisfiedBy {
    Event,
    Dom,
    AlreadySatisfied,
}

impl std::fmt::Display for SatisfiedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SatisfiedBy::Event => f.write_str("event"),
            SatisfiedBy::Dom => f.write_str("dom"),
            SatisfiedBy::AlreadySatisfied => f.write_str("already_satisfied"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaitResult {
    pub satisfied: bool,
    pub channel: SatisfiedBy,
    pub elapsed: Duration,
    /// The matching notification, when the event channel (or its cache) decided
    pub notification: Option<Notification>,
}

impl WaitResult {
    fn new(channel: SatisfiedBy, elapsed: Duration, notification: Option<Notification>) -> Self {
        Self {
            satisfied: true,
            channel,
            elapsed,
            notification,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }
}

/// Composes listener, poller and the immediate check
#[derive(Clone)]
pub struct RaceCoordinator {
    bus: Arc<dyn NotificationBus>,
    probe: Arc<dyn DomProbe>,
    poll_interval: Duration,
}

impl RaceCoordinator {
    pub fn new(bus: Arc<dyn NotificationBus>, probe: Arc<dyn DomProbe>, poll_interval: Duration) -> Self {
        Self {
            bus,
            probe,
            poll_interval,
        }
    }

    pub fn bus(&self) -> &Arc<dyn NotificationBus> {
        &self.bus
    }

    pub fn probe(&self) -> &Arc<dyn DomProbe> {
        &self.probe
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Subscribe for `spec` now; await the returned handle after acting
    pub fn arm(&self, spec: WaitSpec) -> E2eResult<ArmedTransition> {
        spec.validate()?;
        let pending = listen(self.bus.as_ref(), spec.channel, spec.rule.clone());
        Ok(ArmedTransition {
            spec,
            pending,
            bus: self.bus.clone(),
            probe: self.probe.clone(),
            poll_interval: self.poll_interval,
        })
    }

    /// Wait for a transition that may already have happened.
    ///
    /// The channel's last cached notification counts as proof, which covers
    /// an event that fired before this call.
    pub async fn await_transition(&self, spec: WaitSpec) -> E2eResult<WaitResult> {
        self.arm(spec)?.resolve(true).await
    }

    /// Subscribe, run `action`, then wait.
    ///
    /// The cache is not consulted since it may predate the action. An action
    /// error is returned as-is and the listener is released.
    pub async fn with_pending_transition<F, Fut>(&self, spec: WaitSpec, action: F) -> E2eResult<WaitResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = E2eResult<()>>,
    {
        let armed = self.arm(spec)?;
        action().await?;
        armed.wait().await
    }
}

/// A wait whose listener is already attached
pub struct ArmedTransition {
    spec: WaitSpec,
    pending: PendingNotification,
    bus: Arc<dyn NotificationBus>,
    probe: Arc<dyn DomProbe>,
    poll_interval: Duration,
}

enum RaceOutcome {
    Won(WaitResult),
    Lost {
        event_matched: bool,
        dom_matched: bool,
        event_error: Option<E2eError>,
        snapshot: Vec<DomElement>,
        probe_error: Option<String>,
    },
}

impl ArmedTransition {
    pub fn spec(&self) -> &WaitSpec {
        &self.spec
    }

    /// Wait without consulting the cached last notification
    pub async fn wait(self) -> E2eResult<WaitResult> {
        self.resolve(false).await
    }

    async fn resolve(self, consult_cache: bool) -> E2eResult<WaitResult> {
        let started = Instant::now();
        let deadline = started + self.spec.timeout;
        let ArmedTransition {
            spec,
            mut pending,
            bus,
            probe,
            poll_interval,
        } = self;
        let poller = DomPoller::new(probe.as_ref(), poll_interval);

        debug!(
            channel = %spec.channel,
            target = %spec.rule.expected,
            timeout_ms = spec.timeout.as_millis() as u64,
            mode = ?spec.race,
            "awaiting transition"
        );

        // Immediate check
        let cached = if consult_cache {
            bus.last_notification(spec.channel)
                .filter(|n| pending.matches(n))
        } else {
            None
        };
        let dom_now = match &spec.dom_fallback {
            Some(condition) => poller.check_before(condition, deadline).await.satisfied,
            None => false,
        };
        let already = match spec.race {
            RaceMode::FirstChannel => cached.is_some() || dom_now,
            RaceMode::EventConfirmedByDom => cached.is_some() && dom_now,
        };
        if already {
            drop(pending);
            info!(channel = %spec.channel, target = %spec.rule.expected, "transition already satisfied");
            return Ok(WaitResult::new(SatisfiedBy::AlreadySatisfied, started.elapsed(), cached));
        }

        let outcome = match spec.race {
            RaceMode::FirstChannel => {
                race_first_channel(&spec, &mut pending, &poller, deadline, started).await
            }
            RaceMode::EventConfirmedByDom => {
                race_confirmed(&spec, &mut pending, &poller, deadline, started).await
            }
        };

        let seen = pending.seen();
        // listener detached before anything is reported
        drop(pending);

        match outcome {
            RaceOutcome::Won(result) => {
                info!(
                    channel = %spec.channel,
                    target = %spec.rule.expected,
                    satisfied_by = %result.channel,
                    elapsed_ms = result.elapsed_ms(),
                    "transition observed"
                );
                Ok(result)
            }
            RaceOutcome::Lost {
                event_matched,
                dom_matched,
                event_error,
                snapshot,
                probe_error,
            } => {
                // a closed channel is its own failure unless the DOM alone could still win
                let dom_can_win = spec.dom_fallback.is_some() && spec.race == RaceMode::FirstChannel;
                if !dom_can_win {
                    if let Some(E2eError::ChannelClosed { channel }) = &event_error {
                        warn!(%channel, "notification channel closed");
                        return Err(E2eError::ChannelClosed { channel: *channel });
                    }
                }

                let mut attempted = vec![SignalSource::Event];
                if spec.dom_fallback.is_some() {
                    attempted.push(SignalSource::Dom);
                }
                let diagnostics = TimeoutDiagnostics {
                    target: spec.rule.expected.clone(),
                    channel: spec.channel,
                    field: spec.rule.field.to_string(),
                    timeout_ms: spec.timeout.as_millis() as u64,
                    attempted,
                    event_matched,
                    dom_matched,
                    notifications_seen: seen,
                    dom_condition: spec.dom_fallback.as_ref().map(ToString::to_string),
                    last_dom_snapshot: snapshot,
                    last_probe_error: probe_error,
                };
                warn!("{}", diagnostics);
                Err(E2eError::Timeout(Box::new(diagnostics)))
            }
        }
    }
}

async fn race_first_channel(
    spec: &WaitSpec,
    pending: &mut PendingNotification,
    poller: &DomPoller<'_>,
    deadline: Instant,
    started: Instant,
) -> RaceOutcome {
    let dom_attempted = spec.dom_fallback.is_some();
    let event = pending.next_match(deadline, spec.timeout);
    let dom = async {
        match &spec.dom_fallback {
            Some(condition) => poller.poll_until(condition, deadline, spec.timeout).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(event);
    tokio::pin!(dom);

    let mut event_error: Option<E2eError> = None;
    let mut dom_error: Option<E2eError> = None;

    loop {
        tokio::select! {
            result = &mut event, if event_error.is_none() => match result {
                Ok(notification) => {
                    return RaceOutcome::Won(WaitResult::new(
                        SatisfiedBy::Event,
                        started.elapsed(),
                        Some(notification),
                    ));
                }
                Err(e) => event_error = Some(e),
            },
            result = &mut dom, if dom_attempted && dom_error.is_none() => match result {
                Ok(_) => {
                    return RaceOutcome::Won(WaitResult::new(SatisfiedBy::Dom, started.elapsed(), None));
                }
                Err(e) => dom_error = Some(e),
            },
        }

        if event_error.is_some() && (!dom_attempted || dom_error.is_some()) {
            break;
        }
    }

    let (snapshot, probe_error) = match dom_error {
        Some(E2eError::PollTimeout { last_snapshot, last_error, .. }) => (last_snapshot, last_error),
        _ => (Vec::new(), None),
    };
    RaceOutcome::Lost {
        event_matched: false,
        dom_matched: false,
        event_error,
        snapshot,
        probe_error,
    }
}

async fn race_confirmed(
    spec: &WaitSpec,
    pending: &mut PendingNotification,
    poller: &DomPoller<'_>,
    deadline: Instant,
    started: Instant,
) -> RaceOutcome {
    // validate() guarantees a condition in this mode
    let Some(condition) = spec.dom_fallback.as_ref() else {
        return RaceOutcome::Lost {
            event_matched: false,
            dom_matched: false,
            event_error: None,
            snapshot: Vec::new(),
            probe_error: None,
        };
    };

    match pending.next_match(deadline, spec.timeout).await {
        Ok(notification) => {
            debug!(channel = %spec.channel, "event received, waiting for dom confirmation");
            match poller.poll_until(condition, deadline, spec.timeout).await {
                Ok(_) => RaceOutcome::Won(WaitResult::new(
                    SatisfiedBy::Event,
                    started.elapsed(),
                    Some(notification),
                )),
                Err(E2eError::PollTimeout { last_snapshot, last_error, .. }) => RaceOutcome::Lost {
                    event_matched: true,
                    dom_matched: false,
                    event_error: None,
                    snapshot: last_snapshot,
                    probe_error: last_error,
                },
                Err(e) => RaceOutcome::Lost {
                    event_matched: true,
                    dom_matched: false,
                    event_error: None,
                    snapshot: Vec::new(),
                    probe_error: Some(e.to_string()),
                },
            }
        }
        Err(e) => {
            // deadline already passed; one short look for the diagnostics
            let check = poller
                .check_before(condition, Instant::now() + poller.interval())
                .await;
            RaceOutcome::Lost {
                event_matched: false,
                dom_matched: check.satisfied,
                event_error: Some(e),
                snapshot: check.elements,
                probe_error: check.error,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campaign_common::{DomElement, InMemoryBus, InMemoryDom, Locator, PayloadField};

    fn setup() -> (InMemoryBus, InMemoryDom, RaceCoordinator) {
        let bus = InMemoryBus::new();
        let dom = InMemoryDom::new();
        let coordinator = RaceCoordinator::new(
            Arc::new(bus.clone()),
            Arc::new(dom.clone()),
            Duration::from_millis(25),
        );
        (bus, dom, coordinator)
    }

    fn tavern_spec() -> WaitSpec {
        WaitSpec::new(
            Channel::EntitySelected,
            MatchRule::fuzzy(PayloadField::Name, "Campfire Tavern"),
            Duration::from_millis(3000),
        )
    }

    fn tavern_row() -> DomCondition {
        DomCondition::selected(Locator::role_with_name("row", "Campfire Tavern"))
    }

    fn publish_after(bus: &InMemoryBus, ms: u64, notification: Notification) {
        let bus = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            bus.publish(notification);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_matching_event_resolves_via_event() {
        let (bus, _dom, coordinator) = setup();
        publish_after(&bus, 50, Notification::entity_selected("Campfire Tavern"));

        let result = coordinator.await_transition(tavern_spec()).await.unwrap();

        assert!(result.satisfied);
        assert_eq!(result.channel, SatisfiedBy::Event);
        assert!(result.elapsed_ms() >= 50 && result.elapsed_ms() < 200, "{:?}", result.elapsed);
        assert_eq!(bus.total_listeners(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_matching_event_times_out_naming_target() {
        let (bus, _dom, coordinator) = setup();
        publish_after(&bus, 50, Notification::entity_selected("Different Place"));

        let start = Instant::now();
        let err = coordinator.await_transition(tavern_spec()).await.unwrap_err();
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(3000), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(3100), "{:?}", elapsed);
        let diagnostics = err.diagnostics().expect("timeout diagnostics");
        assert_eq!(diagnostics.target, "Campfire Tavern");
        assert_eq!(diagnostics.attempted, vec![SignalSource::Event]);
        assert_eq!(diagnostics.notifications_seen, 1);
        assert!(err.to_string().contains("Campfire Tavern"));

        // nothing left attached to resolve later
        assert_eq!(bus.listener_count(Channel::EntitySelected), 0);
        assert_eq!(bus.publish(Notification::entity_selected("Campfire Tavern")), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dom_only_resolves_via_dom() {
        let (_bus, dom, coordinator) = setup();
        dom.insert(DomElement::new("row", "Campfire Tavern"));

        let writer = dom.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            writer.select(&Locator::role_with_name("row", "Campfire Tavern"));
        });

        let result = coordinator
            .await_transition(tavern_spec().with_dom_fallback(tavern_row()))
            .await
            .unwrap();

        assert_eq!(result.channel, SatisfiedBy::Dom);
        assert!(result.elapsed_ms() >= 100 && result.elapsed_ms() <= 125, "{:?}", result.elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_true_dom_short_circuits() {
        let (bus, dom, coordinator) = setup();
        dom.insert(DomElement::new("row", "Campfire Tavern-w1-3").with_attribute("aria-selected", "true"));

        let result = coordinator
            .await_transition(tavern_spec().with_dom_fallback(tavern_row()))
            .await
            .unwrap();

        assert_eq!(result.channel, SatisfiedBy::AlreadySatisfied);
        assert_eq!(result.elapsed, Duration::ZERO);
        assert_eq!(bus.total_listeners(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_fired_before_call_is_already_satisfied() {
        let (bus, _dom, coordinator) = setup();
        bus.publish(Notification::entity_selected("Campfire Tavern"));

        let result = coordinator.await_transition(tavern_spec()).await.unwrap();
        assert_eq!(result.channel, SatisfiedBy::AlreadySatisfied);
        assert_eq!(result.notification, Some(Notification::entity_selected("Campfire Tavern")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_only_spec_ignores_correct_dom() {
        let (_bus, dom, coordinator) = setup();
        dom.insert(DomElement::new("row", "Campfire Tavern").with_attribute("aria-selected", "true"));

        let err = coordinator
            .await_transition(tavern_spec().with_timeout(Duration::from_millis(500)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_with_fallback_carries_dom_snapshot() {
        let (_bus, dom, coordinator) = setup();
        dom.insert(DomElement::new("row", "Campfire Tavern").with_attribute("aria-selected", "false"));

        let err = coordinator
            .await_transition(
                tavern_spec()
                    .with_dom_fallback(tavern_row())
                    .with_timeout(Duration::from_millis(400)),
            )
            .await
            .unwrap_err();

        let diagnostics = err.diagnostics().unwrap();
        assert_eq!(diagnostics.attempted, vec![SignalSource::Event, SignalSource::Dom]);
        assert!(!diagnostics.dom_matched);
        assert_eq!(diagnostics.last_dom_snapshot.len(), 1);
        assert!(diagnostics.dom_condition.as_deref().unwrap().contains("aria-selected"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_mode_waits_for_render() {
        let (bus, dom, coordinator) = setup();
        dom.insert(DomElement::new("row", "Campfire Tavern"));
        publish_after(&bus, 50, Notification::entity_selected("Campfire Tavern"));

        let writer = dom.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            writer.select(&Locator::role_with_name("row", "Campfire Tavern"));
        });

        let result = coordinator
            .await_transition(tavern_spec().confirmed_by(tavern_row()))
            .await
            .unwrap();
        assert_eq!(result.channel, SatisfiedBy::Event);
        assert!(result.elapsed_ms() >= 200, "{:?}", result.elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_mode_rejects_dom_alone() {
        let (_bus, dom, coordinator) = setup();
        dom.insert(DomElement::new("row", "Campfire Tavern").with_attribute("aria-selected", "true"));

        let err = coordinator
            .await_transition(
                tavern_spec()
                    .confirmed_by(tavern_row())
                    .with_timeout(Duration::from_millis(300)),
            )
            .await
            .unwrap_err();
        let diagnostics = err.diagnostics().unwrap();
        assert!(!diagnostics.event_matched);
        assert!(diagnostics.dom_matched);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_transition_catches_synchronous_event() {
        let (bus, _dom, coordinator) = setup();
        let app = bus.clone();

        let result = coordinator
            .with_pending_transition(tavern_spec(), || async move {
                app.publish(Notification::entity_selected("Campfire Tavern"));
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(result.channel, SatisfiedBy::Event);
        assert_eq!(result.elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_transition_ignores_stale_cache() {
        let (bus, _dom, coordinator) = setup();
        bus.publish(Notification::entity_selected("Campfire Tavern"));

        let err = coordinator
            .with_pending_transition(tavern_spec().with_timeout(Duration::from_millis(200)), || async {
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_transition_action_error_releases_listener() {
        let (bus, _dom, coordinator) = setup();

        let err = coordinator
            .with_pending_transition(tavern_spec(), || async {
                Err(E2eError::Action("button not found".to_string()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, E2eError::Action(_)));
        assert_eq!(bus.total_listeners(), 0);
    }

    #[test]
    fn test_invalid_specs_rejected() {
        let zero = tavern_spec().with_timeout(Duration::ZERO);
        assert!(matches!(zero.validate(), Err(E2eError::InvalidWaitSpec(_))));

        let wrong_field = WaitSpec::new(
            Channel::EntitySelected,
            MatchRule::fuzzy(PayloadField::Role, "admin"),
            Duration::from_secs(1),
        );
        assert!(wrong_field.validate().is_err());

        let blank = WaitSpec::new(
            Channel::EntitySelected,
            MatchRule::fuzzy(PayloadField::Name, "  "),
            Duration::from_secs(1),
        );
        assert!(blank.validate().is_err());

        let mut unconfirmable = tavern_spec();
        unconfirmable.race = RaceMode::EventConfirmedByDom;
        assert!(unconfirmable.validate().is_err());
    }

    struct StalledProbe;

    #[async_trait::async_trait]
    impl DomProbe for StalledProbe {
        async fn locate(&self, _locator: &Locator) -> campaign_common::ProbeResult<Vec<DomElement>> {
            std::future::pending().await
        }
    }

    /// Every subscription it hands out is already closed
    struct ClosedBus;

    impl NotificationBus for ClosedBus {
        fn subscribe(&self, channel: Channel) -> campaign_common::Subscription {
            let (_tx, rx) = tokio::sync::mpsc::unbounded_channel();
            campaign_common::Subscription::new(channel, rx, || {})
        }

        fn last_notification(&self, _channel: Channel) -> Option<Notification> {
            None
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_probe_still_times_out_on_schedule() {
        let bus = InMemoryBus::new();
        let coordinator = RaceCoordinator::new(
            Arc::new(bus.clone()),
            Arc::new(StalledProbe),
            Duration::from_millis(25),
        );
        let spec = tavern_spec()
            .with_timeout(Duration::from_millis(500))
            .with_dom_fallback(tavern_row());

        let start = Instant::now();
        let outcome = tokio::time::timeout(Duration::from_secs(60), coordinator.await_transition(spec))
            .await
            .expect("wait must respect its own deadline");

        assert_eq!(start.elapsed(), Duration::from_millis(500));
        let diagnostics = outcome.unwrap_err().diagnostics().cloned().unwrap();
        assert!(diagnostics.last_probe_error.is_some());
        assert_eq!(bus.total_listeners(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_probe_in_confirmed_mode_is_bounded() {
        let coordinator = RaceCoordinator::new(
            Arc::new(InMemoryBus::new()),
            Arc::new(StalledProbe),
            Duration::from_millis(25),
        );
        let spec = tavern_spec()
            .with_timeout(Duration::from_millis(400))
            .confirmed_by(tavern_row());

        let start = Instant::now();
        let err = tokio::time::timeout(Duration::from_secs(60), coordinator.await_transition(spec))
            .await
            .expect("wait must respect its own deadline")
            .unwrap_err();

        assert!(err.is_timeout());
        // deadline plus one bounded diagnostic look
        assert!(start.elapsed() <= Duration::from_millis(425), "{:?}", start.elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_channel_in_confirmed_mode_is_not_a_timeout() {
        let dom = InMemoryDom::new();
        let coordinator = RaceCoordinator::new(Arc::new(ClosedBus), Arc::new(dom), Duration::from_millis(25));
        let spec = tavern_spec().confirmed_by(tavern_row());

        let start = Instant::now();
        let err = coordinator.await_transition(spec).await.unwrap_err();

        assert!(matches!(err, E2eError::ChannelClosed { channel: Channel::EntitySelected }));
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_channel_with_fallback_keeps_polling() {
        let dom = InMemoryDom::with_elements([DomElement::new("row", "Campfire Tavern")]);
        let coordinator = RaceCoordinator::new(Arc::new(ClosedBus), Arc::new(dom.clone()), Duration::from_millis(25));
        let spec = tavern_spec().with_dom_fallback(tavern_row());

        let writer = dom.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            writer.select(&Locator::role_with_name("row", "Campfire Tavern"));
        });

        let result = coordinator.await_transition(spec).await.unwrap();
        assert_eq!(result.channel, SatisfiedBy::Dom);
    }
}
