//! Named waits for test steps
//!
//! A [`SyncSession`] is what a test step talks to: it owns the bus and DOM
//! handles, the transition catalog and the configured verifier, and exposes
//! one wait per catalog transition.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use campaign_common::{DomCondition, DomProbe, NotificationBus};

use crate::catalog::{TransitionCatalog, TransitionKind};
use crate::config::SyncConfig;
use crate::coordinator::{ArmedTransition, RaceCoordinator, WaitResult};
use crate::error::E2eResult;
use crate::verifier::ActionVerifier;

#[derive(Clone)]
pub struct SyncSession {
    coordinator: RaceCoordinator,
    catalog: Arc<TransitionCatalog>,
    verifier: ActionVerifier,
}

impl SyncSession {
    /// Session using the standard catalog with `config`'s timeouts
    pub fn new(bus: Arc<dyn NotificationBus>, probe: Arc<dyn DomProbe>, config: &SyncConfig) -> Self {
        let catalog = TransitionCatalog::standard(config.timeouts.clone());
        Self::with_catalog(bus, probe, config, Arc::new(catalog))
    }

    pub fn with_catalog(
        bus: Arc<dyn NotificationBus>,
        probe: Arc<dyn DomProbe>,
        config: &SyncConfig,
        catalog: Arc<TransitionCatalog>,
    ) -> Self {
        Self {
            coordinator: RaceCoordinator::new(bus, probe, config.poll_interval()),
            catalog,
            verifier: ActionVerifier::from_config(&config.verifier),
        }
    }

    pub fn coordinator(&self) -> &RaceCoordinator {
        &self.coordinator
    }

    pub fn catalog(&self) -> &TransitionCatalog {
        &self.catalog
    }

    pub fn verifier(&self) -> &ActionVerifier {
        &self.verifier
    }

    /// Wait for `kind` targeting `target`
    pub async fn wait_for(
        &self,
        kind: TransitionKind,
        target: &str,
        timeout: Option<Duration>,
    ) -> E2eResult<WaitResult> {
        let spec = self.catalog.spec_for(kind, target, timeout)?;
        self.coordinator.await_transition(spec).await
    }

    /// Attach the listener for `kind` without waiting yet
    pub fn arm(&self, kind: TransitionKind, target: &str, timeout: Option<Duration>) -> E2eResult<ArmedTransition> {
        let spec = self.catalog.spec_for(kind, target, timeout)?;
        self.coordinator.arm(spec)
    }

    /// Run `action` with the listener for `kind` already attached
    pub async fn perform<F, Fut>(&self, kind: TransitionKind, target: &str, action: F) -> E2eResult<WaitResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = E2eResult<()>>,
    {
        let spec = self.catalog.spec_for(kind, target, None)?;
        self.coordinator.with_pending_transition(spec, action).await
    }

    /// Click until `condition` renders, with bounded retries
    pub async fn click_and_verify<A, AF>(
        &self,
        label: &str,
        condition: &DomCondition,
        action: A,
    ) -> E2eResult<u32>
    where
        A: FnMut() -> AF,
        AF: Future<Output = E2eResult<()>>,
    {
        let probe = self.coordinator.probe().clone();
        self.verifier
            .click_until(label, probe.as_ref(), condition, action)
            .await
    }

    pub async fn wait_for_world_selected(&self, world: &str, timeout: Option<Duration>) -> E2eResult<WaitResult> {
        self.wait_for(TransitionKind::WorldSelected, world, timeout).await
    }

    pub async fn wait_for_campaign_selected(&self, campaign: &str, timeout: Option<Duration>) -> E2eResult<WaitResult> {
        self.wait_for(TransitionKind::CampaignSelected, campaign, timeout).await
    }

    pub async fn wait_for_planning_mode(&self, world: &str, timeout: Option<Duration>) -> E2eResult<WaitResult> {
        self.wait_for(TransitionKind::PlanningModeEntered, world, timeout).await
    }

    pub async fn wait_for_sub_tab(&self, tab: &str, timeout: Option<Duration>) -> E2eResult<WaitResult> {
        self.wait_for(TransitionKind::SubTabChanged, tab, timeout).await
    }

    pub async fn wait_for_modal_opened(&self, modal: &str, timeout: Option<Duration>) -> E2eResult<WaitResult> {
        self.wait_for(TransitionKind::ModalOpened, modal, timeout).await
    }

    pub async fn wait_for_modal_closed(&self, modal: &str, timeout: Option<Duration>) -> E2eResult<WaitResult> {
        self.wait_for(TransitionKind::ModalClosed, modal, timeout).await
    }

    pub async fn wait_for_entity_created(&self, name: &str, timeout: Option<Duration>) -> E2eResult<WaitResult> {
        self.wait_for(TransitionKind::EntityCreated, name, timeout).await
    }

    pub async fn wait_for_entity_selected(&self, name: &str, timeout: Option<Duration>) -> E2eResult<WaitResult> {
        self.wait_for(TransitionKind::EntitySelected, name, timeout).await
    }

    pub async fn wait_for_role_assigned(&self, role: &str, timeout: Option<Duration>) -> E2eResult<WaitResult> {
        self.wait_for(TransitionKind::RoleAssigned, role, timeout).await
    }

    pub async fn wait_for_role_revoked(&self, role: &str, timeout: Option<Duration>) -> E2eResult<WaitResult> {
        self.wait_for(TransitionKind::RoleRevoked, role, timeout).await
    }

    pub async fn wait_for_user_deleted(&self, user: &str, timeout: Option<Duration>) -> E2eResult<WaitResult> {
        self.wait_for(TransitionKind::UserDeleted, user, timeout).await
    }

    pub async fn wait_for_error(&self, message: &str, timeout: Option<Duration>) -> E2eResult<WaitResult> {
        self.wait_for(TransitionKind::ErrorOccurred, message, timeout).await
    }

    pub async fn wait_for_error_cleared(&self, message: &str, timeout: Option<Duration>) -> E2eResult<WaitResult> {
        self.wait_for(TransitionKind::ErrorCleared, message, timeout).await
    }
}
