//! Campaign E2E Synchronization Layer
//!
//! This crate lets browser tests wait for application state transitions
//! without fixed sleeps:
//! - Listens for application notifications on a typed bus
//! - Polls the rendered page for a fallback condition
//! - Races both signals under one deadline and reports which one won
//! - Retries UI actions whose effect never registered
//! - Runs declarative YAML scenarios against an in-memory application
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SyncSession                           │
//! │    ├── wait_for_<transition>(target) -> WaitResult          │
//! │    ├── perform(kind, target, action) -> WaitResult          │
//! │    └── click_and_verify(label, condition, action) -> u32    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TransitionCatalog: kind -> channel, field, DOM, timeout    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RaceCoordinator                                            │
//! │    ├── listen(bus, channel, rule) -> PendingNotification    │
//! │    ├── DomPoller::poll_until(condition, deadline)           │
//! │    └── select! on one shared deadline                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ActionVerifier: act, check, back off, retry                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioRunner (YAML)                                      │
//! │    ├── initial_dom, history                                 │
//! │    ├── wait { transition | channel + field, target }        │
//! │    ├── stimuli: [{ at_ms, publish | insert | select | ... }]│
//! │    └── expect { satisfied | timeout }                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fixture;
pub mod listener;
pub mod poller;
pub mod runner;
pub mod scenario;
pub mod session;
pub mod verifier;

pub use catalog::{standard_catalog, TransitionCatalog, TransitionEntry, TransitionKind};
pub use config::{SyncConfig, TimeoutClass, TimeoutConfig, VerifierConfig};
pub use coordinator::{ArmedTransition, RaceCoordinator, RaceMode, SatisfiedBy, WaitResult, WaitSpec};
pub use error::{E2eError, E2eResult, SignalSource, TimeoutDiagnostics};
pub use fixture::WorkerNamespace;
pub use listener::{listen, PendingNotification};
pub use poller::{poll_until, DomMatch, DomPoller};
pub use runner::{RunnerConfig, ScenarioResult, ScenarioRunner, SuiteResult};
pub use scenario::ScenarioSpec;
pub use session::SyncSession;
pub use verifier::{ActionVerifier, BackoffPolicy};
