//! Campaign E2E Common Library
//!
//! Shared observation primitives for the campaign-manager end-to-end suite:
//! typed application notifications, the notification bus abstraction, the
//! rendered-state model, and fuzzy name matching.

pub mod bus;
pub mod dom;
pub mod error;
pub mod matcher;
pub mod notification;

// Re-export commonly used types
pub use bus::{InMemoryBus, NotificationBus, Subscription};
pub use dom::{DomCondition, DomElement, DomProbe, ElementState, InMemoryDom, Locator};
pub use error::{ProbeError, ProbeResult};
pub use matcher::{matches, MatchMode, MatchRule};
pub use notification::{Channel, Notification, PayloadField};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
