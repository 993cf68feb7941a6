//! Transition catalog
//!
//! Every named transition the suite waits on is registered here once: the
//! channel it is announced on, the payload field identifying its target,
//! its timeout class and, when the page renders a reliable signal, the DOM
//! condition that confirms it. Call sites ask the catalog for a
//! [`WaitSpec`] instead of writing their own polling.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use campaign_common::{Channel, DomCondition, ElementState, Locator, MatchRule, PayloadField};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::config::{TimeoutClass, TimeoutConfig};
use crate::coordinator::{RaceMode, WaitSpec};
use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    WorldSelected,
    CampaignSelected,
    PlanningModeEntered,
    SubTabChanged,
    ModalOpened,
    ModalClosed,
    EntityCreated,
    EntitySelected,
    RoleAssigned,
    RoleRevoked,
    UserDeleted,
    ErrorOccurred,
    ErrorCleared,
}

impl TransitionKind {
    pub const ALL: [TransitionKind; 13] = [
        TransitionKind::WorldSelected,
        TransitionKind::CampaignSelected,
        TransitionKind::PlanningModeEntered,
        TransitionKind::SubTabChanged,
        TransitionKind::ModalOpened,
        TransitionKind::ModalClosed,
        TransitionKind::EntityCreated,
        TransitionKind::EntitySelected,
        TransitionKind::RoleAssigned,
        TransitionKind::RoleRevoked,
        TransitionKind::UserDeleted,
        TransitionKind::ErrorOccurred,
        TransitionKind::ErrorCleared,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::WorldSelected => "world_selected",
            TransitionKind::CampaignSelected => "campaign_selected",
            TransitionKind::PlanningModeEntered => "planning_mode_entered",
            TransitionKind::SubTabChanged => "sub_tab_changed",
            TransitionKind::ModalOpened => "modal_opened",
            TransitionKind::ModalClosed => "modal_closed",
            TransitionKind::EntityCreated => "entity_created",
            TransitionKind::EntitySelected => "entity_selected",
            TransitionKind::RoleAssigned => "role_assigned",
            TransitionKind::RoleRevoked => "role_revoked",
            TransitionKind::UserDeleted => "user_deleted",
            TransitionKind::ErrorOccurred => "error_occurred",
            TransitionKind::ErrorCleared => "error_cleared",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransitionKind {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_").to_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| E2eError::UnknownTransition(s.to_string()))
    }
}

/// Where the target value is placed in the DOM locator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSlot {
    /// Accessible name
    Name,
    /// Contained text
    Text,
    /// Target not used by the locator
    Ignored,
}

/// DOM fallback parameterized by the target value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomTemplate {
    pub role: String,
    pub slot: TargetSlot,
    /// Accessible name used when the target is not part of the locator
    pub fixed_name: Option<String>,
    pub state: ElementState,
}

impl DomTemplate {
    pub fn new(role: impl Into<String>, slot: TargetSlot, state: ElementState) -> Self {
        Self {
            role: role.into(),
            slot,
            fixed_name: None,
            state,
        }
    }

    pub fn fixed(role: impl Into<String>, name: impl Into<String>, state: ElementState) -> Self {
        Self {
            role: role.into(),
            slot: TargetSlot::Ignored,
            fixed_name: Some(name.into()),
            state,
        }
    }

    pub fn render(&self, target: &str) -> DomCondition {
        let mut locator = Locator::role(self.role.clone());
        match self.slot {
            TargetSlot::Name => locator.name = Some(target.to_string()),
            TargetSlot::Text => locator.text = Some(target.to_string()),
            TargetSlot::Ignored => {}
        }
        if let Some(name) = &self.fixed_name {
            locator.name = Some(name.clone());
        }
        DomCondition::new(locator, self.state.clone())
    }
}

/// One registered transition
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionEntry {
    pub kind: TransitionKind,
    pub channel: Channel,
    pub field: PayloadField,
    pub timeout_class: TimeoutClass,
    pub race: RaceMode,
    /// `None` means the event is the only accepted proof
    pub dom: Option<DomTemplate>,
}

impl TransitionEntry {
    pub fn new(kind: TransitionKind, channel: Channel, field: PayloadField, timeout_class: TimeoutClass) -> Self {
        Self {
            kind,
            channel,
            field,
            timeout_class,
            race: RaceMode::FirstChannel,
            dom: None,
        }
    }

    pub fn with_dom(mut self, template: DomTemplate) -> Self {
        self.dom = Some(template);
        self
    }

    pub fn with_race(mut self, race: RaceMode) -> Self {
        self.race = race;
        self
    }

    fn validate(&self) -> E2eResult<()> {
        if !self.channel.carries(self.field) {
            return Err(E2eError::InvalidCatalogEntry(format!(
                "{}: channel '{}' has no field '{}'",
                self.kind, self.channel, self.field
            )));
        }
        if let Some(dom) = &self.dom {
            if dom.role.trim().is_empty() {
                return Err(E2eError::InvalidCatalogEntry(format!("{}: empty DOM role", self.kind)));
            }
        }
        if self.race == RaceMode::EventConfirmedByDom && self.dom.is_none() {
            return Err(E2eError::InvalidCatalogEntry(format!(
                "{}: DOM confirmation requires a DOM template",
                self.kind
            )));
        }
        Ok(())
    }
}

/// Immutable table of transitions
#[derive(Debug, Clone)]
pub struct TransitionCatalog {
    entries: HashMap<TransitionKind, TransitionEntry>,
    timeouts: TimeoutConfig,
}

/// Collects entries before the catalog is frozen
#[derive(Debug, Clone)]
pub struct CatalogBuilder {
    entries: HashMap<TransitionKind, TransitionEntry>,
    timeouts: TimeoutConfig,
}

impl CatalogBuilder {
    /// Add or replace the entry for `entry.kind`
    pub fn register(mut self, entry: TransitionEntry) -> E2eResult<Self> {
        entry.validate()?;
        self.entries.insert(entry.kind, entry);
        Ok(self)
    }

    pub fn build(self) -> TransitionCatalog {
        TransitionCatalog {
            entries: self.entries,
            timeouts: self.timeouts,
        }
    }
}

static STANDARD: Lazy<TransitionCatalog> = Lazy::new(|| TransitionCatalog::standard(TimeoutConfig::default()));

/// The standard catalog with default timeouts
pub fn standard_catalog() -> &'static TransitionCatalog {
    &STANDARD
}

fn standard_entries() -> Vec<TransitionEntry> {
    use ElementState::{Absent, Present, Selected};
    use TimeoutClass::{Long, Medium, Short};
    use TransitionKind as K;

    vec![
        TransitionEntry::new(K::WorldSelected, Channel::WorldSelected, PayloadField::WorldName, Medium)
            .with_dom(DomTemplate::new("option", TargetSlot::Name, Selected)),
        TransitionEntry::new(K::CampaignSelected, Channel::CampaignSelected, PayloadField::CampaignName, Medium)
            .with_dom(DomTemplate::new("option", TargetSlot::Name, Selected)),
        TransitionEntry::new(K::PlanningModeEntered, Channel::PlanningModeEntered, PayloadField::WorldName, Long)
            .with_dom(DomTemplate::fixed("tab", "Planning", Selected)),
        TransitionEntry::new(K::SubTabChanged, Channel::SubTabChanged, PayloadField::Tab, Short)
            .with_dom(DomTemplate::new("tab", TargetSlot::Name, Selected)),
        TransitionEntry::new(K::ModalOpened, Channel::ModalOpened, PayloadField::Modal, Short)
            .with_dom(DomTemplate::new("dialog", TargetSlot::Name, Present)),
        TransitionEntry::new(K::ModalClosed, Channel::ModalClosed, PayloadField::Modal, Short)
            .with_dom(DomTemplate::new("dialog", TargetSlot::Name, Absent)),
        TransitionEntry::new(K::EntityCreated, Channel::EntityCreated, PayloadField::Name, Medium)
            .with_dom(DomTemplate::new("row", TargetSlot::Text, Present)),
        TransitionEntry::new(K::EntitySelected, Channel::EntitySelected, PayloadField::Name, Short)
            .with_dom(DomTemplate::new("row", TargetSlot::Name, Selected)),
        // Role and user changes have no reliable rendered signal
        TransitionEntry::new(K::RoleAssigned, Channel::RoleAssigned, PayloadField::Role, Medium),
        TransitionEntry::new(K::RoleRevoked, Channel::RoleRevoked, PayloadField::Role, Medium),
        TransitionEntry::new(K::UserDeleted, Channel::UserDeleted, PayloadField::User, Medium),
        TransitionEntry::new(K::ErrorOccurred, Channel::ErrorOccurred, PayloadField::Message, Short)
            .with_dom(DomTemplate::new("alert", TargetSlot::Text, Present)),
        TransitionEntry::new(K::ErrorCleared, Channel::ErrorCleared, PayloadField::Message, Short)
            .with_dom(DomTemplate::new("alert", TargetSlot::Text, Absent)),
    ]
}

impl TransitionCatalog {
    pub fn builder(timeouts: TimeoutConfig) -> CatalogBuilder {
        CatalogBuilder {
            entries: HashMap::new(),
            timeouts,
        }
    }

    /// Builder pre-filled with the standard transitions
    pub fn standard_builder(timeouts: TimeoutConfig) -> CatalogBuilder {
        let entries = standard_entries()
            .into_iter()
            .map(|entry| (entry.kind, entry))
            .collect();
        CatalogBuilder { entries, timeouts }
    }

    pub fn standard(timeouts: TimeoutConfig) -> Self {
        Self::standard_builder(timeouts).build()
    }

    pub fn entry(&self, kind: TransitionKind) -> Option<&TransitionEntry> {
        self.entries.get(&kind)
    }

    /// Registered kinds, in declaration order
    pub fn kinds(&self) -> Vec<TransitionKind> {
        let mut kinds: Vec<_> = self.entries.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    pub fn default_timeout(&self, kind: TransitionKind) -> E2eResult<Duration> {
        let entry = self
            .entry(kind)
            .ok_or_else(|| E2eError::UnknownTransition(kind.to_string()))?;
        Ok(self.timeouts.duration(entry.timeout_class))
    }

    /// Instantiate the wait for `kind` targeting `target`
    pub fn spec_for(
        &self,
        kind: TransitionKind,
        target: &str,
        timeout_override: Option<Duration>,
    ) -> E2eResult<WaitSpec> {
        let entry = self
            .entry(kind)
            .ok_or_else(|| E2eError::UnknownTransition(kind.to_string()))?;

        let timeout = timeout_override.unwrap_or_else(|| self.timeouts.duration(entry.timeout_class));
        let mut spec = WaitSpec::new(entry.channel, MatchRule::fuzzy(entry.field, target), timeout);
        if let Some(template) = &entry.dom {
            spec.dom_fallback = Some(template.render(target));
        }
        spec.race = entry.race;
        spec.validate()?;
        Ok(spec)
    }
}
