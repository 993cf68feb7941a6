//! Declarative YAML scenarios
//!
//! A scenario scripts what the application does (publish notifications,
//! re-render elements) on a timeline and states what a wait should observe.
//! Scenarios pin down the coordinator's timing behavior without a browser.

use std::path::Path;
use std::time::Duration;

use campaign_common::{
    Channel, DomCondition, DomElement, InMemoryBus, InMemoryDom, Locator, MatchMode, MatchRule,
    Notification, PayloadField,
};
use serde::{Deserialize, Serialize};

use crate::catalog::{TransitionCatalog, TransitionKind};
use crate::coordinator::{RaceMode, SatisfiedBy, WaitSpec};
use crate::error::{E2eError, E2eResult};

/// A complete scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    /// Unique name for this scenario
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Tags for filtering
    #[serde(default)]
    pub tags: Vec<String>,

    /// How the wait is started relative to the stimuli
    #[serde(default)]
    pub trigger: TriggerMode,

    /// Elements rendered before the wait starts
    #[serde(default)]
    pub initial_dom: Vec<DomElement>,

    /// Notifications dispatched before the wait starts
    #[serde(default)]
    pub history: Vec<Notification>,

    pub wait: WaitDecl,

    /// Timed application behavior, relative to the start of the wait
    #[serde(default)]
    pub stimuli: Vec<Stimulus>,

    pub expect: Expectation,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// `await_transition`, stimuli already scheduled
    #[default]
    Await,
    /// `with_pending_transition`, stimuli scheduled by the action
    Pending,
}

/// The wait under test: a catalog transition or a raw channel/field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitDecl {
    #[serde(default)]
    pub transition: Option<TransitionKind>,

    #[serde(default)]
    pub channel: Option<Channel>,

    #[serde(default)]
    pub field: Option<PayloadField>,

    pub target: String,

    #[serde(default)]
    pub match_mode: MatchMode,

    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Replaces the catalog's DOM condition when set
    #[serde(default)]
    pub dom_fallback: Option<DomCondition>,

    #[serde(default)]
    pub race: Option<RaceMode>,
}

impl WaitDecl {
    pub fn to_wait_spec(&self, catalog: &TransitionCatalog) -> E2eResult<WaitSpec> {
        let timeout = self.timeout_ms.map(Duration::from_millis);

        let mut spec = match (self.transition, self.channel, self.field) {
            (Some(kind), None, None) => catalog.spec_for(kind, &self.target, timeout)?,
            (None, Some(channel), Some(field)) => {
                let timeout = timeout.ok_or_else(|| {
                    E2eError::ScenarioParse(format!("raw wait on '{}' needs timeout_ms", channel))
                })?;
                WaitSpec::new(channel, MatchRule::fuzzy(field, self.target.clone()), timeout)
            }
            _ => {
                return Err(E2eError::ScenarioParse(
                    "wait needs either `transition` or both `channel` and `field`".to_string(),
                ))
            }
        };

        spec.rule.mode = self.match_mode;
        if let Some(condition) = &self.dom_fallback {
            spec.dom_fallback = Some(condition.clone());
        }
        if let Some(race) = self.race {
            spec.race = race;
        }
        spec.validate()?;
        Ok(spec)
    }
}

/// One scripted application event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stimulus {
    pub at_ms: u64,

    #[serde(flatten)]
    pub action: StimulusAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StimulusAction {
    Publish {
        notification: Notification,
    },
    Insert {
        element: DomElement,
    },
    /// Mark the located control selected, clearing its siblings
    Select {
        locator: Locator,
    },
    SetAttribute {
        locator: Locator,
        attribute: String,
        value: String,
    },
    Remove {
        locator: Locator,
    },
}

impl StimulusAction {
    pub fn apply(&self, bus: &InMemoryBus, dom: &InMemoryDom) {
        match self {
            StimulusAction::Publish { notification } => {
                bus.publish(notification.clone());
            }
            StimulusAction::Insert { element } => dom.insert(element.clone()),
            StimulusAction::Select { locator } => {
                dom.select(locator);
            }
            StimulusAction::SetAttribute { locator, attribute, value } => {
                dom.set_attribute(locator, attribute, value);
            }
            StimulusAction::Remove { locator } => {
                dom.remove(locator);
            }
        }
    }
}

/// What the wait must observe
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Expectation {
    Satisfied {
        #[serde(default)]
        channel: Option<SatisfiedBy>,
        #[serde(default)]
        min_elapsed_ms: Option<u64>,
        #[serde(default)]
        max_elapsed_ms: Option<u64>,
    },
    Timeout {
        #[serde(default)]
        min_elapsed_ms: Option<u64>,
        #[serde(default)]
        max_elapsed_ms: Option<u64>,
        /// Text the error message must contain
        #[serde(default)]
        names: Option<String>,
    },
}

impl ScenarioSpec {
    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| {
            E2eError::ScenarioParse(format!("{}: {}", path.display(), e))
        })
    }

    /// Load all scenarios from a directory, sorted by name
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut specs = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            specs.push(Self::from_file(entry.path())?);
        }

        specs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(specs)
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::standard_catalog;

    #[test]
    fn test_parse_raw_channel_scenario() {
        let yaml = r#"
name: entity-selected-event
description: Notification arrives shortly after the wait starts
tags:
  - event
  - smoke
wait:
  channel: entity-selected
  field: name
  target: Campfire Tavern
  timeout_ms: 3000
stimuli:
  - at_ms: 50
    action: publish
    notification:
      channel: entity-selected
      name: Campfire Tavern
expect:
  outcome: satisfied
  channel: event
  max_elapsed_ms: 200
"#;
        let spec = ScenarioSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.name, "entity-selected-event");
        assert_eq!(spec.trigger, TriggerMode::Await);
        assert_eq!(spec.stimuli.len(), 1);
        assert!(matches!(
            spec.stimuli[0].action,
            StimulusAction::Publish { notification: Notification::EntitySelected { .. } }
        ));

        let wait = spec.wait.to_wait_spec(standard_catalog()).unwrap();
        assert_eq!(wait.channel, Channel::EntitySelected);
        assert_eq!(wait.timeout, Duration::from_millis(3000));
        assert!(wait.dom_fallback.is_none());
    }

    #[test]
    fn test_parse_catalog_scenario_with_dom() {
        let yaml = r#"
name: sub-tab-dom
trigger: pending
initial_dom:
  - role: tab
    name: Story Arcs
    attributes:
      aria-selected: "false"
wait:
  transition: sub_tab_changed
  target: Story Arcs
stimuli:
  - at_ms: 100
    action: select
    locator:
      role: tab
      name: Story Arcs
expect:
  outcome: satisfied
  channel: dom
"#;
        let spec = ScenarioSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.trigger, TriggerMode::Pending);
        assert_eq!(spec.initial_dom.len(), 1);

        let wait = spec.wait.to_wait_spec(standard_catalog()).unwrap();
        assert_eq!(wait.timeout, Duration::from_millis(3000));
        assert!(wait.dom_fallback.is_some());
    }

    #[test]
    fn test_raw_wait_requires_timeout() {
        let decl = WaitDecl {
            transition: None,
            channel: Some(Channel::ModalOpened),
            field: Some(PayloadField::Modal),
            target: "New World".to_string(),
            match_mode: MatchMode::Exact,
            timeout_ms: None,
            dom_fallback: None,
            race: None,
        };
        assert!(matches!(
            decl.to_wait_spec(standard_catalog()),
            Err(E2eError::ScenarioParse(_))
        ));
    }

    #[test]
    fn test_ambiguous_wait_rejected() {
        let yaml = r#"
name: both
wait:
  transition: modal_opened
  channel: modal-opened
  field: modal
  target: x
  timeout_ms: 10
expect:
  outcome: timeout
"#;
        let spec = ScenarioSpec::from_yaml(yaml).unwrap();
        assert!(spec.wait.to_wait_spec(standard_catalog()).is_err());
    }

    #[test]
    fn test_filter_by_tag() {
        let mk = |name: &str, tags: &[&str]| ScenarioSpec {
            name: name.to_string(),
            description: String::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            trigger: TriggerMode::Await,
            initial_dom: vec![],
            history: vec![],
            wait: WaitDecl {
                transition: Some(TransitionKind::ModalOpened),
                channel: None,
                field: None,
                target: "x".to_string(),
                match_mode: MatchMode::default(),
                timeout_ms: None,
                dom_fallback: None,
                race: None,
            },
            stimuli: vec![],
            expect: Expectation::Timeout {
                min_elapsed_ms: None,
                max_elapsed_ms: None,
                names: None,
            },
        };
        let specs = vec![mk("a", &["dom"]), mk("b", &["event", "smoke"]), mk("c", &["smoke"])];
        let smoke: Vec<_> = ScenarioSpec::filter_by_tag(&specs, "smoke")
            .into_iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(smoke, vec!["b", "c"]);
    }
}
