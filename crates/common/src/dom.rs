//! Rendered-state model
//!
//! Selectable controls expose an `aria-selected` attribute and are located
//! by role plus accessible name; list rows are located by role plus
//! contained text. A [`DomProbe`] answers locator queries against whatever
//! renders the page; [`InMemoryDom`] is an isolated implementation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{ProbeError, ProbeResult};
use crate::matcher::{matches, normalize, MatchMode};

/// Attribute carrying the selected state of tab-like controls
pub const SELECTED_ATTRIBUTE: &str = "aria-selected";

/// One rendered element, reduced to what locators and predicates read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomElement {
    pub role: String,

    /// Accessible name
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub test_id: Option<String>,

    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl DomElement {
    pub fn new(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            name: name.into(),
            text: String::new(),
            test_id: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_test_id(mut self, test_id: impl Into<String>) -> Self {
        self.test_id = Some(test_id.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn is_selected(&self) -> bool {
        self.attribute(SELECTED_ATTRIBUTE)
            .map(|v| normalize(v) == "true")
            .unwrap_or(false)
    }
}

/// Role / name / text query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    /// Exact role, case-insensitive
    #[serde(default)]
    pub role: Option<String>,

    /// Accessible name, fuzzy
    #[serde(default)]
    pub name: Option<String>,

    /// Contained text, fuzzy
    #[serde(default)]
    pub text: Option<String>,

    /// `data-testid`, exact
    #[serde(default)]
    pub test_id: Option<String>,
}

impl Locator {
    pub fn role(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            ..Default::default()
        }
    }

    pub fn role_with_name(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::role(role)
        }
    }

    pub fn test_id(test_id: impl Into<String>) -> Self {
        Self {
            test_id: Some(test_id.into()),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// An empty locator would match everything
    pub fn is_empty(&self) -> bool {
        self.role.is_none() && self.name.is_none() && self.text.is_none() && self.test_id.is_none()
    }

    pub fn matches(&self, element: &DomElement) -> bool {
        if let Some(role) = &self.role {
            if !matches(&element.role, role, MatchMode::Exact) {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if !matches(&element.name, name, MatchMode::ContainsEitherDirection) {
                return false;
            }
        }
        if let Some(text) = &self.text {
            let haystack = normalize(&element.text);
            let needle = normalize(text);
            // Row text is usually longer than the fixture name, so only one direction
            if needle.is_empty() || !haystack.contains(&needle) {
                return false;
            }
        }
        if let Some(test_id) = &self.test_id {
            if element.test_id.as_deref() != Some(test_id.as_str()) {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(role) = &self.role {
            parts.push(format!("role={}", role));
        }
        if let Some(name) = &self.name {
            parts.push(format!("name={:?}", name));
        }
        if let Some(text) = &self.text {
            parts.push(format!("text~{:?}", text));
        }
        if let Some(test_id) = &self.test_id {
            parts.push(format!("testid={}", test_id));
        }
        if parts.is_empty() {
            f.write_str("<any>")
        } else {
            f.write_str(&parts.join(" "))
        }
    }
}

/// Predicate over the elements a locator finds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ElementState {
    /// At least one element located
    Present,
    /// Nothing located
    Absent,
    /// Some located element has `aria-selected="true"`
    Selected,
    AttributeEquals { attribute: String, value: String },
    TextContains { text: String },
}

impl ElementState {
    /// Evaluate against a located set; an empty set only satisfies `Absent`
    pub fn evaluate(&self, elements: &[DomElement]) -> bool {
        match self {
            ElementState::Absent => elements.is_empty(),
            ElementState::Present => !elements.is_empty(),
            ElementState::Selected => elements.iter().any(DomElement::is_selected),
            ElementState::AttributeEquals { attribute, value } => elements
                .iter()
                .any(|e| e.attribute(attribute).map(|v| v == value).unwrap_or(false)),
            ElementState::TextContains { text } => {
                let needle = normalize(text);
                !needle.is_empty()
                    && elements
                        .iter()
                        .any(|e| normalize(&e.text).contains(&needle))
            }
        }
    }
}

impl fmt::Display for ElementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementState::Present => f.write_str("present"),
            ElementState::Absent => f.write_str("absent"),
            ElementState::Selected => write!(f, "{}=true", SELECTED_ATTRIBUTE),
            ElementState::AttributeEquals { attribute, value } => {
                write!(f, "{}={:?}", attribute, value)
            }
            ElementState::TextContains { text } => write!(f, "text contains {:?}", text),
        }
    }
}

/// A locator paired with the state that signals a completed transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomCondition {
    pub locator: Locator,
    pub state: ElementState,
}

impl DomCondition {
    pub fn new(locator: Locator, state: ElementState) -> Self {
        Self { locator, state }
    }

    pub fn selected(locator: Locator) -> Self {
        Self::new(locator, ElementState::Selected)
    }

    pub fn present(locator: Locator) -> Self {
        Self::new(locator, ElementState::Present)
    }

    pub fn absent(locator: Locator) -> Self {
        Self::new(locator, ElementState::Absent)
    }

    pub fn evaluate(&self, elements: &[DomElement]) -> bool {
        self.state.evaluate(elements)
    }
}

impl fmt::Display for DomCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.locator, self.state)
    }
}

/// Read-only view of the rendered page
#[async_trait]
pub trait DomProbe: Send + Sync {
    /// Elements matching `locator`; an empty set is a normal answer
    async fn locate(&self, locator: &Locator) -> ProbeResult<Vec<DomElement>>;
}

#[derive(Default)]
struct DomState {
    elements: Vec<DomElement>,
    pending_failures: usize,
}

/// Mutable in-memory page used by tests and scenarios
#[derive(Clone, Default)]
pub struct InMemoryDom {
    state: Arc<RwLock<DomState>>,
}

impl InMemoryDom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_elements(elements: impl IntoIterator<Item = DomElement>) -> Self {
        let dom = Self::new();
        dom.state.write().elements.extend(elements);
        dom
    }

    pub fn insert(&self, element: DomElement) {
        self.state.write().elements.push(element);
    }

    /// Set an attribute on every element matching `locator`; returns how many changed
    pub fn set_attribute(&self, locator: &Locator, attribute: &str, value: &str) -> usize {
        let mut state = self.state.write();
        let mut changed = 0;
        for element in state.elements.iter_mut().filter(|e| locator.matches(e)) {
            element.attributes.insert(attribute.to_string(), value.to_string());
            changed += 1;
        }
        changed
    }

    /// Mark the located control selected and clear its role siblings
    pub fn select(&self, locator: &Locator) -> usize {
        let mut state = self.state.write();
        let mut changed = 0;
        for element in state.elements.iter_mut() {
            let same_role = locator
                .role
                .as_ref()
                .map(|r| matches(&element.role, r, MatchMode::Exact))
                .unwrap_or(true);
            if !same_role {
                continue;
            }
            let selected = locator.matches(element);
            element
                .attributes
                .insert(SELECTED_ATTRIBUTE.to_string(), selected.to_string());
            if selected {
                changed += 1;
            }
        }
        changed
    }

    /// Remove every element matching `locator`; returns how many were removed
    pub fn remove(&self, locator: &Locator) -> usize {
        let mut state = self.state.write();
        let before = state.elements.len();
        state.elements.retain(|e| !locator.matches(e));
        before - state.elements.len()
    }

    /// Make the next `count` probe calls fail
    pub fn fail_next(&self, count: usize) {
        self.state.write().pending_failures = count;
    }

    pub fn snapshot(&self) -> Vec<DomElement> {
        self.state.read().elements.clone()
    }
}

#[async_trait]
impl DomProbe for InMemoryDom {
    async fn locate(&self, locator: &Locator) -> ProbeResult<Vec<DomElement>> {
        if locator.is_empty() {
            return Err(ProbeError::InvalidLocator("empty locator".to_string()));
        }

        let mut state = self.state.write();
        if state.pending_failures > 0 {
            state.pending_failures -= 1;
            return Err(ProbeError::Detached("simulated render failure".to_string()));
        }

        Ok(state
            .elements
            .iter()
            .filter(|e| locator.matches(e))
            .cloned()
            .collect())
    }
}

impl fmt::Debug for InMemoryDom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryDom")
            .field("elements", &self.state.read().elements.len())
            .finish()
    }
}
