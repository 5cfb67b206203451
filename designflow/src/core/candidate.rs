//! Generated candidates: design concepts and structured UI specifications.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One component node of a UI specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Component name, e.g. "EmailField".
    pub name: String,

    /// Component kind, e.g. "input", "button", "form".
    #[serde(default, alias = "type")]
    pub kind: String,

    /// Free-form component properties.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub props: HashMap<String, serde_json::Value>,

    /// Nested components.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ComponentSpec>,
}

impl ComponentSpec {
    /// Creates a component with a name and kind.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            props: HashMap::new(),
            children: Vec::new(),
        }
    }

    /// Adds a property.
    #[must_use]
    pub fn with_prop(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.props.insert(key.into(), value);
        self
    }

    /// Adds a child component.
    #[must_use]
    pub fn with_child(mut self, child: ComponentSpec) -> Self {
        self.children.push(child);
        self
    }
}

/// A structured UI specification produced by spec generation.
///
/// Specs never mutate after creation. A failed generation slot is represented
/// by `None` in the batch, never by an empty spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiSpec {
    /// Display name of the UI spec.
    #[serde(alias = "title")]
    pub name: String,

    /// Short description of the approach.
    #[serde(default)]
    pub description: String,

    /// Top-level components.
    #[serde(default)]
    pub components: Vec<ComponentSpec>,

    /// True for substitutes synthesized when no generated spec was available.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub placeholder: bool,
}

impl UiSpec {
    /// Creates a spec with a name and description.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            components: Vec::new(),
            placeholder: false,
        }
    }

    /// Adds a top-level component.
    #[must_use]
    pub fn with_component(mut self, component: ComponentSpec) -> Self {
        self.components.push(component);
        self
    }

    /// Creates a clearly labelled placeholder spec for the given concept.
    #[must_use]
    pub fn placeholder(slot: usize, concept: &str) -> Self {
        Self {
            name: format!("Placeholder Spec {}", slot + 1),
            description: format!(
                "Placeholder substituted because no generated specification was available for: {concept}"
            ),
            components: vec![ComponentSpec::new("Container", "container")],
            placeholder: true,
        }
    }

    /// Returns true if the UI spec has a name and at least one component.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.name.trim().is_empty() && !self.components.is_empty()
    }

    /// Counts all components, including nested ones.
    #[must_use]
    pub fn component_count(&self) -> usize {
        fn count(components: &[ComponentSpec]) -> usize {
            components.iter().map(|c| 1 + count(&c.children)).sum()
        }
        count(&self.components)
    }
}

/// Score assigned to one design concept during concept evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptEvaluation {
    /// The concept text.
    pub concept: String,
    /// Score in `[0, 10]`.
    pub score: f64,
    /// Why the score was assigned.
    #[serde(default)]
    pub reason: String,
}

impl ConceptEvaluation {
    /// Creates a concept evaluation.
    #[must_use]
    pub fn new(concept: impl Into<String>, score: f64, reason: impl Into<String>) -> Self {
        Self {
            concept: concept.into(),
            score,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_requires_name_and_components() {
        let empty = UiSpec::new("Login", "");
        assert!(!empty.is_well_formed());

        let unnamed = UiSpec::new("  ", "").with_component(ComponentSpec::new("Form", "form"));
        assert!(!unnamed.is_well_formed());

        let spec = UiSpec::new("Login", "").with_component(ComponentSpec::new("Form", "form"));
        assert!(spec.is_well_formed());
    }

    #[test]
    fn test_component_count_includes_children() {
        let spec = UiSpec::new("Login", "").with_component(
            ComponentSpec::new("Form", "form")
                .with_child(ComponentSpec::new("Email", "input"))
                .with_child(ComponentSpec::new("Submit", "button")),
        );
        assert_eq!(spec.component_count(), 3);
    }

    #[test]
    fn test_placeholder_is_labelled() {
        let spec = UiSpec::placeholder(1, "Minimal card");
        assert!(spec.placeholder);
        assert!(spec.is_well_formed());
        assert_eq!(spec.name, "Placeholder Spec 2");
        assert!(spec.description.contains("Minimal card"));
    }

    #[test]
    fn test_spec_deserializes_aliases() {
        let json = serde_json::json!({
            "title": "Split layout",
            "components": [{"name": "Hero", "type": "section"}]
        });
        let spec: UiSpec = serde_json::from_value(json).unwrap();
        assert_eq!(spec.name, "Split layout");
        assert_eq!(spec.components[0].kind, "section");
        assert!(!spec.placeholder);
    }
}
