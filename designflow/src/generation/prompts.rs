//! Prompt builders for the four structured calls.

use crate::core::UiSpec;

/// A system and user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Instructions for the model.
    pub system: String,
    /// The request itself.
    pub user: String,
}

const CONCEPTS_SYSTEM: &str = "You are a senior product designer. Propose distinct design concepts for the brief. \
Respond with a JSON array of objects, each with \"name\" and \"description\" fields, and nothing else.";

const CONCEPT_EVALUATION_SYSTEM: &str = "You are a design critic. Score each concept from 0 to 10 for how well it \
answers the brief. Respond with a JSON array of objects with \"concept\" (the concept text exactly as given), \
\"score\" and \"reason\" fields.";

const SPEC_SYSTEM: &str = "You are a UI architect. Turn the design concept into a structured UI specification. \
Respond with a JSON object with \"name\", \"description\" and \"components\" fields. Each component has \"name\", \
\"type\", optional \"props\" and optional \"children\".";

const SPEC_EVALUATION_SYSTEM: &str = "You are a UI reviewer. Evaluate the specification against the brief. \
Respond with a JSON object with \"scores\" (clarity, structure, feasibility, accessibility, each 0 to 10), \
\"issues\" (objects with category, severity of low/medium/high/critical, description, suggestion), \
\"strengths\" and \"recommendations\" (arrays of strings).";

/// Variation hints so parallel spec requests explore different directions.
const SPEC_VARIANTS: [&str; 3] = [
    "Favour a conventional, familiar layout.",
    "Favour a compact layout that minimizes steps.",
    "Favour an expressive layout with clear visual hierarchy.",
];

/// Prompt for concept generation.
#[must_use]
pub fn concepts(brief: &str) -> Prompt {
    Prompt {
        system: CONCEPTS_SYSTEM.to_string(),
        user: format!("Design brief:\n{brief}\n\nPropose three concepts."),
    }
}

/// Prompt for concept evaluation.
#[must_use]
pub fn concept_evaluation(brief: &str, concepts: &[String]) -> Prompt {
    let listed = concepts
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {c}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    Prompt {
        system: CONCEPT_EVALUATION_SYSTEM.to_string(),
        user: format!("Design brief:\n{brief}\n\nConcepts:\n{listed}"),
    }
}

/// Prompt for spec generation; `variant` selects the exploration hint.
#[must_use]
pub fn spec(brief: &str, concept: &str, variant: usize) -> Prompt {
    let hint = SPEC_VARIANTS[variant % SPEC_VARIANTS.len()];
    Prompt {
        system: SPEC_SYSTEM.to_string(),
        user: format!("Design brief:\n{brief}\n\nSelected concept:\n{concept}\n\n{hint}"),
    }
}

/// Prompt for spec evaluation.
#[must_use]
pub fn spec_evaluation(brief: &str, spec: &UiSpec) -> Prompt {
    let rendered = serde_json::to_string_pretty(spec).unwrap_or_else(|_| spec.name.clone());
    Prompt {
        system: SPEC_EVALUATION_SYSTEM.to_string(),
        user: format!("Design brief:\n{brief}\n\nSpecification:\n{rendered}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ComponentSpec;

    #[test]
    fn test_concept_evaluation_lists_concepts() {
        let prompt = concept_evaluation("Login", &["A".to_string(), "B".to_string()]);
        assert!(prompt.user.contains("1. A\n2. B"));
    }

    #[test]
    fn test_spec_variants_cycle() {
        assert_ne!(spec("b", "c", 0).user, spec("b", "c", 1).user);
        assert_eq!(spec("b", "c", 0).user, spec("b", "c", 3).user);
    }

    #[test]
    fn test_spec_evaluation_embeds_spec() {
        let ui = UiSpec::new("Login card", "").with_component(ComponentSpec::new("Form", "form"));
        let prompt = spec_evaluation("Login", &ui);
        assert!(prompt.user.contains("Login card"));
        assert!(prompt.user.contains("\"form\""));
    }
}
