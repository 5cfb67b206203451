//! Shared scenario data.

use crate::core::{ComponentSpec, EvaluationResult, Issue, Severity, SubScores, UiSpec};

/// The brief used across end-to-end tests.
pub const LOGIN_FORM_BRIEF: &str = "Design a login form";

/// Three distinct login form concepts.
#[must_use]
pub fn login_form_concepts() -> Vec<String> {
    ["Concept X", "Concept Y", "Concept Z"].iter().map(ToString::to_string).collect()
}

const LOGIN_VARIANTS: [&str; 3] = ["Centered Card Login", "Split Screen Login", "Minimal Inline Login"];

/// Name of the login form spec generated for `variant`.
#[must_use]
pub fn login_form_spec_name(variant: usize) -> String {
    LOGIN_VARIANTS
        .get(variant)
        .map_or_else(|| format!("Login Variant {}", variant + 1), ToString::to_string)
}

/// A well-formed login form spec for `variant`.
#[must_use]
pub fn login_form_spec(variant: usize) -> UiSpec {
    UiSpec::new(login_form_spec_name(variant), "Email and password sign-in").with_component(
        ComponentSpec::new("LoginForm", "form")
            .with_child(ComponentSpec::new("EmailField", "input").with_prop("type", serde_json::json!("email")))
            .with_child(ComponentSpec::new("PasswordField", "input").with_prop("type", serde_json::json!("password")))
            .with_child(ComponentSpec::new("SubmitButton", "button").with_prop("label", serde_json::json!("Sign in"))),
    )
}

/// A spec with the given name and a single component.
#[must_use]
pub fn spec(name: &str) -> UiSpec {
    UiSpec::new(name, "").with_component(ComponentSpec::new("Container", "container"))
}

/// An evaluation with the given sub-scores and no issues.
#[must_use]
pub fn evaluation(clarity: f64, structure: f64, feasibility: f64, accessibility: f64) -> EvaluationResult {
    EvaluationResult::new(SubScores::new(clarity, structure, feasibility, accessibility))
}

/// An evaluation carrying one issue of `severity`.
#[must_use]
pub fn evaluation_with_issue(scores: SubScores, severity: Severity) -> EvaluationResult {
    EvaluationResult::new(scores).with_issue(Issue::new(
        "accessibility",
        severity,
        "Password field has no visible label",
        "Add a persistent label",
    ))
}
