//! Score normalization for values coming back from the generator.

/// Lowest valid score.
pub const MIN_SCORE: f64 = 0.0;

/// Highest valid score.
pub const MAX_SCORE: f64 = 10.0;

/// Neutral midpoint substituted for invalid scores.
pub const NEUTRAL_SCORE: f64 = 5.0;

/// Normalizes a score into `[0, 10]`.
///
/// Out-of-range and non-finite values are replaced by [`NEUTRAL_SCORE`]
/// rather than clamped, so a wildly wrong value never reads as a perfect or
/// zero score.
#[must_use]
pub fn normalize_score(score: f64) -> f64 {
    if score.is_finite() && (MIN_SCORE..=MAX_SCORE).contains(&score) {
        score
    } else {
        NEUTRAL_SCORE
    }
}

/// Reads a score out of an arbitrary JSON value.
///
/// Numbers and numeric strings ("8.5") are accepted; anything else yields the
/// neutral midpoint.
#[must_use]
pub fn score_from_value(value: Option<&serde_json::Value>) -> f64 {
    let raw = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().trim_end_matches("/10").trim().parse::<f64>().ok(),
        _ => None,
    };
    raw.map_or(NEUTRAL_SCORE, normalize_score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_in_range_scores_pass_through() {
        assert_eq!(normalize_score(0.0), 0.0);
        assert_eq!(normalize_score(7.25), 7.25);
        assert_eq!(normalize_score(10.0), 10.0);
    }

    #[test]
    fn test_out_of_range_scores_become_neutral() {
        assert_eq!(normalize_score(15.0), NEUTRAL_SCORE);
        assert_eq!(normalize_score(-0.1), NEUTRAL_SCORE);
        assert_eq!(normalize_score(f64::INFINITY), NEUTRAL_SCORE);
        assert_eq!(normalize_score(f64::NAN), NEUTRAL_SCORE);
    }

    #[test]
    fn test_score_from_value() {
        assert_eq!(score_from_value(Some(&json!(8))), 8.0);
        assert_eq!(score_from_value(Some(&json!("8.5"))), 8.5);
        assert_eq!(score_from_value(Some(&json!("9/10"))), 9.0);
        assert_eq!(score_from_value(Some(&json!("excellent"))), NEUTRAL_SCORE);
        assert_eq!(score_from_value(Some(&json!(15))), NEUTRAL_SCORE);
        assert_eq!(score_from_value(Some(&json!(null))), NEUTRAL_SCORE);
        assert_eq!(score_from_value(None), NEUTRAL_SCORE);
    }
}
