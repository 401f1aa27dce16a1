//! Drift classification: why does a stored expectation no longer match?
//!
//! Classification is an ordered decision table of `(pattern, predicate)`
//! rules evaluated first-match-wins. Specific, safe patterns come before
//! generic ones. The whole procedure is a pure function of the expression
//! text and the two values: no state, no I/O.

pub mod rules;

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ClassifierConfig;
use crate::model::Mismatch;

// ── DriftPattern ───────────────────────────────────────────────────────────

/// The kind of drift a mismatch exhibits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriftPattern {
    DateFormat,
    FloatingPoint,
    StringEscaping,
    ArrayStructural,
    ObjectStructural,
    TemplateLiteral,
    RangeBracket,
    TypeCoercion,
    Other,
}

impl DriftPattern {
    pub const ALL: [DriftPattern; 9] = [
        Self::DateFormat,
        Self::FloatingPoint,
        Self::StringEscaping,
        Self::ArrayStructural,
        Self::ObjectStructural,
        Self::TemplateLiteral,
        Self::RangeBracket,
        Self::TypeCoercion,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DateFormat => "date-format",
            Self::FloatingPoint => "floating-point",
            Self::StringEscaping => "string-escaping",
            Self::ArrayStructural => "array-structural",
            Self::ObjectStructural => "object-structural",
            Self::TemplateLiteral => "template-literal",
            Self::RangeBracket => "range-bracket",
            Self::TypeCoercion => "type-coercion",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for DriftPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── ConfidenceTier ─────────────────────────────────────────────────────────

/// How safe it is to rewrite the record automatically.
///
/// Ordered `Skip < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Skip,
    Medium,
    High,
}

impl ConfidenceTier {
    pub const ALL: [ConfidenceTier; 3] = [Self::High, Self::Medium, Self::Skip];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Whether a record at this tier may be patched when `min` is the lowest
    /// tier allowed. `Skip` never qualifies.
    pub fn permits_patch(self, min: ConfidenceTier) -> bool {
        self != Self::Skip && self >= min
    }
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfidenceTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "skip" => Ok(Self::Skip),
            other => Err(format!("unknown tier \"{other}\" (expected high, medium or skip)")),
        }
    }
}

// ── ClassificationResult ───────────────────────────────────────────────────

/// Outcome of classifying one mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub pattern: DriftPattern,
    pub tier: ConfidenceTier,
    /// Short explanation, surfaced as the manual-review recommendation.
    pub reason: &'static str,
}

impl ClassificationResult {
    fn skip(pattern: DriftPattern, reason: &'static str) -> Self {
        Self {
            pattern,
            tier: ConfidenceTier::Skip,
            reason,
        }
    }
}

// ── Decision table ─────────────────────────────────────────────────────────

/// Inputs visible to every rule.
pub struct Subject<'a> {
    pub expression: &'a str,
    pub expected: &'a Value,
    pub actual: &'a Value,
    pub config: &'a ClassifierConfig,
}

/// A rule's positive answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub tier: ConfidenceTier,
    pub reason: &'static str,
}

/// One row of the decision table.
pub struct Rule {
    pub pattern: DriftPattern,
    pub check: fn(&Subject<'_>) -> Option<Verdict>,
}

/// Rules in priority order. The first rule returning a verdict wins.
pub const RULES: &[Rule] = &[
    Rule {
        pattern: DriftPattern::DateFormat,
        check: rules::date_format,
    },
    Rule {
        pattern: DriftPattern::FloatingPoint,
        check: rules::floating_point,
    },
    Rule {
        pattern: DriftPattern::StringEscaping,
        check: rules::string_escaping,
    },
    Rule {
        pattern: DriftPattern::ArrayStructural,
        check: rules::array_structural,
    },
    Rule {
        pattern: DriftPattern::ObjectStructural,
        check: rules::object_structural,
    },
    Rule {
        pattern: DriftPattern::TemplateLiteral,
        check: rules::template_literal,
    },
    Rule {
        pattern: DriftPattern::RangeBracket,
        check: rules::range_bracket,
    },
    Rule {
        pattern: DriftPattern::TypeCoercion,
        check: rules::type_coercion,
    },
];

/// Classify the drift between `expected` and `actual` for `expression`.
///
/// A broken or empty expression short-circuits to `skip` before any value is
/// compared.
pub fn classify(
    expression: &str,
    expected: &Value,
    actual: &Value,
    config: &ClassifierConfig,
) -> ClassificationResult {
    if let Some(reason) = rules::broken_expression(expression) {
        return ClassificationResult::skip(DriftPattern::Other, reason);
    }

    let subject = Subject {
        expression,
        expected,
        actual,
        config,
    };
    RULES
        .iter()
        .find_map(|rule| {
            (rule.check)(&subject).map(|verdict| ClassificationResult {
                pattern: rule.pattern,
                tier: verdict.tier,
                reason: verdict.reason,
            })
        })
        .unwrap_or_else(|| {
            ClassificationResult::skip(DriftPattern::Other, "no known drift pattern matched")
        })
}

/// Classify a [`Mismatch`]. Evaluation failures are never auto-fixable.
pub fn classify_mismatch(mismatch: &Mismatch, config: &ClassifierConfig) -> ClassificationResult {
    if mismatch.is_eval_error() {
        return ClassificationResult::skip(
            DriftPattern::Other,
            "engine failed to evaluate the expression",
        );
    }
    classify(
        &mismatch.record.expression,
        &mismatch.expected_parsed,
        &mismatch.actual_result,
        config,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(expression: &str, expected: Value, actual: Value) -> ClassificationResult {
        classify(expression, &expected, &actual, &ClassifierConfig::default())
    }

    #[test]
    fn zone_notation_drift_is_high_date_format() {
        let r = run(
            "$now()",
            json!("2023-10-15T00:00:00Z"),
            json!("2023-10-15T00:00:00+00:00"),
        );
        assert_eq!(r.pattern, DriftPattern::DateFormat);
        assert_eq!(r.tier, ConfidenceTier::High);
    }

    #[test]
    fn other_date_rewrites_are_left_for_review() {
        for actual in ["2023-10-15T00:00:00.000Z", "2023-10-15T02:00:00+02:00"] {
            let r = run("$now()", json!("2023-10-15T00:00:00Z"), json!(actual));
            assert_eq!(r.pattern, DriftPattern::Other, "{actual}");
            assert_eq!(r.tier, ConfidenceTier::Skip, "{actual}");
        }
    }

    #[test]
    fn rounding_noise_is_high_floating_point() {
        let r = run("0.1 + 0.2", json!(0.30000000000000004), json!(0.3));
        assert_eq!(r.pattern, DriftPattern::FloatingPoint);
        assert_eq!(r.tier, ConfidenceTier::High);
    }

    #[test]
    fn array_length_change_is_not_structural() {
        let r = run("items", json!(["a", "b"]), json!(["a", "b", "c"]));
        assert_eq!(r.pattern, DriftPattern::Other);
        assert_eq!(r.tier, ConfidenceTier::Skip);
    }

    #[test]
    fn key_set_change_is_not_structural() {
        let r = run(
            "person",
            json!({"name": "Jane"}),
            json!({"name": "Jane", "active": true}),
        );
        assert_eq!(r.pattern, DriftPattern::Other);
        assert_eq!(r.tier, ConfidenceTier::Skip);
    }

    #[test]
    fn type_change_is_skipped_coercion() {
        let r = run("$string(5)", json!("5"), json!(5));
        assert_eq!(r.pattern, DriftPattern::TypeCoercion);
        assert_eq!(r.tier, ConfidenceTier::Skip);
    }

    #[test]
    fn undefined_marker_short_circuits() {
        let r = run(
            "undefined.value",
            json!("2023-10-15T00:00:00Z"),
            json!("2023-10-15T00:00:00+00:00"),
        );
        assert_eq!(r.pattern, DriftPattern::Other);
        assert_eq!(r.tier, ConfidenceTier::Skip);
    }

    #[test]
    fn empty_expression_short_circuits() {
        let r = run("   ", json!(0.3), json!(0.30000000000000004));
        assert_eq!(r.tier, ConfidenceTier::Skip);
    }

    #[test]
    fn same_keys_different_values_is_medium_object() {
        let r = run("o", json!({"a": 1, "b": 2}), json!({"b": 3, "a": 1}));
        assert_eq!(r.pattern, DriftPattern::ObjectStructural);
        assert_eq!(r.tier, ConfidenceTier::Medium);
    }

    #[test]
    fn rules_are_checked_in_priority_order() {
        // Both a template expression and a date drift: the value rule wins.
        let r = run(
            "`${date}`",
            json!("2023-10-15T00:00:00Z"),
            json!("2023-10-15T00:00:00+00:00"),
        );
        assert_eq!(r.pattern, DriftPattern::DateFormat);

        // Template detection outranks type coercion.
        let r = run("`${n}`", json!("5"), json!(5));
        assert_eq!(r.pattern, DriftPattern::TemplateLiteral);
        assert_eq!(r.tier, ConfidenceTier::Medium);
    }

    #[test]
    fn classification_is_deterministic() {
        let cases = [
            ("a", json!(1.0), json!(1.0005)),
            ("[1..3]", json!([1, 2]), json!("x")),
            ("b", json!({"k": [1]}), json!({"k": [2]})),
        ];
        for (expr, e, a) in cases {
            assert_eq!(run(expr, e.clone(), a.clone()), run(expr, e, a));
        }
    }

    #[test]
    fn eval_errors_are_never_fixable() {
        let record = crate::model::Record {
            id: "x".into(),
            title: String::new(),
            description: String::new(),
            category: String::new(),
            expression: "a".into(),
            sample_input: "{}".into(),
            expected_output: "1".into(),
            source_file: "f.ts".into(),
        };
        let m = Mismatch::failed(record, json!(1), Some(500), "boom".into());
        let r = classify_mismatch(&m, &ClassifierConfig::default());
        assert_eq!(r.tier, ConfidenceTier::Skip);
    }

    #[test]
    fn tier_ordering_and_parsing() {
        assert!(ConfidenceTier::High.permits_patch(ConfidenceTier::Medium));
        assert!(ConfidenceTier::Medium.permits_patch(ConfidenceTier::Medium));
        assert!(!ConfidenceTier::Medium.permits_patch(ConfidenceTier::High));
        assert!(!ConfidenceTier::Skip.permits_patch(ConfidenceTier::Skip));
        assert_eq!("HIGH".parse::<ConfidenceTier>().unwrap(), ConfidenceTier::High);
        assert!("maybe".parse::<ConfidenceTier>().is_err());
    }

    #[test]
    fn pattern_names_are_kebab_case() {
        for pattern in DriftPattern::ALL {
            let json = serde_json::to_value(pattern).unwrap();
            assert_eq!(json, json!(pattern.as_str()));
        }
    }
}
