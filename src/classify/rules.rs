//! Predicates behind the classifier's decision table.
//!
//! Each rule inspects a [`Subject`] and either declines (`None`) or returns a
//! [`Verdict`]. Rules never look at each other; ordering lives in
//! [`RULES`](super::RULES).

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde_json::{Map, Value};

use crate::config::ClassifierConfig;
use crate::corpus::scan::CodeScanner;
use crate::model::ValueKind;

use super::{ConfidenceTier, Subject, Verdict};

static RE_UNDEFINED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bundefined\b").unwrap());

static RE_ISO_DATETIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}(?::[0-9]{2}(?:\.[0-9]+)?)?)(Z|z|[+-][0-9]{2}:?[0-9]{2})$",
    )
    .unwrap()
});

static RE_RANGE_BRACKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\[\]]*?[^.]\.\.[^.][^\[\]]*?\]").unwrap());

fn verdict(tier: ConfidenceTier, reason: &'static str) -> Option<Verdict> {
    Some(Verdict { tier, reason })
}

// ── Guard ──────────────────────────────────────────────────────────────────

/// Reason the expression is unfit for automatic reconciliation, if any.
pub fn broken_expression(expression: &str) -> Option<&'static str> {
    if expression.trim().is_empty() {
        return Some("expression is empty");
    }
    if RE_UNDEFINED.is_match(expression) {
        return Some("expression contains an `undefined` marker");
    }

    let mut stack = Vec::new();
    let mut balanced = true;
    let mut scanner = CodeScanner::new();
    scanner.feed(expression, |_, ch| match ch {
        '(' | '[' | '{' => stack.push(ch),
        ')' | ']' | '}' => {
            let open = match ch {
                ')' => '(',
                ']' => '[',
                _ => '{',
            };
            if stack.pop() != Some(open) {
                balanced = false;
            }
        }
        _ => {}
    });
    if !balanced || !stack.is_empty() {
        return Some("expression has unbalanced brackets");
    }
    if scanner.in_string() {
        return Some("expression has an unterminated string");
    }
    None
}

// ── Value helpers ──────────────────────────────────────────────────────────

/// Split an ISO-8601 date-time into its local part and zone suffix, and
/// parse it. The zone is `Z` or a numeric offset.
pub fn parse_iso_datetime(text: &str) -> Option<(&str, &str, DateTime<FixedOffset>)> {
    let caps = RE_ISO_DATETIME.captures(text)?;
    let local = caps.get(1)?.as_str();
    let suffix = caps.get(2)?.as_str();
    let zone = match suffix {
        "Z" | "z" => "+00:00".to_string(),
        z if z.len() == 5 => format!("{}:{}", &z[..3], &z[3..]),
        z => z.to_string(),
    };
    // `YYYY-MM-DDTHH:MM` has no seconds; RFC 3339 requires them.
    let seconds = if local.len() == 16 { ":00" } else { "" };
    let parsed = DateTime::parse_from_rfc3339(&format!("{local}{seconds}{zone}")).ok()?;
    Some((local, suffix, parsed))
}

/// Whether two timestamps differ only in how the zone is written.
///
/// The local date-time text must be identical and both must name the same
/// instant, so `Z` against `+00:00` qualifies but a shifted offset or a
/// change in fractional precision does not.
fn zone_notation_only(expected: &str, actual: &str) -> bool {
    match (parse_iso_datetime(expected), parse_iso_datetime(actual)) {
        (Some((e_local, e_zone, e)), Some((a_local, a_zone, a))) => {
            e_local == a_local && e_zone != a_zone && e == a
        }
        _ => false,
    }
}

/// Collapse `\"` and `\'` to the bare quote character.
pub fn collapse_escapes(text: &str) -> String {
    text.replace("\\\"", "\"").replace("\\'", "'")
}

fn float_tier(expected: f64, actual: f64, config: &ClassifierConfig) -> Option<ConfidenceTier> {
    let diff = (expected - actual).abs();
    if diff > 0.0 && diff < config.epsilon {
        if diff < config.high_precision {
            Some(ConfidenceTier::High)
        } else {
            Some(ConfidenceTier::Medium)
        }
    } else {
        None
    }
}

fn same_keys(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    a.len() == b.len() && a.keys().all(|k| b.contains_key(k))
}

/// Whether `a` and `b` differ only in formatting, and at which tier.
///
/// Equal values are `High`. Mixed containers take the weakest tier of their
/// members; any substantive difference anywhere makes the whole pair `None`.
pub fn formatting_equivalence(a: &Value, b: &Value, config: &ClassifierConfig) -> Option<ConfidenceTier> {
    if a == b {
        return Some(ConfidenceTier::High);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => {
            let equivalent =
                zone_notation_only(x, y) || collapse_escapes(x) == collapse_escapes(y);
            equivalent.then_some(ConfidenceTier::High)
        }
        (Value::Number(x), Value::Number(y)) => float_tier(x.as_f64()?, y.as_f64()?, config),
        (Value::Array(xs), Value::Array(ys)) if xs.len() == ys.len() => xs
            .iter()
            .zip(ys)
            .map(|(x, y)| formatting_equivalence(x, y, config))
            .try_fold(ConfidenceTier::High, |acc, tier| tier.map(|t| acc.min(t))),
        (Value::Object(xs), Value::Object(ys)) if same_keys(xs, ys) => xs
            .iter()
            .map(|(k, x)| formatting_equivalence(x, ys.get(k)?, config))
            .try_fold(ConfidenceTier::High, |acc, tier| tier.map(|t| acc.min(t))),
        _ => None,
    }
}

// ── Rules ──────────────────────────────────────────────────────────────────

pub fn date_format(s: &Subject<'_>) -> Option<Verdict> {
    let (Value::String(e), Value::String(a)) = (s.expected, s.actual) else {
        return None;
    };
    zone_notation_only(e, a).then_some(Verdict {
        tier: ConfidenceTier::High,
        reason: "same instant; only the zone notation changed",
    })
}

pub fn floating_point(s: &Subject<'_>) -> Option<Verdict> {
    let (Value::Number(e), Value::Number(a)) = (s.expected, s.actual) else {
        return None;
    };
    match float_tier(e.as_f64()?, a.as_f64()?, s.config)? {
        ConfidenceTier::High => verdict(ConfidenceTier::High, "difference is rounding noise"),
        tier => verdict(tier, "numbers differ by less than epsilon"),
    }
}

pub fn string_escaping(s: &Subject<'_>) -> Option<Verdict> {
    let (Value::String(e), Value::String(a)) = (s.expected, s.actual) else {
        return None;
    };
    (e != a && collapse_escapes(e) == collapse_escapes(a))
        .then_some(Verdict {
            tier: ConfidenceTier::High,
            reason: "strings differ only in quote escaping",
        })
}

pub fn array_structural(s: &Subject<'_>) -> Option<Verdict> {
    let (Value::Array(e), Value::Array(a)) = (s.expected, s.actual) else {
        return None;
    };
    if e.len() != a.len() {
        return None;
    }
    match formatting_equivalence(s.expected, s.actual, s.config)? {
        ConfidenceTier::High => verdict(
            ConfidenceTier::High,
            "arrays agree element-wise up to formatting",
        ),
        tier => verdict(tier, "arrays agree element-wise within tolerance"),
    }
}

pub fn object_structural(s: &Subject<'_>) -> Option<Verdict> {
    let (Value::Object(e), Value::Object(a)) = (s.expected, s.actual) else {
        return None;
    };
    same_keys(e, a).then_some(Verdict {
        tier: ConfidenceTier::Medium,
        reason: "same keys; one or more values changed",
    })
}

pub fn template_literal(s: &Subject<'_>) -> Option<Verdict> {
    s.expression.contains("${").then_some(Verdict {
        tier: ConfidenceTier::Medium,
        reason: "template interpolation output changed; review the rendering",
    })
}

pub fn range_bracket(s: &Subject<'_>) -> Option<Verdict> {
    RE_RANGE_BRACKET
        .is_match(s.expression)
        .then_some(Verdict {
            tier: ConfidenceTier::Medium,
            reason: "range-bracket output changed; review the sequence",
        })
}

pub fn type_coercion(s: &Subject<'_>) -> Option<Verdict> {
    (ValueKind::of(s.expected) != ValueKind::of(s.actual)).then_some(Verdict {
        tier: ConfidenceTier::Skip,
        reason: "runtime type changed; likely a behavioral change",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn subject<'a>(
        expression: &'a str,
        expected: &'a Value,
        actual: &'a Value,
        config: &'a ClassifierConfig,
    ) -> Subject<'a> {
        Subject {
            expression,
            expected,
            actual,
            config,
        }
    }

    #[test]
    fn guard_flags_unbalanced_and_unterminated() {
        assert!(broken_expression("$sum(items[0]").is_some());
        assert!(broken_expression("a)").is_some());
        assert!(broken_expression("[1, 2}").is_some());
        assert!(broken_expression("\"open").is_some());
        assert!(broken_expression("x = undefined").is_some());
        assert_eq!(broken_expression("$sum(items[price > 2].qty)"), None);
        assert_eq!(broken_expression("\"a)\" & name"), None);
        // `undefinedValue` is an ordinary identifier.
        assert_eq!(broken_expression("undefinedValue"), None);
    }

    #[test]
    fn iso_parsing_accepts_common_shapes() {
        assert!(parse_iso_datetime("2023-10-15T00:00:00Z").is_some());
        assert!(parse_iso_datetime("2023-10-15T00:00:00.000+00:00").is_some());
        assert!(parse_iso_datetime("2023-10-15T10:30+0200").is_some());
        assert!(parse_iso_datetime("2023-10-15").is_none());
        assert!(parse_iso_datetime("2023-13-45T00:00:00Z").is_none());
    }

    #[test]
    fn different_instants_are_not_date_drift() {
        let cfg = ClassifierConfig::default();
        let e = json!("2023-10-15T00:00:00Z");
        let a = json!("2023-10-16T00:00:00+00:00");
        assert_eq!(date_format(&subject("x", &e, &a, &cfg)), None);
    }

    #[test]
    fn shifted_offset_is_not_date_drift() {
        let cfg = ClassifierConfig::default();
        let e = json!("2023-10-15T00:00:00Z");
        let a = json!("2023-10-15T02:00:00+02:00");
        assert_eq!(date_format(&subject("x", &e, &a, &cfg)), None);
    }

    #[test]
    fn precision_change_is_not_date_drift() {
        let cfg = ClassifierConfig::default();
        let e = json!("2023-10-15T00:00:00Z");
        let a = json!("2023-10-15T00:00:00.000Z");
        assert_eq!(date_format(&subject("x", &e, &a, &cfg)), None);
        let a = json!("2023-10-15T00:00:00.000+00:00");
        assert_eq!(date_format(&subject("x", &e, &a, &cfg)), None);
    }

    #[test]
    fn compact_offset_counts_as_zone_notation() {
        let cfg = ClassifierConfig::default();
        let e = json!("2023-10-15T10:30:00Z");
        let a = json!("2023-10-15T10:30:00+0000");
        let v = date_format(&subject("x", &e, &a, &cfg)).unwrap();
        assert_eq!(v.tier, ConfidenceTier::High);
    }

    #[test]
    fn float_tiers_follow_thresholds() {
        let cfg = ClassifierConfig::default();
        let e = json!(1.0);
        let medium = json!(1.0005);
        let far = json!(1.5);
        assert_eq!(
            floating_point(&subject("x", &e, &medium, &cfg)).unwrap().tier,
            ConfidenceTier::Medium
        );
        assert_eq!(floating_point(&subject("x", &e, &far, &cfg)), None);
        assert_eq!(floating_point(&subject("x", &e, &e, &cfg)), None);
    }

    #[test]
    fn escaping_collapses_backslash_quotes() {
        let cfg = ClassifierConfig::default();
        let e = json!(r#"He said \"hi\""#);
        let a = json!(r#"He said "hi""#);
        assert_eq!(
            string_escaping(&subject("x", &e, &a, &cfg)).unwrap().tier,
            ConfidenceTier::High
        );
    }

    #[test]
    fn arrays_with_nested_formatting_drift_are_structural() {
        let cfg = ClassifierConfig::default();
        let e = json!([{"at": "2023-10-15T00:00:00Z"}, 0.30000000000000004]);
        let a = json!([{"at": "2023-10-15T00:00:00+00:00"}, 0.3]);
        let v = array_structural(&subject("x", &e, &a, &cfg)).unwrap();
        assert_eq!(v.tier, ConfidenceTier::High);

        let changed = json!([{"at": "2023-10-15T00:00:00Z"}, 7]);
        assert_eq!(array_structural(&subject("x", &e, &changed, &cfg)), None);
    }

    #[test]
    fn range_and_template_detection() {
        let cfg = ClassifierConfig::default();
        let v = json!(1);
        assert!(range_bracket(&subject("[1..5]", &v, &v, &cfg)).is_some());
        assert!(range_bracket(&subject("items[0]", &v, &v, &cfg)).is_none());
        assert!(template_literal(&subject("`Hi ${name}`", &v, &v, &cfg)).is_some());
        assert!(template_literal(&subject("'Hi ' & name", &v, &v, &cfg)).is_none());
    }

    #[test]
    fn quoted_field_names_are_not_templates() {
        let cfg = ClassifierConfig::default();
        let v = json!(1);
        assert!(template_literal(&subject("`Order Total`", &v, &v, &cfg)).is_none());
        assert!(template_literal(&subject("order.`line items`[0]", &v, &v, &cfg)).is_none());
    }

    #[test]
    fn null_versus_value_is_type_coercion() {
        let cfg = ClassifierConfig::default();
        let e = json!(null);
        let a = json!(0);
        assert_eq!(
            type_coercion(&subject("x", &e, &a, &cfg)).unwrap().tier,
            ConfidenceTier::Skip
        );
    }
}
