//! Canonical literal text for reconciled values.
//!
//! Every value is rendered on a single line so a later line-based patch can
//! still find and replace it.

use serde_json::Value;

/// Render `value` as compact, single-line literal text.
///
/// This is serde_json's compact form: numbers in their shortest
/// round-tripping decimal form, strings double-quoted with JSON escapes
/// (control characters included, so no raw newline survives), containers
/// without whitespace and object keys in insertion order.
pub fn format_literal(value: &Value) -> String {
    value.to_string()
}

/// Parse stored literal text back into a value.
pub fn parse_literal(text: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(text.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars() {
        assert_eq!(format_literal(&json!(null)), "null");
        assert_eq!(format_literal(&json!(true)), "true");
        assert_eq!(format_literal(&json!(false)), "false");
        assert_eq!(format_literal(&json!(42)), "42");
        assert_eq!(format_literal(&json!(-1.5)), "-1.5");
        assert_eq!(format_literal(&json!(0.3)), "0.3");
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(format_literal(&json!("plain")), r#""plain""#);
        assert_eq!(format_literal(&json!("say \"hi\"")), r#""say \"hi\"""#);
        assert_eq!(format_literal(&json!("a\nb\\c")), r#""a\nb\\c""#);
        assert_eq!(format_literal(&json!("\u{1}")), r#""\u0001""#);
        assert_eq!(format_literal(&json!("tab\there")), r#""tab\there""#);
    }

    #[test]
    fn containers_are_compact_and_single_line() {
        let value = json!({"name": "Jane", "tags": ["a", "b\nc"], "n": {"x": null}});
        let text = format_literal(&value);
        assert_eq!(text, r#"{"name":"Jane","tags":["a","b\nc"],"n":{"x":null}}"#);
        assert!(!text.contains('\n'));
    }

    #[test]
    fn matches_serde_json_compact_output() {
        let samples = [
            json!({"a": {"b": [1, "x\u{2028}y"]}, "c": null}),
            json!("\u{7}bell"),
            json!(1e21),
            json!(-0.0),
        ];
        for value in samples {
            assert_eq!(format_literal(&value), serde_json::to_string(&value).unwrap());
        }
    }

    #[test]
    fn key_order_is_preserved() {
        let value: Value = serde_json::from_str(r#"{"z":1,"a":2}"#).unwrap();
        assert_eq!(format_literal(&value), r#"{"z":1,"a":2}"#);
    }

    #[test]
    fn formatting_is_idempotent() {
        let value = json!([1.25, "x", {"k": [true, null]}]);
        let once = format_literal(&value);
        let twice = format_literal(&parse_literal(&once).unwrap());
        assert_eq!(once, twice);
    }

    #[test]
    fn parse_tolerates_surrounding_whitespace() {
        assert_eq!(parse_literal("  [1, 2]\n").unwrap(), json!([1, 2]));
        assert!(parse_literal("{bad}").is_err());
    }
}
