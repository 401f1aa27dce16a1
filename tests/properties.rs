//! Property tests for the formatter, the classifier and the patcher.

use std::path::Path;

use proptest::prelude::*;
use serde_json::{Map, Number, Value};

use driftmend::classify::classify;
use driftmend::config::ClassifierConfig;
use driftmend::corpus::extract_records;
use driftmend::model::RecordKey;
use driftmend::oracle::normalize_result;
use driftmend::patch::{PatchOutcome, RecordPatcher, format_literal, parse_literal};

fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        any::<f64>()
            .prop_filter_map("finite", Number::from_f64)
            .prop_map(Value::Number),
        "\\PC{0,12}".prop_map(Value::String),
        "[\"'\\\\\n\t${}]{0,6}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<String, Value>>())),
        ]
    })
}

fn corpus_with(ids: &[&str]) -> String {
    let mut text = String::from("export const examples: Example[] = [\n");
    for id in ids {
        text.push_str(&format!(
            "  {{\n    id: '{id}',\n    expression: 'x',\n    expectedOutput: '\"old\"',\n  }},\n"
        ));
    }
    text.push_str("];\n");
    text
}

proptest! {
    #[test]
    fn formatted_literals_round_trip(value in arb_value()) {
        let text = format_literal(&value);
        prop_assert_eq!(parse_literal(&text).unwrap(), value);
    }

    #[test]
    fn formatting_is_idempotent(value in arb_value()) {
        let once = format_literal(&value);
        let twice = format_literal(&parse_literal(&once).unwrap());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn formatted_literals_are_single_line(value in arb_value()) {
        prop_assert!(!format_literal(&value).contains('\n'));
    }

    #[test]
    fn classification_is_deterministic(
        expression in "\\PC{0,20}",
        expected in arb_value(),
        actual in arb_value(),
    ) {
        let config = ClassifierConfig::default();
        let first = classify(&expression, &expected, &actual, &config);
        let second = classify(&expression, &expected, &actual, &config);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn normalization_is_idempotent(value in arb_value()) {
        let wrapped = Value::String(serde_json::json!({ "result": value }).to_string());
        let once = normalize_result(wrapped);
        prop_assert_eq!(normalize_result(once.clone()), once);
    }

    #[test]
    fn patch_changes_one_line_and_round_trips(
        value in arb_value(),
        target in 0usize..3,
    ) {
        let ids = ["first", "second", "third"];
        let before = corpus_with(&ids);
        let literal = format_literal(&value);
        let key = RecordKey::new(Path::new("examples.ts"), ids[target]);

        let (outcome, after) = RecordPatcher::default().patch_text(&before, &key, &literal);
        let after = match outcome {
            PatchOutcome::Applied(_) => after.unwrap(),
            PatchOutcome::Unchanged => before.clone(),
            PatchOutcome::NotFound(reason) => panic!("patch not placed: {reason}"),
        };

        let changed: Vec<usize> = before
            .lines()
            .zip(after.lines())
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(i, _)| i)
            .collect();
        prop_assert_eq!(before.lines().count(), after.lines().count());
        prop_assert!(changed.len() <= 1);
        if let Some(&line) = changed.first() {
            prop_assert_eq!(line, 1 + target * 5 + 3);
        }

        let records = extract_records(&after, Path::new("examples.ts")).unwrap().records;
        for (i, record) in records.iter().enumerate() {
            let stored = if i == target { literal.as_str() } else { "\"old\"" };
            prop_assert_eq!(record.expected_output.as_str(), stored);
        }
        prop_assert_eq!(parse_literal(&records[target].expected_output).unwrap(), value);
    }
}
