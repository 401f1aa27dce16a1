//! Benchmarks for the classify, format and patch hot paths.

use std::path::Path;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use serde_json::json;

use driftmend::classify::classify;
use driftmend::config::ClassifierConfig;
use driftmend::corpus::extract_records;
use driftmend::model::RecordKey;
use driftmend::patch::{RecordPatcher, format_literal};

fn corpus_text(records: usize) -> String {
    let mut text = String::from("export const examples: Example[] = [\n");
    for i in 0..records {
        text.push_str(&format!(
            "  {{\n    id: 'record-{i}',\n    expression: '$sum([1, 2, {i}])',\n    expectedOutput: '{}',\n  }},\n",
            3 + i
        ));
    }
    text.push_str("];\n");
    text
}

fn bench_classify(c: &mut Criterion) {
    let config = ClassifierConfig::default();
    let expected = json!({ "at": "2024-01-01T00:00:00Z", "values": [0.1, 0.2, 0.3] });
    let actual = json!({ "at": "2024-01-01T00:00:00.000Z", "values": [0.1, 0.2, 0.30000000000000004] });

    c.bench_function("classify_object", |bench| {
        bench.iter(|| black_box(classify("$now()", &expected, &actual, &config)))
    });
}

fn bench_format_literal(c: &mut Criterion) {
    let value = json!({
        "name": "it's \"quoted\"",
        "items": [1, 2.5, null, true, { "nested": ["a", "b"] }],
    });

    c.bench_function("format_literal", |bench| {
        bench.iter(|| black_box(format_literal(&value)))
    });
}

fn bench_patch_text(c: &mut Criterion) {
    let text = corpus_text(500);
    let patcher = RecordPatcher::default();
    let key = RecordKey::new(Path::new("examples.ts"), "record-250");

    c.bench_function("patch_text_500", |bench| {
        bench.iter(|| black_box(patcher.patch_text(&text, &key, "42")))
    });
}

fn bench_extract_records(c: &mut Criterion) {
    let text = corpus_text(500);

    c.bench_function("extract_records_500", |bench| {
        bench.iter(|| black_box(extract_records(&text, Path::new("examples.ts")).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_classify,
    bench_format_literal,
    bench_patch_text,
    bench_extract_records
);
criterion_main!(benches);
