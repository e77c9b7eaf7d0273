#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::Path;

use passage_relevance::config::RunConfig;
use passage_relevance::dataset::QueryRecord;
use passage_relevance::ml::gbdt::TrainerConfig;

const TOPICS: &[&str] = &[
    "volcano", "glacier", "harbor", "orchard", "bridge", "desert", "canyon", "forest",
];

/// Synthetic labelled table: relevant passages talk about the query topic in
/// explanatory prose, irrelevant ones are filler about something else.
pub fn synthetic_records(n: usize) -> Vec<QueryRecord> {
    (0..n)
        .map(|i| {
            let topic = TOPICS[i % TOPICS.len()];
            let relevant = i % 3 == 0;
            let passage = if relevant {
                format!("The {topic} guide explains how the {topic} formed and why visitors study it.")
            } else {
                format!("Parking rules changed on street {} after the council meeting.", i % 11)
            };
            QueryRecord::new(
                (i / 4) as i64,
                format!("what is a {topic}"),
                passage,
                relevant,
                10_000 + i as i64,
            )
        })
        .collect()
}

/// Write records as TSV in the five-column training layout.
pub fn write_tsv(path: &Path, records: &[QueryRecord], header: bool) {
    let mut out = String::new();
    if header {
        out.push_str("QueryId\tQuery\tPassageText\tLabel\tPassageId\n");
    }
    for r in records {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}",
            r.query_id,
            r.query,
            r.passage_text,
            u8::from(r.label),
            r.passage_id
        )
        .unwrap();
    }
    std::fs::write(path, out).unwrap();
}

/// Write records as TSV in the four-column scoring layout.
pub fn write_unlabelled_tsv(path: &Path, records: &[QueryRecord], header: bool) {
    let mut out = String::new();
    if header {
        out.push_str("QueryId\tQuery\tPassageText\tPassageId\n");
    }
    for r in records {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            r.query_id, r.query, r.passage_text, r.passage_id
        )
        .unwrap();
    }
    std::fs::write(path, out).unwrap();
}

/// Default run configuration with a trainer small enough for tests.
pub fn quick_config() -> RunConfig {
    RunConfig {
        trainer: TrainerConfig {
            num_trees: 15,
            num_leaves: 8,
            min_datapoints_per_leaf: 5,
            log_every: 0,
            ..TrainerConfig::default()
        },
        ..RunConfig::default()
    }
}
