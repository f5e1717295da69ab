// SPDX-License-Identifier: Apache-2.0

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use provenance_core::approval::{ApprovalStore, FixedCodeSource};
use provenance_core::graph::ProvenanceGraph;
use provenance_core::policy::{build_policy_config, evaluate_with_approvals};

fn bench_record_tool_call(c: &mut Criterion) {
    c.bench_function("record_tool_call", |b| {
        b.iter(|| {
            let mut graph = ProvenanceGraph::new("bench-session", 1);
            for i in 0..20u64 {
                graph
                    .record_tool_call(black_box("exec"), i, None, &[], 0)
                    .unwrap();
            }
            black_box(graph.max_taint())
        });
    });
}

fn bench_evaluate_with_approvals(c: &mut Criterion) {
    let (config, _warnings) = build_policy_config(&[], &[]);
    let store = ApprovalStore::new(FixedCodeSource::new("ab12cd34"));
    let mut graph = ProvenanceGraph::new("bench-session", 1);
    graph.record_tool_call("web_fetch", 1, None, &[], 0).unwrap();
    let tools: Vec<String> =
        vec!["exec".into(), "read".into(), "web_fetch".into(), "message".into()];

    c.bench_function("evaluate_with_approvals", |b| {
        b.iter(|| {
            let (_policy, folded) =
                evaluate_with_approvals(black_box(&graph), &tools, &config, 10, &store, "bench-session", 0);
            black_box(folded.mode)
        });
    });
}

criterion_group!(benches, bench_record_tool_call, bench_evaluate_with_approvals);
criterion_main!(benches);
