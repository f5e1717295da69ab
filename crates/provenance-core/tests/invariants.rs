// SPDX-License-Identifier: Apache-2.0

//! The eight numbered invariants, as deterministic property checks over
//! hand-built event sequences rather than full property-based testing —
//! this crate's existing test texture is manual-sequence, not
//! `proptest`/`quickcheck`-driven, so these follow suit.

use provenance_core::approval::{ApprovalStore, FixedCodeSource};
use provenance_core::graph::ProvenanceGraph;
use provenance_core::lattice::{self, min_trust};
use provenance_core::policy::{build_policy_config, evaluate_policy, get_tool_mode, validate_monotonicity};
use provenance_core::types::{PolicyMode, PolicyTrust, TrustLevel};
use provenance_core::watermark::{InMemoryWatermarkBackend, WatermarkStore};

/// 1. For any event sequence, `max_taint` is monotone non-decreasing between
///    any two graph states, except across a `reset_taint` call.
#[test]
fn invariant_1_max_taint_monotone_except_across_reset() {
    let mut graph = ProvenanceGraph::new("s1", 1);
    let sequence = ["exec", "read", "web_fetch", "vestige_search", "message"];
    let mut last = graph.max_taint();
    for (i, tool) in sequence.iter().enumerate() {
        graph.record_tool_call(tool, i as u64, None, &[], 0).unwrap();
        let now = graph.max_taint();
        assert!(now <= last, "max_taint must never rise between node inserts");
        last = now;
    }
    // Reset can move it back up (toward more trusted) — the one sanctioned exception.
    graph.reset_taint(TrustLevel::System).unwrap();
    assert_eq!(graph.max_taint(), TrustLevel::System);
}

/// 2. `strictest` (here: `min_trust` over `TrustLevel`, `max_mode`-equivalent
///    over `PolicyMode`) is idempotent, commutative, associative.
#[test]
fn invariant_2_min_trust_is_idempotent_commutative_associative() {
    let levels = [
        TrustLevel::System,
        TrustLevel::Owner,
        TrustLevel::Local,
        TrustLevel::Shared,
        TrustLevel::External,
        TrustLevel::Untrusted,
    ];
    for &a in &levels {
        assert_eq!(min_trust(a, a), a, "idempotent");
        for &b in &levels {
            assert_eq!(min_trust(a, b), min_trust(b, a), "commutative");
            for &c in &levels {
                assert_eq!(
                    min_trust(min_trust(a, b), c),
                    min_trust(a, min_trust(b, c)),
                    "associative"
                );
            }
        }
    }
}

/// 3. After `validate_monotonicity`, for every adjacent trust pair
///    `(stricter, laxer)`, `order(config[stricter]) <= order(config[laxer])`.
#[test]
fn invariant_3_validate_monotonicity_produces_non_decreasing_table() {
    let misconfigured = [PolicyMode::Restrict, PolicyMode::Allow, PolicyMode::Allow, PolicyMode::Confirm];
    let (corrected, warnings) = validate_monotonicity(misconfigured);
    assert!(!warnings.is_empty());
    for idx in 0..3 {
        assert!(
            corrected[idx] >= corrected[idx + 1],
            "bucket {idx} ({:?}) must be at least as strict as bucket {} ({:?})",
            corrected[idx],
            idx + 1,
            corrected[idx + 1],
        );
    }
}

/// 4. `get_tool_mode` is case-insensitive in the tool name.
#[test]
fn invariant_4_get_tool_mode_is_case_insensitive() {
    let (config, _) = build_policy_config(&[], &[]);
    for taint in [PolicyTrust::Untrusted, PolicyTrust::External, PolicyTrust::Shared, PolicyTrust::Trusted] {
        let lower = get_tool_mode("exec", taint, &config);
        let upper = get_tool_mode("EXEC", taint, &config);
        let mixed = get_tool_mode("ExEc", taint, &config);
        assert_eq!(lower.mode, upper.mode);
        assert_eq!(lower.mode, mixed.mode);
    }
}

/// 5. Safe tools remain `allow` under every valid (auto-corrected) config,
///    unless the user explicitly overrides them.
#[test]
fn invariant_5_safe_tools_stay_allow_under_valid_configs() {
    let restrictive_taint = [
        (
            provenance_core::policy::TaintPolicyKey::Policy(PolicyTrust::Untrusted),
            PolicyMode::Restrict,
        ),
        (
            provenance_core::policy::TaintPolicyKey::Policy(PolicyTrust::External),
            PolicyMode::Restrict,
        ),
    ];
    let (config, _warnings) = build_policy_config(&restrictive_taint, &[]);
    for tool in lattice::SAFE_TOOLS {
        for taint in [PolicyTrust::Untrusted, PolicyTrust::External, PolicyTrust::Shared, PolicyTrust::Trusted] {
            let evaluated = get_tool_mode(tool, taint, &config);
            assert_eq!(evaluated.mode, PolicyMode::Allow, "{tool} at {taint:?} should stay allow");
        }
    }
}

/// 6. Approvals cannot elevate a `restrict` verdict to `allow`; they can
///    only convert `confirm` → `allow`.
#[test]
fn invariant_6_approvals_cannot_bypass_restrict() {
    let restrict_untrusted = [(
        provenance_core::policy::TaintPolicyKey::Policy(PolicyTrust::Untrusted),
        PolicyMode::Restrict,
    )];
    let (config, _) = build_policy_config(&restrict_untrusted, &[]);

    let mut graph = ProvenanceGraph::new("s1", 1);
    graph.record_tool_call("web_fetch", 1, None, &[], 0).unwrap();

    let mut store = ApprovalStore::new(FixedCodeSource::new("ab12cd34"));
    let tools = vec!["exec".to_string()];
    let code = store.add_pending_batch("s1", 1, &tools, 60, 0);
    store.approve_with_code("s1", "all", &code, None, 0, None).unwrap();
    assert!(store.is_approved("s1", "exec"));

    let (_policy, folded) =
        provenance_core::policy::evaluate_with_approvals(&graph, &tools, &config, 10, &store, "s1", 0);
    assert!(folded.tool_removals.contains(&"exec".to_string()), "restrict cannot be approved away");
}

#[test]
fn invariant_6_approvals_do_convert_confirm_to_allow() {
    let (config, _) = build_policy_config(&[], &[]);
    let mut graph = ProvenanceGraph::new("s1", 1);
    graph.record_tool_call("web_fetch", 1, None, &[], 0).unwrap();

    let mut store = ApprovalStore::new(FixedCodeSource::new("ab12cd34"));
    let tools = vec!["exec".to_string()];
    let code = store.add_pending_batch("s1", 1, &tools, 60, 0);
    store.approve_with_code("s1", "exec", &code, None, 0, None).unwrap();

    let (_policy, folded) =
        provenance_core::policy::evaluate_with_approvals(&graph, &tools, &config, 10, &store, "s1", 0);
    assert!(!folded.tool_removals.contains(&"exec".to_string()), "confirm should be promoted to allow");
}

/// 7. A blocked code cannot be replayed: after `approve_with_code`
///    succeeds, the same code fails next time.
#[test]
fn invariant_7_code_cannot_be_replayed() {
    let mut store = ApprovalStore::new(FixedCodeSource::new("deadbeef"));
    let tools = vec!["exec".to_string()];
    let code = store.add_pending_batch("s1", 1, &tools, 60, 0);
    store.approve_with_code("s1", "exec", &code, None, 0, None).unwrap();
    let second_attempt = store.approve_with_code("s1", "exec", &code, None, 0, None);
    assert!(second_attempt.is_err(), "replaying a consumed code must fail");
}

/// 8. Watermark is monotone across turns until `clear` is called.
#[test]
fn invariant_8_watermark_monotone_until_clear() {
    let mut store = WatermarkStore::new(InMemoryWatermarkBackend::new());
    assert!(store.escalate("s1", TrustLevel::Shared, "turn1", 0));
    assert!(store.escalate("s1", TrustLevel::Untrusted, "turn2", 1));
    // An attempted "improvement" from a later turn must not move the floor back up.
    assert!(!store.escalate("s1", TrustLevel::Shared, "turn3", 2));
    assert_eq!(store.get("s1").unwrap().floor, TrustLevel::Untrusted);
    store.clear("s1");
    assert!(store.get("s1").is_none());
}

/// Round-trip / idempotence: `graph.to_json()` -> reconstruct -> summaries equal.
#[test]
fn round_trip_to_json_preserves_summary() {
    let mut graph = ProvenanceGraph::new("s1", 3);
    graph.record_context_assembled(42, 2, TrustLevel::Owner, 0).unwrap();
    graph.record_tool_call("exec", 1, None, &[], 0).unwrap();
    graph.record_tool_call("web_fetch", 2, None, &[], 0).unwrap();
    graph.seal();

    let json = graph.to_json().unwrap();
    let snapshot = serde_json::from_str(&json).unwrap();
    let reconstructed = ProvenanceGraph::from_snapshot(snapshot);
    assert_eq!(reconstructed.summary().max_taint, graph.summary().max_taint);
    assert_eq!(reconstructed.summary().node_count, graph.summary().node_count);
    assert_eq!(reconstructed.summary().edge_count, graph.summary().edge_count);
}

/// Round-trip / idempotence: repeated `escalate` with the same or lesser
/// level is a no-op.
#[test]
fn round_trip_repeated_escalate_is_noop() {
    let mut store = WatermarkStore::new(InMemoryWatermarkBackend::new());
    assert!(store.escalate("s1", TrustLevel::External, "first", 0));
    assert!(!store.escalate("s1", TrustLevel::External, "repeat", 1));
    assert!(!store.escalate("s1", TrustLevel::Shared, "better", 2));
}

/// Round-trip / idempotence: repeated `seal()` returns the same summary.
#[test]
fn round_trip_repeated_seal_is_idempotent() {
    let mut graph = ProvenanceGraph::new("s1", 1);
    graph.record_tool_call("exec", 1, None, &[], 0).unwrap();
    let first = graph.seal();
    let second = graph.seal();
    assert_eq!(first.max_taint, second.max_taint);
    assert_eq!(first.node_count, second.node_count);
    assert_eq!(first.sealed, second.sealed);
}

/// S8 — monotonicity auto-correction scenario, pinned as a standalone test.
#[test]
fn scenario_s8_monotonicity_auto_correction() {
    let user_taint = [
        (
            provenance_core::policy::TaintPolicyKey::Policy(PolicyTrust::Shared),
            PolicyMode::Allow,
        ),
        (
            provenance_core::policy::TaintPolicyKey::Legacy(TrustLevel::Local),
            PolicyMode::Confirm,
        ),
    ];
    let (config, warnings) = build_policy_config(&user_taint, &[]);
    assert!(!warnings.is_empty(), "a load warning must be emitted");
    assert_eq!(config.default_for(PolicyTrust::Shared), PolicyMode::Confirm, "corrected config");
}

// Keep `evaluate_policy` exercised so the max-iterations soft-warning path
// doesn't silently bitrot.
#[test]
fn max_iterations_is_a_soft_warning_not_a_hard_block() {
    let (config, _) = build_policy_config(&[], &[]);
    let mut graph = ProvenanceGraph::new("s1", 1);
    for i in 0..12u64 {
        graph.record_llm_call(i, 0, 0).unwrap();
    }
    let tools = vec!["read".to_string()];
    let evaluation = evaluate_policy(&graph, &tools, &config, 10);
    assert!(evaluation.max_iterations_exceeded);
    assert!(evaluation.allowed.contains(&"read".to_string()), "soft warning must not remove allowed tools");
}
