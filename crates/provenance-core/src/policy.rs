// SPDX-License-Identifier: Apache-2.0

//! Policy engine: taint-level × tool-override resolution with validated
//! monotonicity.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::approval::ApprovalStore;
use crate::graph::ProvenanceGraph;
use crate::types::{EvaluatedPolicy, PolicyConfig, PolicyMode, PolicyTrust, ToolOverride, TrustLevel};

/// Built-in defaults: `trusted → allow`, `shared|external|untrusted → confirm`.
fn builtin_taint_defaults() -> [PolicyMode; 4] {
    [
        PolicyMode::Confirm, // Untrusted
        PolicyMode::Confirm, // External
        PolicyMode::Confirm, // Shared
        PolicyMode::Allow,   // Trusted
    ]
}

/// Safe tools default to `{"*": allow}`; `gateway` defaults to confirm at
/// every non-system level.
fn builtin_tool_overrides() -> Vec<ToolOverride> {
    let mut overrides: Vec<ToolOverride> = crate::lattice::SAFE_TOOLS
        .iter()
        .map(|name| ToolOverride::wildcard(*name, PolicyMode::Allow))
        .collect();
    overrides.push(ToolOverride::wildcard("gateway", PolicyMode::Confirm));
    overrides
}

/// A single user-supplied taint-level override, keyed by a legacy 6-level or
/// native 4-level trust label — see [`build_policy_config`].
#[derive(Debug, Clone)]
pub enum TaintPolicyKey {
    Policy(PolicyTrust),
    Legacy(TrustLevel),
}

impl TaintPolicyKey {
    fn resolve(&self) -> PolicyTrust {
        match self {
            TaintPolicyKey::Policy(p) => *p,
            TaintPolicyKey::Legacy(t) => PolicyTrust::from_trust_level(*t),
        }
    }
}

/// Build a canonical [`PolicyConfig`] from built-in defaults plus optional
/// user overrides, auto-correcting any monotonicity violation.
///
/// Returns the config alongside a list of human-readable warnings emitted by
/// `validate_monotonicity` — callers (typically the driver at config-load
/// time) are expected to log each one via `tracing::warn!`.
pub fn build_policy_config(
    user_taint_policy: &[(TaintPolicyKey, PolicyMode)],
    user_tool_overrides: &[ToolOverride],
) -> (PolicyConfig, Vec<String>) {
    let mut taint_defaults = builtin_taint_defaults();
    for (key, mode) in user_taint_policy {
        taint_defaults[key.resolve() as usize] = *mode;
    }

    let (validated, warnings) = validate_monotonicity(taint_defaults);

    let mut tool_overrides = builtin_tool_overrides();
    for user_override in user_tool_overrides {
        if let Some(existing) = tool_overrides
            .iter_mut()
            .find(|o| o.tool_name.eq_ignore_ascii_case(&user_override.tool_name))
        {
            for (key, mode) in &user_override.levels {
                if let Some(slot) = existing.levels.iter_mut().find(|(k, _)| k == key) {
                    slot.1 = *mode;
                } else {
                    existing.levels.push((*key, *mode));
                }
            }
        } else {
            tool_overrides.push(user_override.clone());
        }
    }

    (PolicyConfig { taint_defaults: validated, tool_overrides }, warnings)
}

/// For each adjacent pair from strictest (`Trusted`) to laxest
/// (`Untrusted`), if the laxer entry is strictly more permissive than the
/// stricter one, lift it to match and emit a warning. Returns the corrected
/// table.
pub fn validate_monotonicity(defaults: [PolicyMode; 4]) -> ([PolicyMode; 4], Vec<String>) {
    // index 3 = Trusted (strictest-trust bucket) down to index 0 = Untrusted (laxest).
    let mut corrected = defaults;
    let mut warnings = Vec::new();
    for idx in (0..3).rev() {
        let stricter = corrected[idx + 1];
        let laxer = corrected[idx];
        if laxer < stricter {
            warnings.push(format!(
                "monotonicity_violation: taint_defaults[{}] ({}) was laxer than taint_defaults[{}] ({}); lifted to {}",
                idx,
                laxer.display_name(),
                idx + 1,
                stricter.display_name(),
                stricter.display_name(),
            ));
            corrected[idx] = stricter;
        }
    }
    (corrected, warnings)
}

/// Resolve the effective mode for `tool` at `current_taint`: the taint-level
/// default, replaced (not merged) by a matching tool override if one exists.
pub fn get_tool_mode(tool: &str, current_taint: PolicyTrust, config: &PolicyConfig) -> EvaluatedPolicy {
    let default_mode = config.default_for(current_taint);
    let mut mode = default_mode;
    let mut overridden = false;
    if let Some(tool_override) = config
        .tool_overrides
        .iter()
        .find(|o| o.tool_name.eq_ignore_ascii_case(tool))
    {
        if let Some(override_mode) = tool_override.mode_for(current_taint) {
            mode = override_mode;
            overridden = true;
        }
    }
    EvaluatedPolicy {
        tool_name: tool.to_string(),
        taint: current_taint,
        mode,
        overridden,
        max_iterations_exceeded: false,
    }
}

/// Outcome of evaluating a whole tool list against the current graph state.
#[derive(Debug, Clone)]
pub struct PolicyEvaluation {
    pub allowed: Vec<String>,
    pub confirm: Vec<(String, String)>, // (tool, reason)
    pub restricted: Vec<String>,
    pub default_mode: PolicyMode,
    pub max_iterations_exceeded: bool,
}

/// Evaluate every tool in `tool_names` against `config` at the graph's
/// current `max_taint`, and flag (non-fatally) whether the turn's iteration
/// count has reached `max_iterations`.
pub fn evaluate_policy(
    graph: &ProvenanceGraph,
    tool_names: &[String],
    config: &PolicyConfig,
    max_iterations: u64,
) -> PolicyEvaluation {
    let current_taint = PolicyTrust::from_trust_level(graph.max_taint());
    let default_mode = config.default_for(current_taint);

    let mut allowed = Vec::new();
    let mut confirm = Vec::new();
    let mut restricted = Vec::new();

    for tool in tool_names {
        let evaluated = get_tool_mode(tool, current_taint, config);
        match evaluated.mode {
            PolicyMode::Allow => allowed.push(tool.clone()),
            PolicyMode::Confirm => confirm.push((
                tool.clone(),
                format!("taint={} requires confirmation for {}", current_taint.display_name(), tool),
            )),
            PolicyMode::Restrict => restricted.push(tool.clone()),
        }
    }

    let max_iterations_exceeded = graph.summary().iteration_count >= max_iterations;

    PolicyEvaluation { allowed, confirm, restricted, default_mode, max_iterations_exceeded }
}

/// Effective decision after folding approvals into [`evaluate_policy`]'s
/// output: approvals can promote `confirm` to allowed, but — by design —
/// can never bypass `restrict`.
#[derive(Debug, Clone)]
pub struct ApprovalFoldedEvaluation {
    pub mode: PolicyMode,
    pub tool_removals: Vec<String>,
    pub pending_confirmations: Vec<(String, String)>,
    pub block: bool,
    pub block_reason: Option<String>,
}

pub fn evaluate_with_approvals<C: crate::approval::CodeSource>(
    graph: &ProvenanceGraph,
    tool_names: &[String],
    config: &PolicyConfig,
    max_iterations: u64,
    approval_store: &ApprovalStore<C>,
    session: &str,
    now_ms: u64,
) -> (PolicyEvaluation, ApprovalFoldedEvaluation) {
    let policy = evaluate_policy(graph, tool_names, config, max_iterations);

    let mut tool_removals = Vec::new();
    let mut pending_confirmations = Vec::new();
    let mut effective_mode = policy.default_mode;

    for (tool, reason) in &policy.confirm {
        if approval_store.is_approved_at(session, tool, now_ms) {
            // Approved: the tool is allowed, no further mode escalation.
        } else {
            tool_removals.push(tool.clone());
            pending_confirmations.push((tool.clone(), reason.clone()));
            effective_mode = max_mode(effective_mode, PolicyMode::Confirm);
        }
    }

    // Restricted tools are never reachable via approval.
    for tool in &policy.restricted {
        tool_removals.push(tool.clone());
        effective_mode = max_mode(effective_mode, PolicyMode::Restrict);
    }

    let folded = ApprovalFoldedEvaluation {
        mode: effective_mode,
        tool_removals,
        pending_confirmations,
        block: false,
        block_reason: None,
    };

    (policy, folded)
}

fn max_mode(a: PolicyMode, b: PolicyMode) -> PolicyMode {
    if a >= b {
        a
    } else {
        b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{ApprovalStore, FixedCodeSource};
    use crate::types::ToolOverrideKey;

    fn allow_all_config() -> PolicyConfig {
        let (config, _) = build_policy_config(&[], &[]);
        config
    }

    #[test]
    fn case_insensitive_tool_mode() {
        let config = allow_all_config();
        let a = get_tool_mode("EXEC", PolicyTrust::Untrusted, &config);
        let b = get_tool_mode("exec", PolicyTrust::Untrusted, &config);
        assert_eq!(a.mode, b.mode);
    }

    #[test]
    fn safe_tools_stay_allow_under_default_config() {
        let config = allow_all_config();
        for tool in crate::lattice::SAFE_TOOLS {
            let evaluated = get_tool_mode(tool, PolicyTrust::Untrusted, &config);
            assert_eq!(evaluated.mode, PolicyMode::Allow, "{tool} should stay allow");
        }
    }

    #[test]
    fn monotonicity_auto_correction_lifts_and_warns() {
        let defaults = [
            PolicyMode::Allow,   // Untrusted -- invalid, stricter trust (Shared) is Confirm below? we'll construct explicitly
            PolicyMode::Confirm, // External
            PolicyMode::Allow,   // Shared (laxer than Local/Trusted's Confirm below => violation)
            PolicyMode::Confirm, // Trusted
        ];
        let (corrected, warnings) = validate_monotonicity(defaults);
        assert!(!warnings.is_empty());
        // Trusted=Confirm, Shared must be >= Confirm.
        assert_eq!(corrected[2], PolicyMode::Confirm);
    }

    #[test]
    fn tool_override_replaces_rather_than_merges() {
        let user_overrides = [ToolOverride::wildcard("gateway", PolicyMode::Allow)];
        let (config, _) = build_policy_config(&[], &user_overrides);
        let evaluated = get_tool_mode("gateway", PolicyTrust::Untrusted, &config);
        assert_eq!(evaluated.mode, PolicyMode::Allow);
    }

    #[test]
    fn tool_override_can_differ_per_level() {
        let user_overrides = [ToolOverride {
            tool_name: "gateway".to_string(),
            levels: alloc::vec![
                (ToolOverrideKey::Level(PolicyTrust::Untrusted), PolicyMode::Restrict),
                (ToolOverrideKey::Wildcard, PolicyMode::Allow),
            ],
        }];
        let (config, _) = build_policy_config(&[], &user_overrides);
        let untrusted = get_tool_mode("gateway", PolicyTrust::Untrusted, &config);
        let shared = get_tool_mode("gateway", PolicyTrust::Shared, &config);
        assert_eq!(untrusted.mode, PolicyMode::Restrict);
        assert_eq!(shared.mode, PolicyMode::Allow);
    }

    #[test]
    fn approvals_cannot_elevate_restrict_to_allow() {
        let user_taint = [(TaintPolicyKey::Policy(PolicyTrust::Untrusted), PolicyMode::Restrict)];
        let (config, _) = build_policy_config(&user_taint, &[]);
        let mut store = ApprovalStore::new(FixedCodeSource::new("ab12cd34"));
        let mut graph = ProvenanceGraph::new("s1", 1);
        graph.record_tool_call("web_fetch", 1, None, &[], 0).unwrap();
        let tools = alloc::vec!["exec".to_string()];
        let code = store.add_pending_batch("s1", 1, &tools, 60, 0);
        store.approve_with_code("s1", "all", &code, None, 0, None).unwrap();
        let (_, folded) = evaluate_with_approvals(&graph, &tools, &config, 25, &store, "s1", 0);
        assert!(folded.tool_removals.contains(&"exec".to_string()));
        assert_eq!(folded.mode, PolicyMode::Restrict);
    }
}
