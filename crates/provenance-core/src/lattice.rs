// SPDX-License-Identifier: Apache-2.0

//! Trust lattice operations and the tool-output / initial-sender classifier.
//!
//! Trust levels are compared via their `#[repr(u8)]` discriminant ordering —
//! never by name or string comparison, per the design notes this crate is
//! built against.

use alloc::string::String;
use alloc::vec::Vec;

use crate::types::{AgentContext, TrustLevel};

/// Returns the laxer (less trusted, higher discriminant) of two trust levels.
///
/// This is the operator the provenance graph's high-water-mark accumulator
/// uses: mixing content of two trust levels can never make the result *more*
/// trusted than the less-trusted input.
///
/// # Examples
///
/// ```rust
/// use provenance_core::lattice::min_trust;
/// use provenance_core::types::TrustLevel;
///
/// assert_eq!(min_trust(TrustLevel::Owner, TrustLevel::External), TrustLevel::External);
/// assert_eq!(min_trust(TrustLevel::Untrusted, TrustLevel::System), TrustLevel::Untrusted);
/// ```
pub fn min_trust(a: TrustLevel, b: TrustLevel) -> TrustLevel {
    if (a as u8) <= (b as u8) {
        a
    } else {
        b
    }
}

/// Tool name → output trust level. Matched case-insensitively.
const TOOL_TRUST_TABLE: &[(&str, TrustLevel)] = &[
    ("exec", TrustLevel::Local),
    ("vestige_search", TrustLevel::Shared),
    ("vestige_promote", TrustLevel::Shared),
    ("vestige_demote", TrustLevel::Shared),
    ("message", TrustLevel::External),
    ("web_fetch", TrustLevel::Untrusted),
    ("web_search", TrustLevel::Untrusted),
    ("browser", TrustLevel::Untrusted),
    ("session_status", TrustLevel::System),
    ("memory_search", TrustLevel::System),
    ("memory_get", TrustLevel::System),
];

/// Tools always allowed regardless of taint (read-only, or the taint source
/// itself). `browser` is deliberately excluded — it performs actions, so it
/// must flow through the normal policy gate even though its output trust is
/// `untrusted`.
pub const SAFE_TOOLS: &[&str] = &[
    "read",
    "memory_search",
    "memory_get",
    "web_fetch",
    "web_search",
    "image",
    "session_status",
    "sessions_list",
    "sessions_history",
    "agents_list",
    "vestige_search",
    "vestige_promote",
    "vestige_demote",
];

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Whether `name` is in the built-in safe-tool set (case-insensitive).
pub fn is_safe_tool(name: &str) -> bool {
    SAFE_TOOLS.iter().any(|safe| eq_ignore_case(safe, name))
}

/// Output trust level for a tool by name, case-insensitive.
///
/// `overrides`, if given, is consulted first (also case-insensitive) — this
/// is how a host can reclassify a specific tool's output trust without
/// touching the built-in table. Unknown tools default to `untrusted`,
/// matching the configurable-but-secure-by-default stance in the table's
/// documentation.
///
/// # Examples
///
/// ```rust
/// use provenance_core::lattice::tool_trust;
/// use provenance_core::types::TrustLevel;
///
/// assert_eq!(tool_trust("EXEC", &[]), TrustLevel::Local);
/// assert_eq!(tool_trust("totally-unknown-tool", &[]), TrustLevel::Untrusted);
/// ```
pub fn tool_trust(name: &str, overrides: &[(String, TrustLevel)]) -> TrustLevel {
    for (tool_name, level) in overrides {
        if eq_ignore_case(tool_name, name) {
            return *level;
        }
    }
    for (tool_name, level) in TOOL_TRUST_TABLE {
        if eq_ignore_case(tool_name, name) {
            return *level;
        }
    }
    TrustLevel::Untrusted
}

/// All known tool names in the built-in table, for diagnostics/tests.
pub fn known_tool_names() -> Vec<&'static str> {
    TOOL_TRUST_TABLE.iter().map(|(name, _)| *name).collect()
}

/// Classify the initial trust of a turn's context from sender/provider facts.
///
/// The five rules below are evaluated in order; the first match wins.
///
/// 1. No message provider, or provider is `heartbeat`/`cron` → `system`.
/// 2. Spawned sub-agent (`spawned_by` set) → `local` (inherits parent's
///    already-vetted authority).
/// 3. `sender_is_owner = true`, no group → `owner`.
/// 4. `sender_is_owner = true`, group set → `shared` (the group may contain
///    non-owner messages).
/// 5. Non-owner with a known sender id → `external`.
/// 6. Otherwise → `untrusted`.
///
/// # Examples
///
/// ```rust
/// use provenance_core::lattice::classify_initial_trust;
/// use provenance_core::types::AgentContext;
/// use provenance_core::types::TrustLevel;
///
/// let ctx = AgentContext {
///     message_provider: Some("chat".into()),
///     sender_is_owner: Some(true),
///     ..Default::default()
/// };
/// assert_eq!(classify_initial_trust(&ctx), TrustLevel::Owner);
/// ```
pub fn classify_initial_trust(ctx: &AgentContext) -> TrustLevel {
    if ctx.message_provider.is_none()
        || matches!(ctx.message_provider.as_deref(), Some("heartbeat") | Some("cron"))
    {
        return TrustLevel::System;
    }
    if ctx.spawned_by.is_some() {
        return TrustLevel::Local;
    }
    if ctx.sender_is_owner == Some(true) {
        return if ctx.group_id.is_some() {
            TrustLevel::Shared
        } else {
            TrustLevel::Owner
        };
    }
    if ctx.sender_id.is_some() {
        return TrustLevel::External;
    }
    TrustLevel::Untrusted
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn min_trust_picks_laxer() {
        assert_eq!(min_trust(TrustLevel::System, TrustLevel::Untrusted), TrustLevel::Untrusted);
        assert_eq!(min_trust(TrustLevel::Owner, TrustLevel::Owner), TrustLevel::Owner);
    }

    #[test]
    fn min_trust_is_idempotent_commutative_associative() {
        let levels = [
            TrustLevel::System,
            TrustLevel::Owner,
            TrustLevel::Local,
            TrustLevel::Shared,
            TrustLevel::External,
            TrustLevel::Untrusted,
        ];
        for &a in &levels {
            assert_eq!(min_trust(a, a), a);
            for &b in &levels {
                assert_eq!(min_trust(a, b), min_trust(b, a));
                for &c in &levels {
                    assert_eq!(min_trust(min_trust(a, b), c), min_trust(a, min_trust(b, c)));
                }
            }
        }
    }

    #[test]
    fn tool_trust_is_case_insensitive() {
        assert_eq!(tool_trust("Exec", &[]), TrustLevel::Local);
        assert_eq!(tool_trust("WEB_FETCH", &[]), TrustLevel::Untrusted);
    }

    #[test]
    fn browser_is_not_safe() {
        assert!(!is_safe_tool("browser"));
        assert!(is_safe_tool("web_fetch"));
    }

    #[test]
    fn override_beats_builtin_table() {
        let overrides = [("exec".to_string(), TrustLevel::System)];
        assert_eq!(tool_trust("exec", &overrides), TrustLevel::System);
    }

    #[test]
    fn unknown_tool_defaults_untrusted() {
        assert_eq!(tool_trust("never-heard-of-it", &[]), TrustLevel::Untrusted);
    }

    #[test]
    fn classify_heartbeat_is_system() {
        let ctx = AgentContext { message_provider: Some("heartbeat".into()), ..Default::default() };
        assert_eq!(classify_initial_trust(&ctx), TrustLevel::System);
    }

    #[test]
    fn classify_no_provider_is_system() {
        let ctx = AgentContext::default();
        assert_eq!(classify_initial_trust(&ctx), TrustLevel::System);
    }

    #[test]
    fn classify_spawned_subagent_is_local() {
        let ctx = AgentContext {
            message_provider: Some("chat".into()),
            spawned_by: Some("parent-session".into()),
            ..Default::default()
        };
        assert_eq!(classify_initial_trust(&ctx), TrustLevel::Local);
    }

    #[test]
    fn classify_owner_dm_is_owner() {
        let ctx = AgentContext {
            message_provider: Some("chat".into()),
            sender_is_owner: Some(true),
            ..Default::default()
        };
        assert_eq!(classify_initial_trust(&ctx), TrustLevel::Owner);
    }

    #[test]
    fn classify_owner_in_group_is_shared() {
        let ctx = AgentContext {
            message_provider: Some("chat".into()),
            sender_is_owner: Some(true),
            group_id: Some("group-1".into()),
            ..Default::default()
        };
        assert_eq!(classify_initial_trust(&ctx), TrustLevel::Shared);
    }

    #[test]
    fn classify_known_non_owner_is_external() {
        let ctx = AgentContext {
            message_provider: Some("chat".into()),
            sender_id: Some("someone".into()),
            ..Default::default()
        };
        assert_eq!(classify_initial_trust(&ctx), TrustLevel::External);
    }

    #[test]
    fn classify_unknown_sender_is_untrusted() {
        let ctx = AgentContext { message_provider: Some("chat".into()), ..Default::default() };
        assert_eq!(classify_initial_trust(&ctx), TrustLevel::Untrusted);
    }
}
