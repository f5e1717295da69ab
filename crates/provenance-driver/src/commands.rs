// SPDX-License-Identifier: Apache-2.0

//! Owner-command grammar parsed from the last user message: `.approve` and
//! `.reset-trust`.
//!
//! Grammar is strict and regex-anchored, matched only against the single
//! last user message (never prior turns, to avoid replaying an old
//! approval). See the design note on keeping this narrow.

use std::sync::OnceLock;

use provenance_core::types::TrustLevel;
use regex::Regex;

fn approve_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\.approve\s+(\S+)\s+([0-9a-f]{8})(?:\s+(\d+))?").expect("valid regex")
    })
}

fn reset_trust_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\.reset-trust(?:\s+(\S+))?").expect("valid regex"))
}

/// A parsed owner command, extracted from the last user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerCommand {
    /// `.approve <tool|all> <8hex> [minutes]`
    Approve { target: String, code: String, duration_minutes: Option<u64> },
    /// `.reset-trust [level]`, level defaults to `system` when omitted.
    ResetTrust { level: TrustLevel },
    /// `.reset-trust <word>` where `<word>` isn't one of the six trust
    /// level names: logged, but never performs a reset.
    InvalidResetTrust,
}

/// Scan `message` for the first recognised owner command. Returns `None` if
/// neither grammar matches.
pub fn parse_owner_command(message: &str) -> Option<OwnerCommand> {
    if let Some(captures) = approve_pattern().captures(message) {
        let target = captures.get(1)?.as_str().to_string();
        let code = captures.get(2)?.as_str().to_ascii_lowercase();
        let duration_minutes = captures.get(3).and_then(|m| m.as_str().parse::<u64>().ok());
        return Some(OwnerCommand::Approve { target, code, duration_minutes });
    }
    if let Some(captures) = reset_trust_pattern().captures(message) {
        return Some(match captures.get(1) {
            None => OwnerCommand::ResetTrust { level: TrustLevel::System },
            Some(word) => match parse_trust_level_word(word.as_str()) {
                Some(level) => OwnerCommand::ResetTrust { level },
                None => OwnerCommand::InvalidResetTrust,
            },
        });
    }
    None
}

/// Map a `.reset-trust` trailing word onto a [`TrustLevel`], if it's one of
/// the six valid names.
fn parse_trust_level_word(word: &str) -> Option<TrustLevel> {
    match word.to_ascii_lowercase().as_str() {
        "system" => Some(TrustLevel::System),
        "owner" => Some(TrustLevel::Owner),
        "local" => Some(TrustLevel::Local),
        "shared" => Some(TrustLevel::Shared),
        "external" => Some(TrustLevel::External),
        "untrusted" => Some(TrustLevel::Untrusted),
        _ => None,
    }
}
