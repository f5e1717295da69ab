// SPDX-License-Identifier: Apache-2.0

//! Approval store: cryptographically-unpredictable short codes, tracked
//! per-tool vs. wildcard, turn-scoped vs. timed.
//!
//! Code generation is abstracted behind [`CodeSource`] so the TTL/replay
//! bookkeeping here is testable deterministically with a fixed source,
//! while the default [`OsCodeSource`] (std-only) draws from a CSPRNG.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;
use hashbrown::HashMap;

/// Minimum seconds of remaining TTL on an existing batch before a fresh
/// `add_pending_batch` call reuses its code instead of minting a new one.
const REUSE_THRESHOLD_SECONDS: u64 = 5;

/// Source of fresh, unpredictable 32-bit approval codes.
pub trait CodeSource {
    /// Produce four random bytes, rendered by [`ApprovalStore`] as 8 hex
    /// characters.
    fn next_code(&mut self) -> [u8; 4];
}

/// Default [`CodeSource`] drawing from the operating system's CSPRNG.
/// Only available with the `std` feature, like the other std-gated modules
/// in this crate (`config_loader.rs`).
#[cfg(feature = "std")]
#[derive(Debug, Default)]
pub struct OsCodeSource;

#[cfg(feature = "std")]
impl CodeSource for OsCodeSource {
    fn next_code(&mut self) -> [u8; 4] {
        use rand::RngCore;
        let mut bytes = [0u8; 4];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        bytes
    }
}

/// A fixed, deterministic [`CodeSource`] for tests — always returns the
/// same 8-hex-character code.
#[derive(Debug, Clone)]
pub struct FixedCodeSource {
    bytes: [u8; 4],
}

impl FixedCodeSource {
    /// Build from an 8-character hex string (e.g. `"ab12cd34"`).
    pub fn new(hex: &str) -> Self {
        let mut bytes = [0u8; 4];
        for i in 0..4 {
            let byte_str = &hex[i * 2..i * 2 + 2];
            bytes[i] = u8::from_str_radix(byte_str, 16).expect("valid hex byte");
        }
        FixedCodeSource { bytes }
    }
}

impl CodeSource for FixedCodeSource {
    fn next_code(&mut self) -> [u8; 4] {
        self.bytes
    }
}

fn encode_hex(bytes: [u8; 4]) -> String {
    let mut s = String::with_capacity(8);
    for b in bytes {
        s.push_str(&alloc::format!("{b:02x}"));
    }
    s
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalError {
    /// The batch doesn't exist for this session, or the code doesn't match.
    InvalidCode,
    /// The batch existed but its TTL has elapsed.
    ExpiredCode,
    /// The code is valid but was issued for a different session.
    WrongSession,
}

impl fmt::Display for ApprovalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalError::InvalidCode => write!(f, "invalid approval code"),
            ApprovalError::ExpiredCode => write!(f, "approval code has expired"),
            ApprovalError::WrongSession => write!(f, "approval code belongs to a different session"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ApprovalError {}

#[derive(Debug, Clone)]
struct PendingBatch {
    code: String,
    created_at_ms: u64,
    ttl_seconds: u64,
    tools: Vec<String>,
}

impl PendingBatch {
    fn expires_at_ms(&self) -> u64 {
        self.created_at_ms + self.ttl_seconds * 1000
    }

    fn remaining_seconds(&self, now_ms: u64) -> i64 {
        (self.expires_at_ms() as i64 - now_ms as i64) / 1000
    }

    fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms()
    }
}

#[derive(Debug, Clone)]
struct ApprovalRecord {
    tool_or_star: String,
    /// `None` means turn-scoped; `Some(ms)` means timed, expiring at that instant.
    expires_at_ms: Option<u64>,
}

/// Two per-session tables: live approvals, and batches pending an owner
/// `.approve` command.
#[derive(Debug, Default)]
pub struct ApprovalStore<C: CodeSource> {
    code_source: C,
    approvals: HashMap<String, Vec<ApprovalRecord>>,
    pending: HashMap<String, PendingBatch>,
}

impl<C: CodeSource> ApprovalStore<C> {
    pub fn new(code_source: C) -> Self {
        ApprovalStore { code_source, approvals: HashMap::new(), pending: HashMap::new() }
    }

    /// Register a batch of tools awaiting confirmation and return the code
    /// an owner must supply. If a live batch already exists for `session`
    /// with at least [`REUSE_THRESHOLD_SECONDS`] remaining, its code is
    /// reused instead of minting a new one — a session is never handed two
    /// live codes at once.
    pub fn add_pending_batch(
        &mut self,
        session: &str,
        _turn_id: u64,
        tools: &[String],
        ttl_seconds: u64,
        now_ms: u64,
    ) -> String {
        if let Some(existing) = self.pending.get_mut(session) {
            if !existing.is_expired(now_ms) && existing.remaining_seconds(now_ms) >= REUSE_THRESHOLD_SECONDS as i64 {
                for tool in tools {
                    if !existing.tools.iter().any(|t| t.eq_ignore_ascii_case(tool)) {
                        existing.tools.push(tool.clone());
                    }
                }
                return existing.code.clone();
            }
        }
        let code = encode_hex(self.code_source.next_code());
        self.pending.insert(
            session.to_string(),
            PendingBatch { code: code.clone(), created_at_ms: now_ms, ttl_seconds, tools: tools.to_vec() },
        );
        code
    }

    pub fn get_current_code(&self, session: &str) -> Option<String> {
        self.pending.get(session).map(|b| b.code.clone())
    }

    pub fn get_code_ttl_seconds(&self, session: &str) -> Option<u64> {
        self.pending.get(session).map(|b| b.ttl_seconds)
    }

    /// Validate and consume `code` for `session`, granting `target`
    /// (a tool name or `"all"`) either turn-scoped (no `duration_minutes`)
    /// or timed approval. The consumed batch is removed on success — a
    /// code cannot be replayed.
    ///
    /// `code_owner` is the session a caller-maintained cross-session code
    /// index (this store only ever sees one session's own pending batch)
    /// reports as the actual owner of `code`, if known. Pass `None` when no
    /// such index is available.
    pub fn approve_with_code(
        &mut self,
        session: &str,
        target: &str,
        code: &str,
        duration_minutes: Option<u64>,
        now_ms: u64,
        code_owner: Option<&str>,
    ) -> Result<(), ApprovalError> {
        let batch = match self.pending.get(session) {
            Some(batch) => batch,
            None => return Err(self.invalid_or_wrong_session(session, code_owner)),
        };

        if batch.is_expired(now_ms) {
            self.pending.remove(session);
            return Err(ApprovalError::ExpiredCode);
        }
        if !batch.code.eq_ignore_ascii_case(code) {
            return Err(self.invalid_or_wrong_session(session, code_owner));
        }

        let expires_at_ms = duration_minutes.map(|m| now_ms + m * 60 * 1000);
        let tools = batch.tools.clone();

        let session_approvals = self.approvals.entry(session.to_string()).or_default();
        if target.eq_ignore_ascii_case("all") {
            for tool in &tools {
                session_approvals.push(ApprovalRecord { tool_or_star: tool.clone(), expires_at_ms });
            }
        } else {
            session_approvals.push(ApprovalRecord { tool_or_star: target.to_string(), expires_at_ms });
        }

        self.pending.remove(session);
        Ok(())
    }

    /// `true` if `code_owner` — the session a caller's cross-session code
    /// index reports as owning the presented code — names a session other
    /// than `session`. This store never sees other sessions' pending
    /// batches, so it cannot tell wrong-session apart from unknown-code on
    /// its own.
    fn reject_wrong_session(&self, session: &str, code_owner: Option<&str>) -> bool {
        code_owner.is_some_and(|owner| owner != session)
    }

    fn invalid_or_wrong_session(&self, session: &str, code_owner: Option<&str>) -> ApprovalError {
        if self.reject_wrong_session(session, code_owner) {
            ApprovalError::WrongSession
        } else {
            ApprovalError::InvalidCode
        }
    }

    /// `true` if `"*"` is approved or `tool` is explicitly approved and, for
    /// timed approvals, not yet expired. Callers that need expiry checked
    /// against a specific wall-clock instant should use
    /// [`ApprovalStore::is_approved_at`] instead.
    pub fn is_approved(&self, session: &str, tool: &str) -> bool {
        self.is_approved_at(session, tool, 0)
    }

    /// As [`ApprovalStore::is_approved`] but checked against an explicit
    /// wall-clock time, so timed-approval expiry can be tested
    /// deterministically.
    pub fn is_approved_at(&self, session: &str, tool: &str, now_ms: u64) -> bool {
        let Some(records) = self.approvals.get(session) else { return false };
        records.iter().any(|r| {
            let live = r.expires_at_ms.map(|exp| now_ms < exp).unwrap_or(true);
            live && (r.tool_or_star == "all" || r.tool_or_star.eq_ignore_ascii_case(tool))
        })
    }

    /// Drop entries whose `expires_at` is absent (turn-scoped); timed
    /// entries survive.
    pub fn clear_turn_scoped(&mut self, session: &str) {
        if let Some(records) = self.approvals.get_mut(session) {
            records.retain(|r| r.expires_at_ms.is_some());
            if records.is_empty() {
                self.approvals.remove(session);
            }
        }
    }

    pub fn clear_all(&mut self, session: &str) {
        self.approvals.remove(session);
        self.pending.remove(session);
    }
}
