// SPDX-License-Identifier: Apache-2.0

//! Persistent per-session taint floor, carried forward across turns.
//!
//! The storage concern is abstracted behind [`WatermarkBackend`], a narrow
//! single-map trait in the same vein as a generic `Storage` abstraction.
//! `provenance-core` ships [`InMemoryWatermarkBackend`] for tests and
//! ephemeral hosts; `provenance-std` ships a file-backed implementation.

use alloc::string::{String, ToString};
use hashbrown::HashMap;

use crate::types::{TrustLevel, WatermarkEntry};

/// Storage abstraction for the watermark map. Implementors own persistence;
/// [`WatermarkStore`] owns the escalate/clear business logic on top.
pub trait WatermarkBackend {
    /// Current entry for `session`, if one has been recorded.
    fn get(&self, session: &str) -> Option<WatermarkEntry>;
    /// Insert or replace the entry for `session`.
    fn put(&mut self, session: &str, entry: WatermarkEntry);
    /// Remove the entry for `session`, returning it if present.
    fn remove(&mut self, session: &str) -> Option<WatermarkEntry>;
}

/// In-memory [`WatermarkBackend`], suitable for tests and hosts with no
/// durable state requirement.
#[derive(Debug, Default)]
pub struct InMemoryWatermarkBackend {
    entries: HashMap<String, WatermarkEntry>,
}

impl InMemoryWatermarkBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WatermarkBackend for InMemoryWatermarkBackend {
    fn get(&self, session: &str) -> Option<WatermarkEntry> {
        self.entries.get(session).cloned()
    }

    fn put(&mut self, session: &str, entry: WatermarkEntry) {
        self.entries.insert(session.to_string(), entry);
    }

    fn remove(&mut self, session: &str) -> Option<WatermarkEntry> {
        self.entries.remove(session)
    }
}

/// Business logic over a [`WatermarkBackend`]: monotone escalation and
/// owner-triggered clearing.
///
/// Levels laxer than `owner`/`trusted` (i.e. `Shared`, `External`,
/// `Untrusted`) are the only ones ever recorded — a turn that ends at
/// `Owner` or `System` leaves no watermark entry, matching "created only for
/// levels worse than owner/trusted."
pub struct WatermarkStore<B: WatermarkBackend> {
    backend: B,
}

impl<B: WatermarkBackend> WatermarkStore<B> {
    pub fn new(backend: B) -> Self {
        WatermarkStore { backend }
    }

    pub fn get(&self, session: &str) -> Option<WatermarkEntry> {
        self.backend.get(session)
    }

    /// Write only if `level` is strictly worse (laxer) than both the
    /// existing entry (if any) and `Owner`. Returns `true` if the watermark
    /// changed.
    pub fn escalate(&mut self, session: &str, level: TrustLevel, reason: &str, now_ms: u64) -> bool {
        if level >= TrustLevel::Owner {
            return false;
        }
        if let Some(existing) = self.backend.get(session) {
            if level >= existing.floor {
                return false;
            }
        }
        self.backend.put(
            session,
            WatermarkEntry {
                session_id: session.to_string(),
                floor: level,
                reason: reason.to_string(),
                updated_at_ms: now_ms,
            },
        );
        true
    }

    /// Remove the entry for `session`.
    pub fn clear(&mut self, session: &str) {
        self.backend.remove(session);
    }

    /// Remove the entry for `session`, returning the removed value.
    pub fn clear_with_audit(&mut self, session: &str) -> Option<WatermarkEntry> {
        self.backend.remove(session)
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
