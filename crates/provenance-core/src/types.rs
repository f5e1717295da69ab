// SPDX-License-Identifier: Apache-2.0

//! Shared data types used across all provenance sub-systems.
//!
//! All types implement [`Clone`], [`Debug`], [`serde::Serialize`], and
//! [`serde::Deserialize`] so they can be serialised to JSON, stored, and
//! moved across host/driver boundaries without additional conversion steps.

use alloc::string::String;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Trust lattice
// ---------------------------------------------------------------------------

/// Six-level totally-ordered trust lattice for content provenance.
///
/// Each variant's discriminant (`repr(u8)`) reflects its rank in the
/// lattice. Higher numeric values denote more trusted origin. Trust is
/// assigned to graph nodes by the classifier in `lattice.rs` and only ever
/// moves in the direction of *less* trusted as content mixes — see
/// `graph.rs`'s high-water-mark accumulation.
///
/// # Examples
///
/// ```rust
/// use provenance_core::types::TrustLevel;
///
/// assert!(TrustLevel::Owner > TrustLevel::Local);
/// assert_eq!(TrustLevel::Untrusted as u8, 0);
/// ```
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrustLevel {
    /// Unvetted adversarial content (e.g. raw web scrape, unauthenticated input).
    Untrusted = 0,
    /// Third-party content fetched across a trust boundary (API responses, search results).
    External = 1,
    /// Content shared within a known collaborative scope (team docs, shared drives).
    Shared = 2,
    /// Content local to the user's own machine or workspace.
    Local = 3,
    /// Content originating from the authenticated owner of the session.
    Owner = 4,
    /// Content originating from the host system itself (system prompts, trusted config).
    System = 5,
}

impl TrustLevel {
    /// Human-readable display name for logging and UI surfaces.
    pub fn display_name(self) -> &'static str {
        match self {
            TrustLevel::Untrusted => "untrusted",
            TrustLevel::External  => "external",
            TrustLevel::Shared    => "shared",
            TrustLevel::Local     => "local",
            TrustLevel::Owner     => "owner",
            TrustLevel::System    => "system",
        }
    }

    /// Try to construct a [`TrustLevel`] from its raw `u8` discriminant.
    ///
    /// Returns `None` for values outside `0..=5`.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TrustLevel::Untrusted),
            1 => Some(TrustLevel::External),
            2 => Some(TrustLevel::Shared),
            3 => Some(TrustLevel::Local),
            4 => Some(TrustLevel::Owner),
            5 => Some(TrustLevel::System),
            _ => None,
        }
    }
}

/// Four-value projection of [`TrustLevel`] used only for policy configuration
/// keys. `System`, `Owner`, and `Local` collapse onto `Trusted` — see
/// `policy::build_policy_config`'s merge step and the Open Question decision
/// recorded in DESIGN.md.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PolicyTrust {
    Untrusted = 0,
    External  = 1,
    Shared    = 2,
    Trusted   = 3,
}

impl PolicyTrust {
    /// Project a full six-level [`TrustLevel`] down onto the four policy buckets.
    pub fn from_trust_level(level: TrustLevel) -> Self {
        match level {
            TrustLevel::Untrusted => PolicyTrust::Untrusted,
            TrustLevel::External  => PolicyTrust::External,
            TrustLevel::Shared    => PolicyTrust::Shared,
            TrustLevel::Local | TrustLevel::Owner | TrustLevel::System => PolicyTrust::Trusted,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            PolicyTrust::Untrusted => "untrusted",
            PolicyTrust::External  => "external",
            PolicyTrust::Shared    => "shared",
            PolicyTrust::Trusted   => "trusted",
        }
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Enforcement mode attached to a taint level (or tool override).
///
/// Totally ordered: `Allow < Confirm < Restrict`. Policy configs are
/// validated to be monotone non-increasing as taint worsens (see
/// `policy::validate_monotonicity`).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PolicyMode {
    /// No restriction; the tool call proceeds unmodified.
    Allow = 0,
    /// The call is permitted but requires an owner-issued approval code.
    Confirm = 1,
    /// The call is blocked entirely until trust is restored or an override is issued.
    Restrict = 2,
}

impl PolicyMode {
    pub fn display_name(self) -> &'static str {
        match self {
            PolicyMode::Allow    => "allow",
            PolicyMode::Confirm  => "confirm",
            PolicyMode::Restrict => "restrict",
        }
    }
}

/// A single key within a [`ToolOverride`]'s level map: either an exact
/// policy-trust bucket, or the `"*"` wildcard that applies when no exact
/// entry matches the current taint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolOverrideKey {
    Level(PolicyTrust),
    Wildcard,
}

/// Per-tool override, keyed by taint level (or `"*"`). An entry *replaces*
/// the taint-level default for that tool name (case-insensitive) at the
/// level it matches, rather than being merged strictest-wins — see
/// `policy::get_tool_mode`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOverride {
    /// Tool name this override applies to, matched case-insensitively.
    pub tool_name: String,
    /// `(level-or-wildcard, mode)` entries. At most one entry per key.
    pub levels: Vec<(ToolOverrideKey, PolicyMode)>,
}

impl ToolOverride {
    /// Build a wildcard-only override — `{"*": mode}` — the shape of every
    /// built-in safe-tool entry.
    pub fn wildcard(tool_name: impl Into<String>, mode: PolicyMode) -> Self {
        ToolOverride { tool_name: tool_name.into(), levels: alloc::vec![(ToolOverrideKey::Wildcard, mode)] }
    }

    /// Resolve this override's mode at `current_taint`: an exact-level entry
    /// wins over a `"*"` entry. `None` if neither is present.
    pub fn mode_for(&self, current_taint: PolicyTrust) -> Option<PolicyMode> {
        self.levels
            .iter()
            .find(|(key, _)| *key == ToolOverrideKey::Level(current_taint))
            .or_else(|| self.levels.iter().find(|(key, _)| *key == ToolOverrideKey::Wildcard))
            .map(|(_, mode)| *mode)
    }
}

/// Taint-level → mode default table plus per-tool overrides.
///
/// Keyed by [`PolicyTrust`] rather than the full six-level [`TrustLevel`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Default mode for each of the four policy taint buckets, ordered
    /// `[Untrusted, External, Shared, Trusted]`.
    pub taint_defaults: [PolicyMode; 4],
    /// Per-tool overrides, applied after the taint-level default lookup.
    pub tool_overrides: Vec<ToolOverride>,
}

impl PolicyConfig {
    /// Mode default for a given policy-trust bucket.
    pub fn default_for(&self, trust: PolicyTrust) -> PolicyMode {
        self.taint_defaults[trust as usize]
    }
}

/// Result of evaluating a single tool call against the policy table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatedPolicy {
    /// Name of the tool that was evaluated.
    pub tool_name: String,
    /// Taint bucket the evaluation was keyed on.
    pub taint: PolicyTrust,
    /// Resolved mode: tool override if present, else the taint-level default.
    pub mode: PolicyMode,
    /// `true` if a per-tool override fired instead of the taint-level default.
    pub overridden: bool,
    /// `true` if the session's iteration counter exceeded the configured max.
    /// Soft-signal only — see the max-iterations Open Question decision.
    pub max_iterations_exceeded: bool,
}

// ---------------------------------------------------------------------------
// Provenance graph
// ---------------------------------------------------------------------------

/// Kind of node recorded in a [`crate::graph::ProvenanceGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    SystemPrompt,
    History,
    LlmCall,
    ToolCall,
    PolicyDecision,
    Output,
}

/// Relation an edge records between two graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeRelation {
    Triggers,
    Produces,
    Consumes,
    DerivesFrom,
    BlockedBy,
}

/// A single node in the per-turn provenance DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: u64,
    pub kind: NodeKind,
    /// Trust level attributed to this node's content at the moment it was recorded.
    pub trust: TrustLevel,
    /// Tool name, when `kind` is `ToolCall` or `PolicyDecision`.
    pub tool: Option<String>,
    /// Loop iteration this node belongs to, when applicable.
    pub iteration: Option<u64>,
    /// `true` for a `PolicyDecision` node recording a blocked call.
    pub blocked: bool,
    /// Free-form metadata (reason strings, content lengths, etc.) as JSON text.
    pub metadata: Option<String>,
    pub created_at_ms: u64,
}

/// A directed edge between two nodes in the DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: u64,
    pub to: u64,
    pub relation: EdgeRelation,
}

/// Read-only snapshot of a turn's provenance graph state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSummary {
    pub session_id: String,
    pub turn_id: u64,
    /// High-water-mark taint across every node recorded so far this turn.
    pub max_taint: TrustLevel,
    /// Distinct tool names whose output trust is `External` or `Untrusted`.
    pub external_sources: Vec<String>,
    /// Distinct tool names invoked (recorded as `ToolCall` nodes) this turn.
    pub tools_used: Vec<String>,
    /// Distinct tool names blocked (recorded as `PolicyDecision` nodes with `blocked=true`).
    pub tools_blocked: Vec<String>,
    /// Highest loop iteration observed so far this turn.
    pub iteration_count: u64,
    pub node_count: usize,
    pub edge_count: usize,
    pub sealed: bool,
}

// ---------------------------------------------------------------------------
// Watermark
// ---------------------------------------------------------------------------

/// Persisted per-session taint floor, carried forward across turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkEntry {
    pub session_id: String,
    pub floor: TrustLevel,
    pub reason: String,
    pub updated_at_ms: u64,
}

// ---------------------------------------------------------------------------
// Driver-facing configuration knobs
// ---------------------------------------------------------------------------

/// Flat scalar configuration shared by the driver and the policy engine.
///
/// Loaded in layers: built-in defaults, then an optional policy TOML file,
/// then a flat config file or environment variables, then programmatic
/// overrides — see `config_loader.rs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverDefaults {
    /// Seconds an approval code (of either scope) remains valid.
    pub approval_ttl_seconds: u64,
    /// Soft ceiling on loop iterations per turn before a warning is raised.
    pub max_iterations: u64,
    /// Capacity of the sealed-graph ring buffer (`GraphArchive`).
    pub max_completed_graphs: usize,
    /// When true, diagnostic detail is included in driver responses that would
    /// otherwise be withheld from untrusted output surfaces.
    pub developer_mode: bool,
    /// When true, the driver emits `tracing` events at `debug` rather than `info`.
    pub verbose: bool,
}

impl Default for DriverDefaults {
    fn default() -> Self {
        DriverDefaults {
            approval_ttl_seconds: 60,
            max_iterations: 10,
            max_completed_graphs: 100,
            developer_mode: false,
            verbose: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Classification input
// ---------------------------------------------------------------------------

/// Host-supplied facts about the turn's originating agent/session, as
/// delivered alongside the `context_assembled` lifecycle event. Passed to
/// `lattice::classify_initial_trust` to derive the turn's initial trust level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentContext {
    pub agent_id: Option<String>,
    pub session_key: String,
    pub workspace_dir: Option<String>,
    pub message_provider: Option<String>,
    pub sender_id: Option<String>,
    pub sender_name: Option<String>,
    pub sender_is_owner: Option<bool>,
    pub group_id: Option<String>,
    pub spawned_by: Option<String>,
}

pub type NodeId = u64;
