// SPDX-License-Identifier: Apache-2.0

//! Per-turn provenance graph with a high-water-mark taint accumulator.
//!
//! A [`ProvenanceGraph`] is created at turn start and mutated by the
//! `record_*` calls as the turn proceeds. Nodes are stored in a dense vector
//! keyed by a monotonically-increasing local id; the graph exclusively owns
//! its nodes and edges and callers only ever see [`GraphSummary`] snapshots.

use alloc::collections::VecDeque;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::lattice::{min_trust, tool_trust};
use crate::types::{EdgeRelation, GraphEdge, GraphNode, GraphSummary, NodeKind, TrustLevel};

/// Programmer-error conditions surfaced by [`ProvenanceGraph`].
///
/// Per the crate's error-handling design, mutating a sealed graph is never
/// silently swallowed — it is returned here so the caller (the enforcement
/// driver) can treat it as a fatal fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// An attempt was made to mutate a graph after `seal()` was called.
    SealedMutation,
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::SealedMutation => write!(f, "attempted to mutate a sealed provenance graph"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for GraphError {}

/// Serialisable snapshot of a graph's full node/edge contents, used by
/// [`ProvenanceGraph::to_json`] and its round-trip reconstruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub session_id: String,
    pub turn_id: u64,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub max_taint: TrustLevel,
    pub sealed: bool,
}

/// The per-(session, turn) provenance DAG.
#[derive(Debug, Clone)]
pub struct ProvenanceGraph {
    session_id: String,
    turn_id: u64,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    next_id: u64,
    max_taint: TrustLevel,
    sealed: bool,
}

impl ProvenanceGraph {
    /// Create a fresh graph for `session_id`/`turn_id`.
    ///
    /// Turn creation itself is the enforcement driver's responsibility
    /// (`start_turn`, which must first seal and archive any prior unsealed
    /// graph for the session) — this constructor only builds the empty graph.
    pub fn new(session_id: impl Into<String>, turn_id: u64) -> Self {
        ProvenanceGraph {
            session_id: session_id.into(),
            turn_id,
            nodes: Vec::new(),
            edges: Vec::new(),
            next_id: 0,
            max_taint: TrustLevel::System,
            sealed: false,
        }
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn push_node(
        &mut self,
        kind: NodeKind,
        trust: TrustLevel,
        tool: Option<String>,
        iteration: Option<u64>,
        blocked: bool,
        metadata: Option<String>,
        now_ms: u64,
    ) -> Result<u64, GraphError> {
        if self.sealed {
            return Err(GraphError::SealedMutation);
        }
        let id = self.alloc_id();
        self.nodes.push(GraphNode {
            id,
            kind,
            trust,
            tool,
            iteration,
            blocked,
            metadata,
            created_at_ms: now_ms,
        });
        // I1: adding a node never reduces max_taint.
        self.max_taint = min_trust(self.max_taint, trust);
        Ok(id)
    }

    fn push_edge(&mut self, from: u64, to: u64, relation: EdgeRelation) {
        self.edges.push(GraphEdge { from, to, relation });
    }

    /// Insert a `system_prompt` node (trust=`system`) and, if `message_count
    /// > 0`, a `history` node with trust `initial_trust`.
    pub fn record_context_assembled(
        &mut self,
        system_prompt_len: usize,
        message_count: usize,
        initial_trust: TrustLevel,
        now_ms: u64,
    ) -> Result<(), GraphError> {
        self.push_node(
            NodeKind::SystemPrompt,
            TrustLevel::System,
            None,
            None,
            false,
            Some(alloc::format!("{{\"len\":{system_prompt_len}}}")),
            now_ms,
        )?;
        if message_count > 0 {
            self.push_node(
                NodeKind::History,
                initial_trust,
                None,
                None,
                false,
                Some(alloc::format!("{{\"messageCount\":{message_count}}}")),
                now_ms,
            )?;
        }
        Ok(())
    }

    /// Insert an `inherited-taint` history node carrying a watermark's
    /// level forward into a fresh turn. See S5 in the scenario suite.
    pub fn record_inherited_taint(&mut self, level: TrustLevel, now_ms: u64) -> Result<u64, GraphError> {
        self.push_node(
            NodeKind::History,
            level,
            None,
            None,
            false,
            Some("\"inherited-taint\"".to_string()),
            now_ms,
        )
    }

    /// Insert an `llm_call` node with trust equal to current `max_taint`.
    pub fn record_llm_call(&mut self, iteration: u64, tool_count: usize, now_ms: u64) -> Result<u64, GraphError> {
        let trust = self.max_taint;
        self.push_node(
            NodeKind::LlmCall,
            trust,
            None,
            Some(iteration),
            false,
            Some(alloc::format!("{{\"toolCount\":{tool_count}}}")),
            now_ms,
        )
    }

    /// Insert a `tool_call` node with `trust = tool_trust(name)`; links an
    /// edge from `parent_llm_node` (if given) with relation `triggers`.
    /// Raises the high-water mark.
    pub fn record_tool_call(
        &mut self,
        name: &str,
        iteration: u64,
        parent_llm_node: Option<u64>,
        overrides: &[(String, TrustLevel)],
        now_ms: u64,
    ) -> Result<u64, GraphError> {
        let trust = tool_trust(name, overrides);
        let id = self.push_node(
            NodeKind::ToolCall,
            trust,
            Some(name.to_string()),
            Some(iteration),
            false,
            None,
            now_ms,
        )?;
        if let Some(parent) = parent_llm_node {
            self.push_edge(parent, id, EdgeRelation::Triggers);
        }
        Ok(id)
    }

    /// Insert a `policy_decision` node with trust=`system`, `blocked=true`.
    pub fn record_blocked_tool(
        &mut self,
        name: &str,
        reason: &str,
        iteration: u64,
        now_ms: u64,
    ) -> Result<u64, GraphError> {
        self.push_node(
            NodeKind::PolicyDecision,
            TrustLevel::System,
            Some(name.to_string()),
            Some(iteration),
            true,
            Some(reason.to_string()),
            now_ms,
        )
    }

    /// Insert an `output` node with trust=`max_taint`.
    pub fn record_output(&mut self, content_len: usize, now_ms: u64) -> Result<u64, GraphError> {
        let trust = self.max_taint;
        self.push_node(
            NodeKind::Output,
            trust,
            None,
            None,
            false,
            Some(alloc::format!("{{\"contentLen\":{content_len}}}")),
            now_ms,
        )
    }

    /// Lower `max_taint` to `level` (I4: the only operation allowed to lower
    /// it). Only reachable, by contract, via the enforcement driver's
    /// `.reset-trust` handling. Fails on a sealed graph.
    pub fn reset_taint(&mut self, level: TrustLevel) -> Result<(), GraphError> {
        if self.sealed {
            return Err(GraphError::SealedMutation);
        }
        self.max_taint = level;
        Ok(())
    }

    /// Seal the graph. Idempotent: calling `seal` again just returns the
    /// same summary without error.
    pub fn seal(&mut self) -> GraphSummary {
        self.sealed = true;
        self.summary()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn max_taint(&self) -> TrustLevel {
        self.max_taint
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn turn_id(&self) -> u64 {
        self.turn_id
    }

    /// `{max_taint, external_sources, tools_used, tools_blocked,
    /// iteration_count, node_count, edge_count}`.
    pub fn summary(&self) -> GraphSummary {
        let mut external_sources: Vec<String> = Vec::new();
        let mut tools_used: Vec<String> = Vec::new();
        let mut tools_blocked: Vec<String> = Vec::new();
        let mut iteration_count: u64 = 0;

        for node in &self.nodes {
            if let Some(iter) = node.iteration {
                if iter > iteration_count {
                    iteration_count = iter;
                }
            }
            match node.kind {
                NodeKind::ToolCall => {
                    if let Some(tool) = &node.tool {
                        if !tools_used.iter().any(|t| t == tool) {
                            tools_used.push(tool.clone());
                        }
                        if matches!(node.trust, TrustLevel::External | TrustLevel::Untrusted)
                            && !external_sources.iter().any(|t| t == tool)
                        {
                            external_sources.push(tool.clone());
                        }
                    }
                }
                NodeKind::PolicyDecision if node.blocked => {
                    if let Some(tool) = &node.tool {
                        if !tools_blocked.iter().any(|t| t == tool) {
                            tools_blocked.push(tool.clone());
                        }
                    }
                }
                _ => {}
            }
        }

        GraphSummary {
            session_id: self.session_id.clone(),
            turn_id: self.turn_id,
            max_taint: self.max_taint,
            external_sources,
            tools_used,
            tools_blocked,
            iteration_count,
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            sealed: self.sealed,
        }
    }

    /// Canonical JSON serialisation for archival, reconstructable via
    /// [`ProvenanceGraph::from_snapshot`].
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.to_snapshot())
    }

    pub fn to_snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            session_id: self.session_id.clone(),
            turn_id: self.turn_id,
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            max_taint: self.max_taint,
            sealed: self.sealed,
        }
    }

    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let next_id = snapshot.nodes.iter().map(|n| n.id + 1).max().unwrap_or(0);
        ProvenanceGraph {
            session_id: snapshot.session_id,
            turn_id: snapshot.turn_id,
            nodes: snapshot.nodes,
            edges: snapshot.edges,
            next_id,
            max_taint: snapshot.max_taint,
            sealed: snapshot.sealed,
        }
    }
}

/// Ring buffer of sealed graphs, capacity `max_completed_graphs` (default
/// 100). Implements the "archived (ring buffer ≤ N completed)" lifecycle
/// stage — the oldest sealed graph is evicted once the buffer is full.
#[derive(Debug)]
pub struct GraphArchive {
    capacity: usize,
    entries: VecDeque<GraphSnapshot>,
}

impl GraphArchive {
    pub fn new(capacity: usize) -> Self {
        GraphArchive { capacity: capacity.max(1), entries: VecDeque::new() }
    }

    /// Archive a sealed graph, evicting the oldest entry if at capacity.
    pub fn archive(&mut self, graph: &ProvenanceGraph) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(graph.to_snapshot());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently archived entries first.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &GraphSnapshot> {
        self.entries.iter().rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adding_a_node_never_lowers_max_taint() {
        let mut g = ProvenanceGraph::new("s1", 1);
        g.record_context_assembled(10, 0, TrustLevel::Owner, 0).unwrap();
        assert_eq!(g.max_taint(), TrustLevel::Owner);
        g.record_tool_call("web_fetch", 1, None, &[], 0).unwrap();
        assert_eq!(g.max_taint(), TrustLevel::Untrusted);
        g.record_tool_call("exec", 2, None, &[], 0).unwrap();
        // exec (local) is more trusted than the current untrusted floor —
        // max_taint must not rise back up.
        assert_eq!(g.max_taint(), TrustLevel::Untrusted);
    }

    #[test]
    fn sealed_graph_rejects_mutation() {
        let mut g = ProvenanceGraph::new("s1", 1);
        g.seal();
        assert_eq!(g.record_llm_call(1, 0, 0), Err(GraphError::SealedMutation));
        assert_eq!(g.reset_taint(TrustLevel::System), Err(GraphError::SealedMutation));
    }

    #[test]
    fn seal_is_idempotent() {
        let mut g = ProvenanceGraph::new("s1", 1);
        g.record_tool_call("exec", 1, None, &[], 0).unwrap();
        let first = g.seal();
        let second = g.seal();
        assert_eq!(first.max_taint, second.max_taint);
        assert_eq!(first.node_count, second.node_count);
    }

    #[test]
    fn tool_call_trust_matches_table() {
        let mut g = ProvenanceGraph::new("s1", 1);
        let id = g.record_tool_call("message", 1, None, &[], 0).unwrap();
        let node = g.nodes.iter().find(|n| n.id == id).unwrap();
        assert_eq!(node.trust, TrustLevel::External);
    }

    #[test]
    fn reset_taint_is_the_only_way_down() {
        let mut g = ProvenanceGraph::new("s1", 1);
        g.record_tool_call("web_fetch", 1, None, &[], 0).unwrap();
        assert_eq!(g.max_taint(), TrustLevel::Untrusted);
        g.reset_taint(TrustLevel::System).unwrap();
        assert_eq!(g.max_taint(), TrustLevel::System);
    }

    #[test]
    fn json_round_trip_preserves_summary() {
        let mut g = ProvenanceGraph::new("s1", 7);
        g.record_context_assembled(5, 2, TrustLevel::Owner, 0).unwrap();
        g.record_tool_call("exec", 1, None, &[], 0).unwrap();
        g.seal();
        let json = g.to_json().unwrap();
        let snapshot: GraphSnapshot = serde_json::from_str(&json).unwrap();
        let reconstructed = ProvenanceGraph::from_snapshot(snapshot);
        assert_eq!(reconstructed.summary().max_taint, g.summary().max_taint);
        assert_eq!(reconstructed.summary().node_count, g.summary().node_count);
    }

    #[test]
    fn archive_evicts_oldest_past_capacity() {
        let mut archive = GraphArchive::new(2);
        for i in 0..3u64 {
            let mut g = ProvenanceGraph::new("s1", i);
            g.seal();
            archive.archive(&g);
        }
        assert_eq!(archive.len(), 2);
        let newest: Vec<_> = archive.iter_newest_first().map(|s| s.turn_id).collect();
        assert_eq!(newest, alloc::vec![2, 1]);
    }
}
