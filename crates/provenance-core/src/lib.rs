// SPDX-License-Identifier: Apache-2.0

//! # provenance-core
//!
//! Content-provenance taint-tracking and policy-enforcement core for an LLM
//! agent runtime.
//!
//! This crate is `no_std`-compatible (requires `alloc`). Enable the `std`
//! feature (on by default) for the OS-CSPRNG approval code source and
//! `hashbrown`'s default hasher.
//!
//! ## Architecture
//!
//! ```text
//! lattice   (C1) — trust lattice, tool-trust table, initial-trust classifier
//! graph     (C2) — per-turn provenance DAG, high-water-mark taint
//! watermark (C3) — in-memory half of the persistent per-session taint floor
//! policy    (C4) — taint-level × tool-override resolution
//! approval  (C5) — approval codes, turn-scoped vs. timed grants
//! ```
//!
//! The sixth subsystem — the enforcement driver wiring these to host
//! lifecycle events — lives in the separate `provenance-driver` crate,
//! keeping this crate `no_std`-friendly and free of any host-integration
//! surface.
//!
//! ## Quick Start
//!
//! ```rust
//! use provenance_core::graph::ProvenanceGraph;
//! use provenance_core::lattice::classify_initial_trust;
//! use provenance_core::policy::{build_policy_config, evaluate_policy};
//! use provenance_core::types::AgentContext;
//!
//! let ctx = AgentContext { sender_is_owner: Some(true), ..Default::default() };
//! let initial_trust = classify_initial_trust(&ctx);
//!
//! let mut graph = ProvenanceGraph::new("session-1", 1);
//! graph.record_context_assembled(120, 1, initial_trust, 0).unwrap();
//!
//! let (config, _warnings) = build_policy_config(&[], &[]);
//! let tools = vec!["exec".to_string(), "read".to_string()];
//! let evaluation = evaluate_policy(&graph, &tools, &config, 10);
//! assert!(evaluation.allowed.contains(&"exec".to_string()));
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod approval;
pub mod config;
pub mod graph;
pub mod lattice;
pub mod policy;
pub mod types;
pub mod watermark;

#[cfg(feature = "config-loader")]
pub mod config_loader;

pub use graph::{GraphArchive, GraphError, ProvenanceGraph};
pub use lattice::{classify_initial_trust, min_trust, tool_trust};
pub use policy::{build_policy_config, evaluate_policy, evaluate_with_approvals, get_tool_mode};
pub use types::{
    AgentContext, DriverDefaults, GraphSummary, PolicyConfig, PolicyMode, PolicyTrust, ToolOverride,
    ToolOverrideKey, TrustLevel, WatermarkEntry,
};
pub use watermark::{InMemoryWatermarkBackend, WatermarkBackend, WatermarkStore};
