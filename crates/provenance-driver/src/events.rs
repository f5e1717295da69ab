// SPDX-License-Identifier: Apache-2.0

//! Typed payloads for the seven host lifecycle events, and the driver's
//! return contract.
//!
//! Specialised to a single outcome enum because every hook in this system
//! shares one return contract: do nothing, replace the tool list, block the
//! turn, or rewrite outbound content.

use provenance_core::types::AgentContext;
use serde::{Deserialize, Serialize};

/// A single chat message as the host delivers it alongside `before_llm_call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostMessage {
    pub role: String,
    pub content: String,
}

/// A tool the model may call, as advertised to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostTool {
    pub name: String,
}

/// A tool the model actually called, as reported after the LLM turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostToolCall {
    pub name: String,
}

/// `context_assembled` payload: fired once at turn start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextAssembledEvent {
    pub system_prompt: String,
    pub message_count: usize,
}

/// `before_llm_call` payload: fired before each model call within a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeforeLlmCallEvent {
    pub iteration: u64,
    pub tools: Vec<HostTool>,
    pub messages: Vec<HostMessage>,
}

/// `after_llm_call` payload: fired after the model responds, naming the
/// tools it asked to invoke.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AfterLlmCallEvent {
    pub iteration: u64,
    pub tool_calls: Vec<HostToolCall>,
}

/// `before_tool_call` payload: fired once per tool, just before dispatch —
/// the second enforcement layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeforeToolCallEvent {
    pub tool_name: String,
}

/// `loop_iteration_start` / `loop_iteration_end` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopIterationEvent {
    pub iteration: u64,
    pub message_count: Option<usize>,
    pub tool_calls_made: Option<usize>,
    pub will_continue: Option<bool>,
}

/// `before_response_emit` payload: fired once at turn end with the
/// about-to-be-sent outbound content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeforeResponseEmitEvent {
    pub content: String,
}

/// Unified return contract for every hook. `Undefined` means "no action" —
/// the host proceeds exactly as it would have without this driver installed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HookOutcome {
    /// No action; the host's default behaviour stands.
    Undefined,
    /// Replace the tool list the model is about to see.
    Tools { tools: Vec<String> },
    /// Abort the turn outright.
    Block { block_reason: String },
    /// Rewrite the outbound message content.
    Content { content: String },
}

impl HookOutcome {
    pub fn is_undefined(&self) -> bool {
        matches!(self, HookOutcome::Undefined)
    }
}

/// Re-exported so callers only need `provenance_driver::events::AgentContext`
/// rather than also depending on `provenance-core` directly for this one type.
pub type HostAgentContext = AgentContext;
