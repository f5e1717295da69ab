// SPDX-License-Identifier: Apache-2.0

//! The enforcement driver: wires `provenance-core`'s graph, watermark,
//! policy, and approval subsystems to the seven host lifecycle events.
//!
//! Shaped like an `Arc<RwLock<...>>`-per-manager async engine (sequential
//! gate pipeline, an always-logged decision trail) but partitions state per
//! session behind a registry rather than one process-wide engine, since
//! taint tracking is inherently per-(session, turn).

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use provenance_core::approval::{ApprovalStore, OsCodeSource};
use provenance_core::config::ProvenanceConfig;
use provenance_core::graph::{GraphArchive, ProvenanceGraph};
use provenance_core::lattice::{classify_initial_trust, tool_trust};
use provenance_core::policy::evaluate_with_approvals;
use provenance_core::types::{AgentContext, NodeId, TrustLevel};
use provenance_core::watermark::WatermarkStore;
use provenance_std::FileWatermarkBackend;
use tokio::sync::Mutex as TokioMutex;

use crate::commands::{parse_owner_command, OwnerCommand};
use crate::error::DriverError;
use crate::events::{
    AfterLlmCallEvent, BeforeLlmCallEvent, BeforeResponseEmitEvent, BeforeToolCallEvent,
    ContextAssembledEvent, HookOutcome, LoopIterationEvent,
};

/// Per-session transient state carried across a turn's hooks and, for the
/// graph archive and approval store, across turns.
struct SessionState {
    /// The in-flight turn's graph. `None` only before the first
    /// `context_assembled` for this session.
    graph: Option<ProvenanceGraph>,
    archive: GraphArchive,
    approvals: ApprovalStore<OsCodeSource>,
    last_llm_node: Option<NodeId>,
    blocked_tools: Vec<String>,
    current_iteration: u64,
    next_turn_id: u64,
}

impl SessionState {
    fn new(max_completed_graphs: usize) -> Self {
        SessionState {
            graph: None,
            archive: GraphArchive::new(max_completed_graphs),
            approvals: ApprovalStore::new(OsCodeSource),
            last_llm_node: None,
            blocked_tools: Vec::new(),
            current_iteration: 0,
            next_turn_id: 0,
        }
    }

    fn graph_mut(&mut self) -> &mut ProvenanceGraph {
        self.graph.as_mut().expect("hook fired before context_assembled started a turn")
    }

    fn is_blocked(&self, tool_name: &str) -> bool {
        self.blocked_tools.iter().any(|t| t.eq_ignore_ascii_case(tool_name))
    }
}

/// Wires `provenance-core` to a host agent runtime's seven lifecycle hooks.
///
/// One `EnforcementDriver` is shared process-wide; per-session state lives
/// behind a registry keyed by session key, each entry its own
/// `tokio::sync::Mutex` so concurrent sessions never contend on each
/// other's graph or approval state. The shared watermark file is the one
/// piece of cross-session state and is protected by its own mutex.
pub struct EnforcementDriver {
    sessions: StdMutex<HashMap<String, Arc<TokioMutex<SessionState>>>>,
    watermark: Arc<TokioMutex<WatermarkStore<FileWatermarkBackend>>>,
    /// Cross-session code → owning-session index. Approval codes themselves
    /// live in each session's own `ApprovalStore`; this small shared map
    /// exists only so a code presented against the wrong session can be
    /// told apart from one that's simply unknown.
    code_owners: StdMutex<HashMap<String, String>>,
    config: ProvenanceConfig,
    tool_trust_overrides: Vec<(String, TrustLevel)>,
}

impl EnforcementDriver {
    pub fn new(
        config: ProvenanceConfig,
        watermark_backend: FileWatermarkBackend,
        tool_trust_overrides: Vec<(String, TrustLevel)>,
    ) -> Self {
        for warning in &config.warnings {
            tracing::warn!(target: "provenance_driver::config", "{warning}");
        }
        EnforcementDriver {
            sessions: StdMutex::new(HashMap::new()),
            watermark: Arc::new(TokioMutex::new(WatermarkStore::new(watermark_backend))),
            code_owners: StdMutex::new(HashMap::new()),
            config,
            tool_trust_overrides,
        }
    }

    fn session_handle(&self, session: &str) -> Arc<TokioMutex<SessionState>> {
        let mut sessions = self.sessions.lock().expect("session registry mutex poisoned");
        sessions
            .entry(session.to_string())
            .or_insert_with(|| {
                Arc::new(TokioMutex::new(SessionState::new(self.config.defaults.max_completed_graphs)))
            })
            .clone()
    }

    // -----------------------------------------------------------------------
    // E7 startup
    // -----------------------------------------------------------------------

    /// Emit a loud warning if the host's internal-hook feature flag isn't
    /// enabled. Non-fatal: the driver still registers, it just won't fire.
    pub fn on_startup(&self, host_feature_flag_enabled: bool) {
        if !host_feature_flag_enabled {
            tracing::warn!(
                "{}",
                DriverError::FeatureFlagMissing
            );
        }
    }

    // -----------------------------------------------------------------------
    // E1 context_assembled
    // -----------------------------------------------------------------------

    pub async fn context_assembled(
        &self,
        ctx: &AgentContext,
        event: &ContextAssembledEvent,
        now_ms: u64,
    ) -> HookOutcome {
        let handle = self.session_handle(&ctx.session_key);
        let mut state = handle.lock().await;

        // Cancellation: a prior turn that never reached before_response_emit
        // leaves its graph unsealed. Seal and archive it before starting over.
        if let Some(dangling) = state.graph.as_mut() {
            if !dangling.is_sealed() {
                dangling.seal();
            }
        }
        if let Some(dangling) = &state.graph {
            state.archive.archive(dangling);
        }

        let initial_trust = classify_initial_trust(ctx);
        let turn_id = state.next_turn_id;
        state.next_turn_id += 1;

        let mut graph = ProvenanceGraph::new(ctx.session_key.clone(), turn_id);
        graph
            .record_context_assembled(event.system_prompt.len(), event.message_count, initial_trust, now_ms)
            .expect("fresh graph is never sealed");

        let watermark_entry = {
            let store = self.watermark.lock().await;
            store.get(&ctx.session_key)
        };

        let mut effective_taint = initial_trust;
        if let Some(entry) = &watermark_entry {
            if entry.floor < initial_trust {
                graph.record_inherited_taint(entry.floor, now_ms).expect("fresh graph is never sealed");
                effective_taint = entry.floor;
            }
        }

        tracing::info!(
            session = %ctx.session_key,
            initial_trust = initial_trust.display_name(),
            watermark = ?watermark_entry.as_ref().map(|w| w.floor.display_name()),
            effective_taint = effective_taint.display_name(),
            "Turn-Start"
        );

        state.graph = Some(graph);
        state.last_llm_node = None;
        state.blocked_tools.clear();
        state.current_iteration = 0;

        HookOutcome::Undefined
    }

    // -----------------------------------------------------------------------
    // E2 before_llm_call
    // -----------------------------------------------------------------------

    pub async fn before_llm_call(
        &self,
        session: &str,
        sender_is_owner: Option<bool>,
        event: &BeforeLlmCallEvent,
        now_ms: u64,
    ) -> HookOutcome {
        let handle = self.session_handle(session);
        let mut state = handle.lock().await;

        let llm_node = state
            .graph_mut()
            .record_llm_call(event.iteration, event.tools.len(), now_ms)
            .expect("hook fired before context_assembled started a turn");
        state.last_llm_node = Some(llm_node);
        state.current_iteration = event.iteration;

        // Older hosts may not report ownership at all; default to allowing,
        // since approval codes self-secure and .reset-trust is explicit.
        let is_owner = sender_is_owner.unwrap_or(true);
        if let Some(last_user_message) = event.messages.iter().rev().find(|m| m.role == "user") {
            if let Some(command) = parse_owner_command(&last_user_message.content) {
                if is_owner {
                    self.dispatch_owner_command(session, &mut state, command, now_ms).await;
                } else {
                    tracing::warn!(session, "non_owner_command: ignored owner-only command from non-owner sender");
                }
            }
        }

        let tool_names: Vec<String> = event.tools.iter().map(|t| t.name.clone()).collect();
        let turn_id = state.graph_mut().turn_id();

        let (policy_eval, folded) = {
            let graph = state.graph.as_ref().expect("turn started");
            evaluate_with_approvals(
                graph,
                &tool_names,
                &self.config.policy,
                self.config.defaults.max_iterations,
                &state.approvals,
                session,
                now_ms,
            )
        };

        if policy_eval.max_iterations_exceeded {
            tracing::warn!(session, max_iterations = self.config.defaults.max_iterations, "soft max-iterations warning");
        }

        if folded.block {
            return HookOutcome::Block {
                block_reason: folded.block_reason.unwrap_or_else(|| "blocked by policy".to_string()),
            };
        }

        for tool in &folded.tool_removals {
            if !state.is_blocked(tool) {
                state.blocked_tools.push(tool.clone());
            }
            let reason = folded
                .pending_confirmations
                .iter()
                .find(|(t, _)| t.eq_ignore_ascii_case(tool))
                .map(|(_, r)| r.clone())
                .unwrap_or_else(|| format!("restrict: taint too high for {tool}"));
            state
                .graph_mut()
                .record_blocked_tool(tool, &reason, event.iteration, now_ms)
                .expect("turn started");
        }

        if !folded.pending_confirmations.is_empty() {
            let pending_tools: Vec<String> =
                folded.pending_confirmations.iter().map(|(t, _)| t.clone()).collect();
            let code = state.approvals.add_pending_batch(
                session,
                turn_id,
                &pending_tools,
                self.config.defaults.approval_ttl_seconds,
                now_ms,
            );
            self.code_owners.lock().expect("code_owners mutex poisoned").insert(code.clone(), session.to_string());
            tracing::info!(
                session,
                code = %code,
                ttl_seconds = self.config.defaults.approval_ttl_seconds,
                tools = ?pending_tools,
                ".approve <tool> {code} [minutes]  or  .approve all {code} [minutes]"
            );
        }

        let filtered: Vec<String> = tool_names
            .into_iter()
            .filter(|t| !folded.tool_removals.iter().any(|r| r.eq_ignore_ascii_case(t)))
            .collect();

        if filtered.len() != event.tools.len() {
            HookOutcome::Tools { tools: filtered }
        } else {
            HookOutcome::Undefined
        }
    }

    async fn dispatch_owner_command(
        &self,
        session: &str,
        state: &mut SessionState,
        command: OwnerCommand,
        now_ms: u64,
    ) {
        match command {
            OwnerCommand::Approve { target, code, duration_minutes } => {
                let code_owner = self.code_owners.lock().expect("code_owners mutex poisoned").get(&code).cloned();
                match state.approvals.approve_with_code(
                    session,
                    &target,
                    &code,
                    duration_minutes,
                    now_ms,
                    code_owner.as_deref(),
                ) {
                    Ok(()) => {
                        self.code_owners.lock().expect("code_owners mutex poisoned").remove(&code);
                    }
                    Err(error) => {
                        tracing::warn!(session, %error, "invalid_approval_code");
                    }
                }
            }
            OwnerCommand::ResetTrust { level } => {
                state.graph_mut().reset_taint(level).expect("turn started, graph not yet sealed");
                state.blocked_tools.clear();
                state.approvals.clear_turn_scoped(session);
                let mut watermark = self.watermark.lock().await;
                watermark.clear(session);
                drop(watermark);
                if let Err(error) = self.flush_watermark().await {
                    tracing::warn!(session, %error, "watermark_io_error");
                }
            }
            OwnerCommand::InvalidResetTrust => {
                tracing::warn!(session, "invalid_trust_level: .reset-trust word did not match a known level, no reset performed");
            }
        }
    }

    // -----------------------------------------------------------------------
    // E3 before_tool_call (second enforcement layer)
    // -----------------------------------------------------------------------

    pub async fn before_tool_call(&self, session: &str, event: &BeforeToolCallEvent) -> HookOutcome {
        let handle = self.session_handle(session);
        let state = handle.lock().await;

        if state.is_blocked(&event.tool_name) {
            let code = state.approvals.get_current_code(session);
            let ttl = state.approvals.get_code_ttl_seconds(session);
            let block_reason = match (code, ttl) {
                (Some(code), Some(ttl)) => format!(
                    "{} is not yet approved. Ask the owner to send `.approve {} {} [minutes]` (expires in {}s).",
                    event.tool_name, event.tool_name, code, ttl
                ),
                _ => format!("{} is not yet approved.", event.tool_name),
            };
            return HookOutcome::Block { block_reason };
        }
        HookOutcome::Undefined
    }

    // -----------------------------------------------------------------------
    // E4 after_llm_call
    // -----------------------------------------------------------------------

    pub async fn after_llm_call(&self, session: &str, event: &AfterLlmCallEvent, now_ms: u64) -> HookOutcome {
        let handle = self.session_handle(session);
        let mut state = handle.lock().await;
        let parent = state.last_llm_node;

        for tool_call in &event.tool_calls {
            state
                .graph_mut()
                .record_tool_call(&tool_call.name, event.iteration, parent, &self.tool_trust_overrides, now_ms)
                .expect("turn started");
            let trust = tool_trust(&tool_call.name, &self.tool_trust_overrides);
            tracing::info!(session, tool = %tool_call.name, trust = trust.display_name(), "tool_call");
        }

        HookOutcome::Undefined
    }

    // -----------------------------------------------------------------------
    // loop_iteration_start / E5 loop_iteration_end
    // -----------------------------------------------------------------------

    pub async fn loop_iteration_start(&self, session: &str, event: &LoopIterationEvent) -> HookOutcome {
        let handle = self.session_handle(session);
        let mut state = handle.lock().await;
        state.current_iteration = event.iteration;
        HookOutcome::Undefined
    }

    pub async fn loop_iteration_end(&self, session: &str, event: &LoopIterationEvent) -> HookOutcome {
        let handle = self.session_handle(session);
        let mut state = handle.lock().await;
        state.current_iteration = event.iteration;
        tracing::debug!(
            session,
            iteration = event.iteration,
            tool_calls_made = event.tool_calls_made,
            will_continue = event.will_continue,
            "loop_iteration_end"
        );
        HookOutcome::Undefined
    }

    // -----------------------------------------------------------------------
    // E6 before_response_emit
    // -----------------------------------------------------------------------

    pub async fn before_response_emit(
        &self,
        session: &str,
        event: &BeforeResponseEmitEvent,
        now_ms: u64,
    ) -> HookOutcome {
        let handle = self.session_handle(session);
        let mut state = handle.lock().await;

        state.graph_mut().record_output(event.content.len(), now_ms).expect("turn started");
        state.approvals.clear_turn_scoped(session);

        let summary = state.graph_mut().seal();
        if let Some(graph) = &state.graph {
            state.archive.archive(graph);
        }

        // WatermarkStore::escalate already no-ops for Owner/System levels and
        // for non-worsening levels, so no guard is needed here.
        let reason = summary.external_sources.last().cloned().unwrap_or_else(|| "turn-taint".to_string());
        let escalated = {
            let mut watermark = self.watermark.lock().await;
            watermark.escalate(session, summary.max_taint, &reason, now_ms)
        };
        if escalated {
            if let Err(error) = self.flush_watermark().await {
                tracing::warn!(session, %error, "watermark_io_error");
            }
        }

        state.blocked_tools.clear();

        if self.config.defaults.developer_mode {
            let content = format!("[taint:{}]\n{}", summary.max_taint.display_name(), event.content);
            HookOutcome::Content { content }
        } else {
            HookOutcome::Undefined
        }
    }

    /// Flush the shared watermark file off the async runtime thread.
    async fn flush_watermark(&self) -> Result<(), DriverError> {
        let watermark = Arc::clone(&self.watermark);
        tokio::task::spawn_blocking(move || {
            let store = watermark.blocking_lock();
            store.backend().flush()
        })
        .await
        .expect("flush task panicked")
        .map_err(DriverError::from)
    }
}
