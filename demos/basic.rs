// SPDX-License-Identifier: Apache-2.0

//! # Basic Enforcement Driver Walkthrough
//!
//! Demonstrates wiring [`provenance_driver::EnforcementDriver`] into a host
//! agent loop: an owner turn that calls `web_fetch`, which taints the turn
//! and gates `exec` behind an approval code, followed by the owner approving
//! it by name.
//!
//! This file illustrates the wiring; it is not built as part of the
//! workspace (no host runtime lives here to drive it against).

use provenance_core::config::ProvenanceConfig;
use provenance_core::types::AgentContext;
use provenance_driver::events::{
    AfterLlmCallEvent, BeforeLlmCallEvent, BeforeResponseEmitEvent, BeforeToolCallEvent,
    ContextAssembledEvent, HostMessage, HostTool, HostToolCall,
};
use provenance_driver::{EnforcementDriver, HookOutcome};
use provenance_std::FileWatermarkBackend;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let backend = FileWatermarkBackend::open("/tmp/provenance-demo-watermarks.json")
        .expect("could not open watermark file");
    let driver = EnforcementDriver::new(ProvenanceConfig::default(), backend, Vec::new());
    driver.on_startup(true);

    let ctx = AgentContext {
        session_key: "demo-session".to_string(),
        message_provider: Some("chat".to_string()),
        sender_is_owner: Some(true),
        ..Default::default()
    };

    driver
        .context_assembled(
            &ctx,
            &ContextAssembledEvent { system_prompt: "You are a helpful agent.".into(), message_count: 1 },
            0,
        )
        .await;

    // Iteration 1: the model wants to fetch a web page. web_fetch is a safe
    // tool, so it is always allowed — but its output is untrusted.
    let outcome = driver
        .before_llm_call(
            "demo-session",
            Some(true),
            &BeforeLlmCallEvent { iteration: 1, tools: vec![HostTool { name: "web_fetch".into() }], messages: vec![] },
            0,
        )
        .await;
    println!("before_llm_call #1: {outcome:?}");

    driver
        .after_llm_call(
            "demo-session",
            &AfterLlmCallEvent { iteration: 1, tool_calls: vec![HostToolCall { name: "web_fetch".into() }] },
            0,
        )
        .await;

    // Iteration 2: the model now wants to call exec. The turn is tainted by
    // the web fetch, so exec needs owner approval first.
    let outcome = driver
        .before_llm_call(
            "demo-session",
            Some(true),
            &BeforeLlmCallEvent {
                iteration: 2,
                tools: vec![HostTool { name: "exec".into() }, HostTool { name: "read".into() }],
                messages: vec![],
            },
            0,
        )
        .await;
    println!("before_llm_call #2 (exec gated): {outcome:?}");

    let gate = driver.before_tool_call("demo-session", &BeforeToolCallEvent { tool_name: "exec".into() }).await;
    let code = match &gate {
        HookOutcome::Block { block_reason } => {
            println!("exec blocked: {block_reason}");
            block_reason
                .split_whitespace()
                .find(|w| w.len() == 8 && w.chars().all(|c| c.is_ascii_hexdigit()))
                .expect("block reason carries an approval code")
                .to_string()
        }
        other => panic!("expected exec to be blocked, got {other:?}"),
    };

    // The owner sends the approval command in their next message.
    let approve_message = format!(".approve exec {code} 5");
    let outcome = driver
        .before_llm_call(
            "demo-session",
            Some(true),
            &BeforeLlmCallEvent {
                iteration: 3,
                tools: vec![HostTool { name: "exec".into() }],
                messages: vec![HostMessage { role: "user".into(), content: approve_message }],
            },
            0,
        )
        .await;
    println!("before_llm_call #3 (after approval): {outcome:?}");

    driver.before_response_emit("demo-session", &BeforeResponseEmitEvent { content: "Done.".into() }, 0).await;
}
