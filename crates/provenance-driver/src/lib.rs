// SPDX-License-Identifier: Apache-2.0

//! # provenance-driver
//!
//! Async enforcement driver wiring [`provenance_core`] to a host agent
//! runtime's seven lifecycle hooks (`context_assembled`, `before_llm_call`,
//! `after_llm_call`, `before_tool_call`, `loop_iteration_start`/`_end`,
//! `before_response_emit`, `startup`).
//!
//! Per-session state — the in-flight provenance graph, the sealed-graph
//! archive, and the approval store — lives behind [`driver::EnforcementDriver`]'s
//! session registry; only the watermark file is shared across sessions.

pub mod commands;
pub mod driver;
pub mod error;
pub mod events;

#[cfg(feature = "config-loader")]
pub mod config_loader;

pub use driver::EnforcementDriver;
pub use error::DriverError;
pub use events::{
    AfterLlmCallEvent, BeforeLlmCallEvent, BeforeResponseEmitEvent, BeforeToolCallEvent,
    ContextAssembledEvent, HookOutcome, HostMessage, HostTool, HostToolCall, LoopIterationEvent,
};

#[cfg(feature = "config-loader")]
pub use config_loader::{load_driver_config, DriverConfig};
