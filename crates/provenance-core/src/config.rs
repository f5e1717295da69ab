// SPDX-License-Identifier: Apache-2.0

//! Top-level configuration bundle for the provenance core.
//!
//! [`ProvenanceConfig`] is the single entry point for tuning policy and
//! driver scalars together at construction time; `Config::default()` is
//! always a valid, fully-specified configuration.

use alloc::string::String;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::policy::{build_policy_config, TaintPolicyKey};
use crate::types::{DriverDefaults, PolicyConfig, PolicyMode, ToolOverride};

/// Combined policy + driver configuration, and the warnings produced while
/// building it (forwarded from `validate_monotonicity`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceConfig {
    pub policy: PolicyConfig,
    pub defaults: DriverDefaults,
    #[serde(skip)]
    pub warnings: Vec<String>,
}

impl Default for ProvenanceConfig {
    fn default() -> Self {
        let (policy, warnings) = build_policy_config(&[], &[]);
        ProvenanceConfig { policy, defaults: DriverDefaults::default(), warnings }
    }
}

impl ProvenanceConfig {
    /// Build from user-supplied taint-policy entries and tool overrides,
    /// layered on top of the built-in defaults.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use provenance_core::config::ProvenanceConfig;
    ///
    /// let config = ProvenanceConfig::build(&[], &[], Default::default());
    /// assert!(config.warnings.is_empty());
    /// ```
    pub fn build(
        user_taint_policy: &[(TaintPolicyKey, PolicyMode)],
        user_tool_overrides: &[ToolOverride],
        defaults: DriverDefaults,
    ) -> Self {
        let (policy, warnings) = build_policy_config(user_taint_policy, user_tool_overrides);
        ProvenanceConfig { policy, defaults, warnings }
    }
}
