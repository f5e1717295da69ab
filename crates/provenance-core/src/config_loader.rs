// SPDX-License-Identifier: Apache-2.0

//! Layered configuration loading: flat scalar knobs from a TOML file or
//! `PROVENANCE_`-prefixed environment variables, plus an optional second
//! TOML document for the nested taint-policy / tool-override tables that
//! don't fit flat env-var scalars.
//!
//! Only compiled when the `config-loader` feature is enabled (implies
//! `std`).

#![cfg(feature = "config-loader")]

use std::fmt;
use std::fs;
use std::num::{ParseFloatError, ParseIntError};

use serde::{Deserialize, Serialize};

use crate::types::{DriverDefaults, PolicyMode, PolicyTrust, ToolOverride, ToolOverrideKey, TrustLevel};

// ---------------------------------------------------------------------------
// FlatConfig — scalar driver knobs
// ---------------------------------------------------------------------------

/// Flat scalar configuration, loadable from a TOML file or environment
/// variables without coupling to the policy engine's internal
/// representation. Mirrors spec's configuration table (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatConfig {
    #[serde(default = "default_approval_ttl_seconds")]
    pub approval_ttl_seconds: u64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u64,
    #[serde(default = "default_max_completed_graphs")]
    pub max_completed_graphs: usize,
    #[serde(default)]
    pub developer_mode: bool,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub workspace_dir: Option<String>,
}

fn default_approval_ttl_seconds() -> u64 { 60 }
fn default_max_iterations() -> u64 { 10 }
fn default_max_completed_graphs() -> usize { 100 }

impl Default for FlatConfig {
    fn default() -> Self {
        FlatConfig {
            approval_ttl_seconds: default_approval_ttl_seconds(),
            max_iterations: default_max_iterations(),
            max_completed_graphs: default_max_completed_graphs(),
            developer_mode: false,
            verbose: false,
            workspace_dir: None,
        }
    }
}

impl From<FlatConfig> for DriverDefaults {
    fn from(flat: FlatConfig) -> Self {
        DriverDefaults {
            approval_ttl_seconds: flat.approval_ttl_seconds,
            max_iterations: flat.max_iterations,
            max_completed_graphs: flat.max_completed_graphs,
            developer_mode: flat.developer_mode,
            verbose: flat.verbose,
        }
    }
}

// ---------------------------------------------------------------------------
// PolicyToml — nested taintPolicy / toolOverrides / toolTrustOverrides
// ---------------------------------------------------------------------------

/// Deserialised shape of the nested policy TOML document.
///
/// ```toml
/// [taint_policy]
/// untrusted = "restrict"
/// shared    = "confirm"
///
/// [[tool_overrides]]
/// tool_name = "gateway"
/// [tool_overrides.levels]
/// "*"     = "confirm"
/// trusted = "allow"
///
/// [[tool_trust_overrides]]
/// tool_name = "exec"
/// level     = "local"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyToml {
    #[serde(default)]
    pub taint_policy: std::collections::BTreeMap<String, ModeToml>,
    #[serde(default)]
    pub tool_overrides: Vec<ToolOverrideToml>,
    #[serde(default)]
    pub tool_trust_overrides: Vec<ToolTrustOverrideToml>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeToml {
    Allow,
    Confirm,
    Restrict,
}

impl From<ModeToml> for PolicyMode {
    fn from(m: ModeToml) -> Self {
        match m {
            ModeToml::Allow => PolicyMode::Allow,
            ModeToml::Confirm => PolicyMode::Confirm,
            ModeToml::Restrict => PolicyMode::Restrict,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolOverrideToml {
    pub tool_name: String,
    #[serde(default)]
    pub levels: std::collections::BTreeMap<String, ModeToml>,
}

fn parse_tool_override_key(key: &str) -> Option<ToolOverrideKey> {
    if key == "*" {
        return Some(ToolOverrideKey::Wildcard);
    }
    match key.to_ascii_lowercase().as_str() {
        "untrusted" => Some(ToolOverrideKey::Level(PolicyTrust::Untrusted)),
        "external" => Some(ToolOverrideKey::Level(PolicyTrust::External)),
        "shared" => Some(ToolOverrideKey::Level(PolicyTrust::Shared)),
        "trusted" => Some(ToolOverrideKey::Level(PolicyTrust::Trusted)),
        _ => None,
    }
}

impl From<ToolOverrideToml> for ToolOverride {
    fn from(t: ToolOverrideToml) -> Self {
        let levels = t
            .levels
            .into_iter()
            .filter_map(|(key, mode)| parse_tool_override_key(&key).map(|k| (k, mode.into())))
            .collect();
        ToolOverride { tool_name: t.tool_name, levels }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolTrustOverrideToml {
    pub tool_name: String,
    pub level: TrustLevelToml,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevelToml {
    System,
    Owner,
    Local,
    Shared,
    External,
    Untrusted,
}

impl From<TrustLevelToml> for TrustLevel {
    fn from(t: TrustLevelToml) -> Self {
        match t {
            TrustLevelToml::System => TrustLevel::System,
            TrustLevelToml::Owner => TrustLevel::Owner,
            TrustLevelToml::Local => TrustLevel::Local,
            TrustLevelToml::Shared => TrustLevel::Shared,
            TrustLevelToml::External => TrustLevel::External,
            TrustLevelToml::Untrusted => TrustLevel::Untrusted,
        }
    }
}

fn parse_legacy_or_policy_key(key: &str) -> Option<crate::policy::TaintPolicyKey> {
    use crate::policy::TaintPolicyKey;
    use crate::types::PolicyTrust;
    match key.to_ascii_lowercase().as_str() {
        "untrusted" => Some(TaintPolicyKey::Policy(PolicyTrust::Untrusted)),
        "external" => Some(TaintPolicyKey::Policy(PolicyTrust::External)),
        "shared" => Some(TaintPolicyKey::Policy(PolicyTrust::Shared)),
        "trusted" => Some(TaintPolicyKey::Policy(PolicyTrust::Trusted)),
        "system" => Some(TaintPolicyKey::Legacy(TrustLevel::System)),
        "owner" => Some(TaintPolicyKey::Legacy(TrustLevel::Owner)),
        "local" => Some(TaintPolicyKey::Legacy(TrustLevel::Local)),
        _ => None,
    }
}

impl PolicyToml {
    /// Convert into the `(taint_policy, tool_overrides)` pair accepted by
    /// [`crate::policy::build_policy_config`], plus the separate tool-trust
    /// override list used by `lattice::tool_trust`.
    pub fn into_parts(
        self,
    ) -> (Vec<(crate::policy::TaintPolicyKey, PolicyMode)>, Vec<ToolOverride>, Vec<(String, TrustLevel)>) {
        let taint_policy = self
            .taint_policy
            .into_iter()
            .filter_map(|(key, mode)| parse_legacy_or_policy_key(&key).map(|k| (k, mode.into())))
            .collect();
        let tool_overrides = self.tool_overrides.into_iter().map(Into::into).collect();
        let tool_trust_overrides = self
            .tool_trust_overrides
            .into_iter()
            .map(|t| (t.tool_name, t.level.into()))
            .collect();
        (taint_policy, tool_overrides, tool_trust_overrides)
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    FileRead { path: String, source: std::io::Error },
    TomlParse { source: toml::de::Error },
    ParseField { field: String, value: String, reason: String },
    InvalidRange { field: String, value: String, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileRead { path, source } => write!(f, "failed to read config file \"{path}\": {source}"),
            ConfigError::TomlParse { source } => write!(f, "failed to parse TOML config: {source}"),
            ConfigError::ParseField { field, value, reason } => {
                write!(f, "field \"{field}\": cannot parse \"{value}\" — {reason}")
            }
            ConfigError::InvalidRange { field, value, reason } => {
                write!(f, "field \"{field}\": value \"{value}\" out of range — {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::FileRead { source, .. } => Some(source),
            ConfigError::TomlParse { source } => Some(source),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loaders
// ---------------------------------------------------------------------------

/// Load the flat scalar config from a TOML file.
pub fn load_config(path: &str) -> Result<FlatConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::FileRead { path: path.to_owned(), source })?;
    toml::from_str::<FlatConfig>(&content).map_err(|source| ConfigError::TomlParse { source })
}

/// Load the nested policy document from a TOML file.
pub fn load_policy_toml(path: &str) -> Result<PolicyToml, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::FileRead { path: path.to_owned(), source })?;
    toml::from_str::<PolicyToml>(&content).map_err(|source| ConfigError::TomlParse { source })
}

/// Load the flat scalar config from `PROVENANCE_`-prefixed environment
/// variables, falling back to defaults for anything unset.
pub fn load_config_from_env() -> Result<FlatConfig, ConfigError> {
    let approval_ttl_seconds = read_env_u64("PROVENANCE_APPROVAL_TTL_SECONDS", default_approval_ttl_seconds())?;
    let max_iterations = read_env_u64("PROVENANCE_MAX_ITERATIONS", default_max_iterations())?;
    let max_completed_graphs =
        read_env_u64("PROVENANCE_MAX_COMPLETED_GRAPHS", default_max_completed_graphs() as u64)? as usize;
    let developer_mode = read_env_bool("PROVENANCE_DEVELOPER_MODE", false)?;
    let verbose = read_env_bool("PROVENANCE_VERBOSE", false)?;
    let workspace_dir = std::env::var("PROVENANCE_WORKSPACE_DIR").ok();

    Ok(FlatConfig { approval_ttl_seconds, max_iterations, max_completed_graphs, developer_mode, verbose, workspace_dir })
}

fn read_env_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<u64>()
            .map_err(|source: ParseIntError| ConfigError::ParseField { field: key.to_owned(), value: val, reason: source.to_string() }),
        Err(_) => Ok(default),
    }
}

#[allow(dead_code)]
fn read_env_f64(key: &str, default: f64) -> Result<f64, ConfigError> {
    match std::env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<f64>()
            .map_err(|source: ParseFloatError| ConfigError::ParseField { field: key.to_owned(), value: val, reason: source.to_string() }),
        Err(_) => Ok(default),
    }
}

fn read_env_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            other => Err(ConfigError::ParseField {
                field: key.to_owned(),
                value: other.to_owned(),
                reason: "expected one of: true/false, 1/0, yes/no, on/off".into(),
            }),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_config_defaults_match_spec() {
        let config = FlatConfig::default();
        assert_eq!(config.approval_ttl_seconds, 60);
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.max_completed_graphs, 100);
    }

    #[test]
    fn policy_toml_parses_nested_tables() {
        let toml_src = r#"
            [taint_policy]
            untrusted = "restrict"

            [[tool_overrides]]
            tool_name = "gateway"
            [tool_overrides.levels]
            "*" = "confirm"
            trusted = "allow"
        "#;
        let parsed: PolicyToml = toml::from_str(toml_src).unwrap();
        assert_eq!(parsed.taint_policy.len(), 1);
        assert_eq!(parsed.tool_overrides.len(), 1);
        assert_eq!(parsed.tool_overrides[0].levels.len(), 2);
    }
}
