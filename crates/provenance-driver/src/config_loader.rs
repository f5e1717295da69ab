// SPDX-License-Identifier: Apache-2.0

//! Driver-facing configuration loader, layering the four precedence tiers:
//! built-in defaults, an optional nested policy TOML file, a flat config
//! file or `PROVENANCE_`-prefixed environment variables (env wins over the
//! file), and finally whatever the caller overrides programmatically on the
//! returned [`DriverConfig`] before constructing an `EnforcementDriver`.
//!
//! The scalar/TOML parsing itself is `provenance-core`'s own
//! `config_loader` module; this one only adds the env-wins-over-file merge
//! and bundles the result into the shape the driver actually consumes.

use provenance_core::config::ProvenanceConfig;
use provenance_core::config_loader::{load_config, load_policy_toml, ConfigError, FlatConfig};
use provenance_core::types::{DriverDefaults, TrustLevel};

/// Everything needed to construct an [`crate::driver::EnforcementDriver`]:
/// the merged policy + scalar config, tool-trust table overrides, and the
/// workspace directory (if any) the watermark file should live under.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub provenance: ProvenanceConfig,
    pub tool_trust_overrides: Vec<(String, TrustLevel)>,
    pub workspace_dir: Option<String>,
}

/// Load and layer the full driver configuration.
///
/// `flat_config_path` and `policy_toml_path` are both optional — either or
/// both may be omitted, in which case that tier contributes only its
/// built-in defaults.
pub fn load_driver_config(
    flat_config_path: Option<&str>,
    policy_toml_path: Option<&str>,
) -> Result<DriverConfig, ConfigError> {
    let flat = match flat_config_path {
        Some(path) => load_config(path)?,
        None => FlatConfig::default(),
    };
    let flat = apply_env_overrides(flat)?;
    let workspace_dir = flat.workspace_dir.clone();

    let (taint_policy, tool_overrides, tool_trust_overrides) = match policy_toml_path {
        Some(path) => load_policy_toml(path)?.into_parts(),
        None => (Vec::new(), Vec::new(), Vec::new()),
    };

    let defaults: DriverDefaults = flat.into();
    let provenance = ProvenanceConfig::build(&taint_policy, &tool_overrides, defaults);

    Ok(DriverConfig { provenance, tool_trust_overrides, workspace_dir })
}

/// Overlay any `PROVENANCE_*` environment variable that is actually set on
/// top of `base`, leaving fields with no corresponding variable untouched —
/// unlike `provenance_core::config_loader::load_config_from_env`, which
/// always returns a fully-defaulted struct and so can't be layered this way.
fn apply_env_overrides(mut base: FlatConfig) -> Result<FlatConfig, ConfigError> {
    if let Ok(value) = std::env::var("PROVENANCE_APPROVAL_TTL_SECONDS") {
        base.approval_ttl_seconds = parse_u64("PROVENANCE_APPROVAL_TTL_SECONDS", &value)?;
    }
    if let Ok(value) = std::env::var("PROVENANCE_MAX_ITERATIONS") {
        base.max_iterations = parse_u64("PROVENANCE_MAX_ITERATIONS", &value)?;
    }
    if let Ok(value) = std::env::var("PROVENANCE_MAX_COMPLETED_GRAPHS") {
        base.max_completed_graphs = parse_u64("PROVENANCE_MAX_COMPLETED_GRAPHS", &value)? as usize;
    }
    if let Ok(value) = std::env::var("PROVENANCE_DEVELOPER_MODE") {
        base.developer_mode = parse_bool("PROVENANCE_DEVELOPER_MODE", &value)?;
    }
    if let Ok(value) = std::env::var("PROVENANCE_VERBOSE") {
        base.verbose = parse_bool("PROVENANCE_VERBOSE", &value)?;
    }
    if let Ok(value) = std::env::var("PROVENANCE_WORKSPACE_DIR") {
        base.workspace_dir = Some(value);
    }
    Ok(base)
}

fn parse_u64(field: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|source| ConfigError::ParseField {
        field: field.to_string(),
        value: value.to_string(),
        reason: source.to_string(),
    })
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::ParseField {
            field: field.to_string(),
            value: other.to_string(),
            reason: "expected one of: true/false, 1/0, yes/no, on/off".to_string(),
        }),
    }
}
