// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use tracing::warn;

use crate::error::ConfigError;

use super::types::{ConductorConfig, ResolvedConfig};

/// CLI options that can override configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub max_concurrent: Option<usize>,
    pub gate_limit: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub rpc_name: Option<String>,
}

/// Default configuration values.
pub fn default_config() -> ResolvedConfig {
    ResolvedConfig::default()
}

/// Merge multiple configurations with precedence.
///
/// Precedence (highest to lowest):
/// 1. CLI options
/// 2. Local config (.conductor.local.json)
/// 3. Workspace config (.conductor.json)
/// 4. Global config (~/.conductor/config.json)
/// 5. Default values
pub fn merge_config(
    global: Option<ConductorConfig>,
    workspace: Option<ConductorConfig>,
    local: Option<ConductorConfig>,
    cli: CliOptions,
) -> ResolvedConfig {
    let mut result = default_config();

    for config in [global, workspace, local].into_iter().flatten() {
        apply_file_config(&mut result, &config);
    }

    apply_cli_options(&mut result, &cli);

    result
}

fn apply_file_config(result: &mut ResolvedConfig, config: &ConductorConfig) {
    if let Some(ref gate) = config.gate {
        if let Some(limit) = gate.default_limit {
            result.gate.default_limit = limit;
        }
        if let Some(ref limits) = gate.limits {
            result.gate.limits.extend(limits.clone());
        }
    }

    if let Some(ref supervisor) = config.supervisor {
        if let Some(max) = supervisor.max_concurrent {
            result.supervisor.max_concurrent = max;
        }
        if let Some(ref bucket) = supervisor.bucket {
            result.supervisor.bucket = bucket.clone();
        }
        if let Some(keying) = supervisor.keying {
            result.supervisor.keying = keying;
        }
        if let Some(ref limits) = supervisor.gate_limits {
            result.supervisor.gate_limits.extend(limits.clone());
        }
    }

    if let Some(ref rpc) = config.rpc {
        if let Some(ref name) = rpc.name {
            result.rpc.name = name.clone();
        }
        if let Some(timeout) = rpc.default_timeout_ms {
            result.rpc.default_timeout_ms = timeout;
        }
    }

    if let Some(ref hooks) = config.hooks {
        if let Some(ref disabled) = hooks.disabled {
            for name in disabled {
                if !result.hooks.disabled.contains(name) {
                    result.hooks.disabled.push(name.clone());
                }
            }
        }
    }

    if config.tool_server.is_some() {
        result.tool_server = config.tool_server.clone();
    }
}

fn apply_cli_options(result: &mut ResolvedConfig, cli: &CliOptions) {
    if let Some(max) = cli.max_concurrent {
        result.supervisor.max_concurrent = max;
    }

    if let Some(limit) = cli.gate_limit {
        result.gate.default_limit = limit;
    }

    if let Some(timeout) = cli.timeout_ms {
        result.rpc.default_timeout_ms = timeout;
    }

    if let Some(ref name) = cli.rpc_name {
        result.rpc.name = name.clone();
    }
}

/// Reject settings that can never work.
///
/// A zero gate limit is allowed (the key is simply never admitted) but
/// logged, since it is almost always a mistake.
pub fn validate_config(config: &ResolvedConfig) -> Result<(), ConfigError> {
    if config.rpc.default_timeout_ms == 0 {
        return Err(ConfigError::InvalidValue {
            field: "rpc.defaultTimeoutMs".to_string(),
            message: "must be greater than 0".to_string(),
        });
    }

    if config.supervisor.max_concurrent == 0 {
        return Err(ConfigError::InvalidValue {
            field: "supervisor.maxConcurrent".to_string(),
            message: "must be greater than 0, or no task would ever run".to_string(),
        });
    }

    if let Some(ref server) = config.tool_server {
        if server.command.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "toolServer.command".to_string(),
                message: "must not be empty".to_string(),
            });
        }
    }

    if config.gate.default_limit == 0 {
        warn!("gate.defaultLimit is 0; keys without an override will never be admitted");
    }
    for (key, limit) in config
        .gate
        .limits
        .iter()
        .chain(config.supervisor.gate_limits.iter())
    {
        if *limit == 0 {
            warn!(key = %key, "Gate limit is 0; this key will never be admitted");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{
        GateConfigPartial, HooksConfigPartial, RpcConfigPartial, SupervisorConfigPartial,
    };
    use crate::supervisor::GateKeying;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = default_config();
        assert_eq!(config.gate.default_limit, 5);
        assert_eq!(config.supervisor.max_concurrent, 3);
        assert_eq!(config.supervisor.bucket, "background");
        assert_eq!(config.rpc.default_timeout_ms, 30_000);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_merge_config_precedence() {
        let global = ConductorConfig {
            rpc: Some(RpcConfigPartial {
                name: Some("global".to_string()),
                default_timeout_ms: Some(1000),
            }),
            ..Default::default()
        };

        let workspace = ConductorConfig {
            rpc: Some(RpcConfigPartial {
                default_timeout_ms: Some(2000),
                ..Default::default()
            }),
            ..Default::default()
        };

        let local = ConductorConfig {
            supervisor: Some(SupervisorConfigPartial {
                max_concurrent: Some(8),
                keying: Some(GateKeying::Provider),
                ..Default::default()
            }),
            ..Default::default()
        };

        let cli = CliOptions {
            max_concurrent: Some(2),
            ..Default::default()
        };

        let result = merge_config(Some(global), Some(workspace), Some(local), cli);

        assert_eq!(result.rpc.name, "global");
        assert_eq!(result.rpc.default_timeout_ms, 2000);
        assert_eq!(result.supervisor.keying, GateKeying::Provider);
        // CLI wins
        assert_eq!(result.supervisor.max_concurrent, 2);
    }

    #[test]
    fn test_limits_merge_key_by_key() {
        let global = ConductorConfig {
            gate: Some(GateConfigPartial {
                default_limit: None,
                limits: Some(HashMap::from([
                    ("anthropic".to_string(), 4),
                    ("ollama".to_string(), 1),
                ])),
            }),
            ..Default::default()
        };
        let workspace = ConductorConfig {
            gate: Some(GateConfigPartial {
                default_limit: Some(2),
                limits: Some(HashMap::from([("anthropic".to_string(), 6)])),
            }),
            ..Default::default()
        };

        let result = merge_config(Some(global), Some(workspace), None, CliOptions::default());
        assert_eq!(result.gate.default_limit, 2);
        assert_eq!(result.gate.limit_for("anthropic"), 6);
        assert_eq!(result.gate.limit_for("ollama"), 1);
        assert_eq!(result.gate.limit_for("other"), 2);
    }

    #[test]
    fn test_disabled_hooks_accumulate() {
        let hooks = |names: &[&str]| ConductorConfig {
            hooks: Some(HooksConfigPartial {
                disabled: Some(names.iter().map(|s| s.to_string()).collect()),
            }),
            ..Default::default()
        };

        let result = merge_config(
            Some(hooks(&["audit"])),
            Some(hooks(&["audit", "lint"])),
            None,
            CliOptions::default(),
        );
        assert_eq!(result.hooks.disabled, vec!["audit", "lint"]);
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let result = merge_config(
            None,
            None,
            None,
            CliOptions {
                timeout_ms: Some(0),
                ..Default::default()
            },
        );
        let err = validate_config(&result).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "rpc.defaultTimeoutMs"));
    }

    #[test]
    fn test_validate_allows_zero_gate_limit() {
        let mut config = default_config();
        config.gate.limits.insert("disabled-provider".to_string(), 0);
        assert!(validate_config(&config).is_ok());
    }
}
