// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Conductor main entry point - CLI and commands.

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tokio::process::Command;

use conductor::config::{self, CliOptions, ResolvedConfig};
use conductor::rpc::{spawn_stdio, RpcChannel};
use conductor::telemetry::{init_telemetry, TelemetryConfig};

/// Conductor - agent orchestration core.
#[derive(Parser)]
#[command(name = "conductor")]
#[command(author, version, about = "Agent orchestration core", long_about = None)]
struct Cli {
    /// Override the supervisor's concurrent task limit
    #[arg(long, env = "CONDUCTOR_MAX_CONCURRENT")]
    max_concurrent: Option<usize>,

    /// Override the default gate limit
    #[arg(long, env = "CONDUCTOR_GATE_LIMIT")]
    gate_limit: Option<usize>,

    /// Override the default RPC request timeout in milliseconds
    #[arg(long, env = "CONDUCTOR_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Show debug output
    #[arg(short = 'v', long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Subcommands for conductor.
#[derive(Subcommand)]
enum Commands {
    /// Send one request to a stdio tool server and print the result
    Call {
        /// Method to invoke, e.g. tools/list
        method: String,

        /// Request params as JSON
        #[arg(short, long)]
        params: Option<String>,

        /// Notification to send before the request, e.g. initialized
        #[arg(long)]
        notify: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Tool server command line (defaults to `toolServer` from config)
        #[arg(last = true)]
        server: Vec<String>,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Show version information
    Version,
}

/// Config subcommand actions.
#[derive(Subcommand)]
enum ConfigAction {
    /// Show the resolved configuration
    Show,
    /// List the config files that would be read
    Paths,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _telemetry = init_telemetry(&TelemetryConfig::cli(cli.verbose))?;

    let cli_options = CliOptions {
        max_concurrent: cli.max_concurrent,
        gate_limit: cli.gate_limit,
        timeout_ms: cli.timeout_ms,
        rpc_name: None,
    };

    match cli.command {
        Commands::Call {
            method,
            params,
            notify,
            format,
            server,
        } => {
            let workspace_root = std::env::current_dir()?;
            let config = config::load_config(&workspace_root, cli_options)?;
            handle_call(&config, &method, params, notify, server, format).await
        }
        Commands::Config { action } => handle_config(action, cli_options),
        Commands::Version => {
            println!("conductor {}", conductor::VERSION);
            Ok(())
        }
    }
}

fn handle_config(action: Option<ConfigAction>, cli_options: CliOptions) -> anyhow::Result<()> {
    let workspace_root = std::env::current_dir()?;
    match action {
        Some(ConfigAction::Show) | None => {
            let config = config::load_config(&workspace_root, cli_options)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Some(ConfigAction::Paths) => {
            let mark = |path: &std::path::Path| {
                if path.exists() {
                    "✓".green()
                } else {
                    "·".dimmed()
                }
            };
            if let Some(global) = config::get_global_config_path() {
                println!("{} {}", mark(&global), global.display());
            }
            for name in config::CONFIG_FILES {
                let path = workspace_root.join(name);
                println!("{} {}", mark(&path), path.display());
            }
            let local = workspace_root.join(config::LOCAL_CONFIG_FILE);
            println!("{} {}", mark(&local), local.display());
        }
    }
    Ok(())
}

async fn handle_call(
    config: &ResolvedConfig,
    method: &str,
    params: Option<String>,
    notify: Option<String>,
    server: Vec<String>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let params = params
        .map(|p| serde_json::from_str(&p))
        .transpose()
        .context("--params is not valid JSON")?;

    let mut command = match server.split_first() {
        Some((program, args)) => {
            let mut command = Command::new(program);
            command.args(args);
            command
        }
        None => {
            let Some(ref tool_server) = config.tool_server else {
                anyhow::bail!("No tool server given after `--` and no `toolServer` configured");
            };
            let mut command = Command::new(&tool_server.command);
            command.args(&tool_server.args).envs(&tool_server.env);
            command
        }
    };
    command.kill_on_drop(true);

    let mut child = spawn_stdio(command)?;
    let channel = RpcChannel::from_child(&mut child, config.rpc.clone())?;

    if let Some(ref notification) = notify {
        channel.notify(notification, None);
    }
    let result = channel
        .request(method, params, Some(Duration::from_millis(config.rpc.default_timeout_ms)))
        .await;

    channel.destroy();
    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "Tool server already exited");
    }

    match (result, format) {
        (Ok(value), OutputFormat::Json) => {
            let response = serde_json::json!({ "success": true, "result": value });
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        (Ok(value), OutputFormat::Text) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        (Err(e), OutputFormat::Json) => {
            let response = serde_json::json!({
                "success": false,
                "error": e.to_string(),
                "code": e.code(),
            });
            println!("{}", serde_json::to_string_pretty(&response)?);
            std::process::exit(1);
        }
        (Err(e), OutputFormat::Text) => {
            eprintln!("{} {}", "✗".red(), format!("{} failed: {}", method, e).red());
            std::process::exit(1);
        }
    }

    Ok(())
}
