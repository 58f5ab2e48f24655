//! # Permission Check CLI
//!
//! Loads an authorization config and evaluates a claim set against a policy
//! or a protected operation, printing the decision as JSON.
//!
//! ## Usage
//!
//! ```text
//! permission-check --config authz.toml check --policy orders.read \
//!     --claim DynamicPermission=orders.read --claim role=Admin
//! permission-check --config authz.toml operation --name "GET /orders" --claim ...
//! permission-check --config authz.toml policies
//! ```
//!
//! Exit code is 0 when allowed, 2 when denied and 1 on error. `--metrics`
//! prints Prometheus text to stderr after a decision.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cretoai_permission::{AuthzConfig, Authorizer, Claim, ClaimSet, Policy};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

const ALLOWED_EXIT_CODE: u8 = 0;

/// Exit code for a denied decision
const DENIED_EXIT_CODE: u8 = 2;

/// Exit code when the command could not produce a decision
const ERROR_EXIT_CODE: u8 = 1;

#[derive(Parser)]
#[command(name = "permission-check")]
#[command(about = "Evaluate dynamic permission policies against a claim set")]
#[command(version)]
struct Cli {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long, env = "PERMISSION_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print Prometheus metrics to stderr after the decision
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a policy by name
    Check {
        /// Policy or permission name
        #[arg(short, long)]
        policy: String,

        /// Caller claim as type=value (repeatable)
        #[arg(long = "claim")]
        claims: Vec<Claim>,
    },

    /// Evaluate a registered protected operation
    Operation {
        /// Operation name
        #[arg(short, long)]
        name: String,

        /// Caller claim as type=value (repeatable)
        #[arg(long = "claim")]
        claims: Vec<Claim>,
    },

    /// List static policies and protected operations
    Policies,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(ERROR_EXIT_CODE)
        }
    }
}

/// Execute the command, returning the process exit code
async fn run(cli: Cli) -> Result<u8> {
    let config = match &cli.config {
        Some(path) => AuthzConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AuthzConfig::default(),
    };

    match cli.command {
        Command::Check { policy, claims } => {
            let authorizer = Authorizer::from_config(&config).context("Failed to build authorizer")?;
            let claims: ClaimSet = claims.into_iter().collect();
            let decision = authorizer
                .authorize(&policy, &claims)
                .await
                .with_context(|| format!("Failed to authorize policy '{}'", policy))?;

            println!("{}", serde_json::to_string_pretty(&decision)?);
            print_metrics(&authorizer, cli.metrics).await;
            Ok(exit_code(decision.allowed))
        }
        Command::Operation { name, claims } => {
            let authorizer = Authorizer::from_config(&config).context("Failed to build authorizer")?;
            let claims: ClaimSet = claims.into_iter().collect();
            let decision = authorizer
                .authorize_operation(&name, &claims)
                .await
                .with_context(|| format!("Failed to authorize operation '{}'", name))?;

            println!("{}", serde_json::to_string_pretty(&decision)?);
            print_metrics(&authorizer, cli.metrics).await;
            Ok(exit_code(decision.allowed))
        }
        Command::Policies => {
            let registry = config.build_registry()?;
            let operations = config.build_operations()?;
            info!("{} static policies, {} operations", registry.len(), operations.len());

            let policies: Vec<Policy> = registry
                .names()
                .into_iter()
                .filter_map(|name| registry.get(name))
                .map(|policy| Policy::clone(&policy))
                .collect();
            let listing = serde_json::json!({
                "cache_duration_secs": config.cache.default_duration_secs,
                "policies": policies,
                "operations": operations.list(),
            });

            println!("{}", serde_json::to_string_pretty(&listing)?);
            Ok(ALLOWED_EXIT_CODE)
        }
    }
}

/// Prometheus text goes to stderr so stdout stays valid JSON
async fn print_metrics(authorizer: &Authorizer, enabled: bool) {
    if !enabled {
        return;
    }
    match authorizer.export_prometheus().await {
        Some(text) => eprint!("{}", text),
        None => warn!("Metrics are disabled in the configuration"),
    }
}

fn exit_code(allowed: bool) -> u8 {
    if allowed {
        ALLOWED_EXIT_CODE
    } else {
        DENIED_EXIT_CODE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CONFIG: &str = r#"
[[policies]]
name = "AdminPolicy"
roles = ["Admin"]

[[operations]]
name = "GET /orders"
policy = "orders.read"
"#;

    fn config_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        file
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("permission-check").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(true), 0);
        assert_eq!(exit_code(false), 2);
    }

    #[tokio::test]
    async fn test_check_allowed_and_denied() {
        let file = config_file();
        let path = file.path().to_str().unwrap();

        let allowed = parse(&[
            "--config", path, "check",
            "--policy", "orders.read",
            "--claim", "DynamicPermission=orders.read",
        ]);
        assert_eq!(run(allowed).await.unwrap(), 0);

        let denied = parse(&[
            "--config", path, "check",
            "--policy", "AdminPolicy",
            "--claim", "role=User",
        ]);
        assert_eq!(run(denied).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_operation_and_metrics_flag() {
        let file = config_file();
        let path = file.path().to_str().unwrap();

        let cli = parse(&[
            "--config", path, "--metrics", "operation",
            "--name", "GET /orders",
            "--claim", "DynamicPermission=orders.read",
        ]);
        assert!(cli.metrics);
        assert_eq!(run(cli).await.unwrap(), 0);

        let policies = parse(&["--config", path, "policies"]);
        assert_eq!(run(policies).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_errors_surface_from_run() {
        let unknown_op = parse(&["operation", "--name", "PUT /nowhere"]);
        assert!(run(unknown_op).await.is_err());

        let missing = parse(&["--config", "/nonexistent/permission.toml", "policies"]);
        assert!(run(missing).await.is_err());
    }

    #[test]
    fn test_malformed_claim_rejected_by_parser() {
        let result = Cli::try_parse_from([
            "permission-check", "check", "--policy", "p", "--claim", "no-equals-sign",
        ]);
        assert!(result.is_err());
    }
}
