//! CLI module for the workflow engine
//!
//! Provides subcommands:
//! - `run`: execute a DSL document, optionally streaming its output
//! - `validate`: compile a DSL document without running it

pub mod run;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::domain::graph::WorkflowDsl;
use crate::infrastructure::logging::init_logging;

/// Agentflow engine - run graph-defined LLM workflows
#[derive(Parser)]
#[command(name = "agentflow-engine")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Execute a workflow document
    Run(run::RunArgs),

    /// Validate a workflow document without running it
    Validate {
        /// Path to the DSL document (JSON)
        dsl: PathBuf,
    },
}

/// Loads `.env`, the layered configuration and the subscriber
fn bootstrap() -> AppConfig {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_default();
    init_logging(&config.logging);
    config
}

fn read_dsl(path: &Path) -> anyhow::Result<WorkflowDsl> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    Ok(WorkflowDsl::from_json(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "agentflow-engine",
            "run",
            "flow.json",
            "--inputs",
            r#"{"query":"hi"}"#,
            "--stream",
        ]);

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.dsl, PathBuf::from("flow.json"));
                assert!(args.stream);
                assert_eq!(args.inputs.as_deref(), Some(r#"{"query":"hi"}"#));
                assert!(args.flow_id.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_validate() {
        let cli = Cli::parse_from(["agentflow-engine", "validate", "flow.json"]);

        assert!(matches!(cli.command, Command::Validate { dsl } if dsl == Path::new("flow.json")));
    }
}
