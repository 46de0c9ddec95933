//! CLI command definitions for the `capsmith` binary.
//!
//! Uses clap derive macros for argument parsing. Every command reads the same
//! content root (`--source`) and optional `capsmith.toml` (`--config`).

pub mod descriptor;
pub mod resolve;

use std::path::PathBuf;

use capsmith_types::descriptor::DescriptorKind;
use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Resolve, inspect and serve capability descriptors.
#[derive(Parser)]
#[command(name = "capsmith", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Content root holding skills/, droids/ and commands/.
    #[arg(long, global = true, env = "CAPSMITH_SOURCE", default_value = ".")]
    pub source: PathBuf,

    /// Config file (default: capsmith.toml in the content root).
    #[arg(long, global = true, env = "CAPSMITH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a task description into an activation plan.
    Resolve {
        /// Free-text description of the task.
        text: Vec<String>,

        /// Request a descriptor by id (repeatable).
        #[arg(long = "id", value_name = "ID")]
        ids: Vec<String>,

        /// Resource ceiling for the plan (default: config default_budget).
        #[arg(long)]
        budget: Option<f64>,

        /// Walk the plan and print the activation events.
        #[arg(long)]
        dispatch: bool,
    },

    /// Show one descriptor in full.
    Describe {
        /// Descriptor id.
        id: String,
    },

    /// List loaded descriptors.
    #[command(alias = "ls")]
    List {
        /// Only descriptors carrying this tag.
        #[arg(long)]
        tag: Option<String>,

        /// Only descriptors of this kind (skill, droid, command).
        #[arg(long)]
        kind: Option<DescriptorKind>,
    },

    /// Load the content root and report problems without resolving anything.
    Validate,

    /// Start the REST API server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Reload the registry when the content root changes.
        #[arg(long)]
        watch: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_collects_words_and_ids() {
        let cli = Cli::try_parse_from([
            "capsmith", "resolve", "write", "a", "commit", "--id", "git-commit", "--id",
            "reviewer", "--budget", "4.5",
        ])
        .unwrap();
        match cli.command {
            Commands::Resolve {
                text, ids, budget, dispatch,
            } => {
                assert_eq!(text.join(" "), "write a commit");
                assert_eq!(ids, vec!["git-commit", "reviewer"]);
                assert_eq!(budget, Some(4.5));
                assert!(!dispatch);
            }
            _ => panic!("expected resolve"),
        }
    }

    #[test]
    fn test_list_parses_kind() {
        let cli = Cli::try_parse_from(["capsmith", "ls", "--kind", "droid", "--json"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::List { kind, tag } => {
                assert_eq!(kind, Some(DescriptorKind::Droid));
                assert!(tag.is_none());
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn test_list_rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["capsmith", "list", "--kind", "robot"]).is_err());
    }
}
