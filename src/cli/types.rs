//! CLI type definitions.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "conductor")]
#[command(about = "Conductor - multi-agent coding orchestrator", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Without a subcommand the interactive workflow runs.
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a task against a configured project
    Task {
        /// Project name (a YAML file in the config directory)
        project: String,

        /// What the agents should do
        description: String,

        /// Spawn a detached background worker and print id, pid, log path
        #[arg(short = 'b', long)]
        background: bool,

        /// Run as the detached worker for this task id (internal)
        #[arg(long, hide = true)]
        worker: Option<String>,
    },

    /// List running tasks
    Status {
        /// Only show tasks for this project
        project: Option<String>,
    },

    /// Print a task's log
    Logs {
        /// Task id (or unambiguous prefix)
        id: String,

        /// Stream new lines as they are written
        #[arg(short, long)]
        follow: bool,

        /// Number of trailing lines to print
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },

    /// Cancel a running task
    Cancel {
        /// Task id (or unambiguous prefix); interactive when omitted
        id: Option<String>,
    },

    /// Restart a task as a fresh task referencing the original
    Restart {
        /// Task id (or unambiguous prefix)
        id: String,

        /// Restart in the background
        #[arg(short = 'b', long)]
        background: bool,
    },

    /// Create the pull request for a task whose auto-create failed
    Approve {
        /// Task id (or unambiguous prefix)
        id: String,
    },

    /// Delete a task's branch
    Reject {
        /// Task id (or unambiguous prefix)
        id: String,
    },

    /// Remove orphan containers
    Cleanup {
        /// Remove every conductor-labelled container, not just orphans
        #[arg(long)]
        all: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_structure_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_background_task() {
        let cli = Cli::parse_from(["conductor", "task", "demo", "fix the bug", "-b"]);
        match cli.command {
            Some(Commands::Task {
                project,
                description,
                background,
                worker,
            }) => {
                assert_eq!(project, "demo");
                assert_eq!(description, "fix the bug");
                assert!(background);
                assert!(worker.is_none());
            }
            _ => panic!("expected task command"),
        }
    }

    #[test]
    fn test_parse_no_args_is_interactive() {
        let cli = Cli::parse_from(["conductor"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_logs_flags() {
        let cli = Cli::parse_from(["conductor", "logs", "abc123", "-f", "-n", "200"]);
        match cli.command {
            Some(Commands::Logs { id, follow, lines }) => {
                assert_eq!(id, "abc123");
                assert!(follow);
                assert_eq!(lines, 200);
            }
            _ => panic!("expected logs command"),
        }
    }

    #[test]
    fn test_parse_hidden_worker_flag() {
        let cli = Cli::parse_from([
            "conductor", "task", "demo", "desc", "--worker", "a1b2c3d4e5f6",
        ]);
        match cli.command {
            Some(Commands::Task { worker, .. }) => {
                assert_eq!(worker.as_deref(), Some("a1b2c3d4e5f6"));
            }
            _ => panic!("expected task command"),
        }
    }
}
