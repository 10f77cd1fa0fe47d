use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "copydeck",
    version,
    about = "Apply reviewed copy changes to content files, with backups and rollback"
)]
pub struct Cli {
    /// Project root holding content and pipeline state
    #[arg(long, global = true, env = "COPYDECK_ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Config file (default: <root>/copydeck.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print reports as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging on stderr (RUST_LOG overrides)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply the approved changes file to content files
    Apply {
        /// Approved changes file (default: from config)
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Restore the file changed by one change log entry
    Rollback {
        /// Change log entry id
        id: String,
    },

    /// Roll back every live change of a section
    RollbackSection { section: String },

    /// Roll back every live change
    RollbackAll {
        /// Required; without it nothing is touched
        #[arg(long)]
        confirm: bool,
    },

    /// Delete old backups
    Cleanup {
        /// Maximum backup age in days (default: from config)
        #[arg(long)]
        days: Option<u32>,

        /// Also delete backups still referenced by the change log
        #[arg(long)]
        force: bool,
    },

    /// List recent changes
    History {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,

        #[arg(long)]
        section: Option<String>,
    },

    /// Change log statistics
    Stats,

    /// Pipeline progress of every section
    Status,

    /// The stage to run next and the sections waiting for it
    Next,

    /// Record a stage completion for a section
    Mark {
        section: String,

        /// analyze, improve, review or implement
        stage: String,

        /// Review decision: approved, rejected or partial
        #[arg(long)]
        decision: Option<String>,
    },

    /// Return every section to pending
    Reset {
        #[arg(long)]
        confirm: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["copydeck", "history", "--limit", "5", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Command::History { limit: 5, section: None }));
    }

    #[test]
    fn test_mark_with_decision() {
        let cli = Cli::try_parse_from([
            "copydeck", "mark", "hero", "review", "--decision", "partial",
        ])
        .unwrap();
        match cli.command {
            Command::Mark { section, stage, decision } => {
                assert_eq!(section, "hero");
                assert_eq!(stage, "review");
                assert_eq!(decision.as_deref(), Some("partial"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_rollback_all_defaults_to_unconfirmed() {
        let cli = Cli::try_parse_from(["copydeck", "rollback-all"]).unwrap();
        assert!(matches!(cli.command, Command::RollbackAll { confirm: false }));
    }
}
