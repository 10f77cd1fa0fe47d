use anyhow::Context;
use serde::Serialize;

use copydeck_core::commands as core;
use copydeck_core::load_config;

use crate::cli::{Cli, Command};
use crate::render;

/// Run one CLI command and print its report.
///
/// Returns an error only when the command could not run at all; partial
/// failures inside a report still succeed.
pub fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.root, cli.config.as_deref())
        .with_context(|| format!("Failed to load config for {}", cli.root.display()))?;

    match &cli.command {
        Command::Apply { file } => {
            let report = core::apply_approved_changes(&config, file.as_deref())?;
            emit(cli.json, &report, render::apply_report)
        }
        Command::Rollback { id } => {
            let outcome = core::rollback_entry(&config, id)?;
            emit(cli.json, &outcome, render::rollback_outcome)
        }
        Command::RollbackSection { section } => {
            let report = core::rollback_section(&config, section)?;
            emit(cli.json, &report, render::bulk_rollback)
        }
        Command::RollbackAll { confirm } => {
            let result = core::rollback_all(&config, *confirm)?;
            emit(cli.json, &result, render::rollback_all)
        }
        Command::Cleanup { days, force } => {
            let report = core::cleanup_backups(&config, *days, *force)?;
            emit(cli.json, &report, render::prune_report)
        }
        Command::History { limit, section } => {
            let entries = core::list_history(&config, Some(*limit), section.as_deref())?;
            emit(cli.json, &entries, |e| render::history(e))
        }
        Command::Stats => {
            let stats = core::change_stats(&config)?;
            emit(cli.json, &stats, render::change_stats)
        }
        Command::Status => {
            let report = core::show_status(&config)?;
            emit(cli.json, &report, render::status_report)
        }
        Command::Next => {
            let report = core::next_action(&config)?;
            emit(cli.json, &report, render::next_action)
        }
        Command::Mark {
            section,
            stage,
            decision,
        } => {
            let row = core::mark_stage(&config, section, stage, decision.as_deref())?;
            emit(cli.json, &row, render::section_row)
        }
        Command::Reset { confirm } => {
            let result = core::reset_status(&config, *confirm)?;
            emit(cli.json, &result, render::reset_result)
        }
    }
}

fn emit<T, F>(json: bool, value: &T, text: F) -> anyhow::Result<()>
where
    T: Serialize + ?Sized,
    F: FnOnce(&T) -> String,
{
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", text(value));
    }
    Ok(())
}
