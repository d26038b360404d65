//! Menu-driven cleanup.

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};
use redsweep::cli::{InteractiveAction, Session};
use redsweep::config::SweepConfig;
use redsweep::credentials::TerminalPrompt;
use redsweep::retention::DEFAULT_AGE_THRESHOLD_DAYS;
use redsweep::services::SyncOutcome;
use redsweep::Error;

fn prompt_error(e: dialoguer::Error) -> Error {
    Error::operation("prompt", e)
}

/// Runs the interactive menu until the user quits.
///
/// Each menu choice is one cleanup run over one kind, and syncs the logs
/// when it deleted something.
pub fn cmd_interactive(config: &SweepConfig, dry_run: bool, yes: bool) -> redsweep::Result<()> {
    let theme = ColorfulTheme::default();
    if !yes
        && !Confirm::with_theme(&theme)
            .with_prompt("Do you want to run the cleaner?")
            .default(false)
            .interact()
            .map_err(prompt_error)?
    {
        println!("Aborted.");
        return Ok(());
    }

    let session = Session::connect(config, Some(&TerminalPrompt))?;
    println!("Logged in as u/{}.", session.username());
    if dry_run {
        println!("Dry run: nothing will be changed.");
    }

    let labels: Vec<&str> = InteractiveAction::all().iter().map(InteractiveAction::label).collect();
    loop {
        let choice = Select::with_theme(&theme)
            .with_prompt("Choose an action")
            .items(&labels)
            .default(0)
            .interact_opt()
            .map_err(prompt_error)?;
        let Some(action) = choice.and_then(|i| InteractiveAction::all().get(i).copied()) else {
            break;
        };

        let days = if action.needs_days() {
            Input::<u32>::with_theme(&theme)
                .with_prompt("How old (in days) should the items be?")
                .default(DEFAULT_AGE_THRESHOLD_DAYS)
                .interact_text()
                .map_err(prompt_error)?
        } else {
            DEFAULT_AGE_THRESHOLD_DAYS
        };
        let Some(options) = action.options(days, dry_run) else {
            break;
        };

        println!("Working ({})...", options.policy.describe());
        match session.orchestrator(options).run(session.username()) {
            Ok(report) => {
                println!("{}", report.summary());
                if report.total_matched() == 0 {
                    println!("There was nothing to delete.");
                }
                if let SyncOutcome::Uploaded { files } = &report.sync {
                    println!("Uploaded {} log file(s).", files.len());
                }
            },
            Err(e @ (Error::Unauthorized(_) | Error::OperationFailed { .. })) => return Err(e),
            Err(e) => eprintln!("Error: {e}"),
        }
    }
    Ok(())
}
