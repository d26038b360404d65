//! Unattended policy run.

use chrono::Utc;
use redsweep::cli::{Session, parse_kinds, today_suffix};
use redsweep::config::SweepConfig;
use redsweep::models::SourceTag;
use redsweep::platform::ScanMode;
use redsweep::services::CleanupOptions;
use redsweep::{Error, RetentionRule};

/// Arguments of `redsweep run`.
#[allow(clippy::struct_excessive_bools)]
pub struct RunArgs {
    pub dry_run: bool,
    pub rule: Option<String>,
    pub days: Option<u32>,
    pub kinds: Option<String>,
    pub cutoff: bool,
    pub dated_sync: bool,
    pub json: bool,
}

/// Runs one cleanup with the configured policy and prints the report.
///
/// Credentials come from the environment or the credentials file; this
/// command never prompts.
pub fn cmd_run(config: &SweepConfig, args: &RunArgs) -> redsweep::Result<()> {
    let mut policy = config.policy;
    if let Some(rule) = &args.rule {
        policy = policy.with_rule(rule.parse::<RetentionRule>()?);
    }
    if let Some(days) = args.days {
        policy = policy.with_age_threshold_days(days);
    }

    let mut options = CleanupOptions::new(policy)
        .with_source(SourceTag::Scheduled)
        .with_dry_run(args.dry_run)
        .with_dated_suffix(args.dated_sync.then(|| today_suffix(Utc::now())));
    if let Some(kinds) = &args.kinds {
        options = options.with_kinds(&parse_kinds(kinds)?);
    }
    if args.cutoff {
        options = options.with_scan_mode(ScanMode::CutoffOptimized);
    }

    let session = Session::connect(config, None)?;
    if args.dry_run && !args.json {
        println!("Dry run: nothing will be changed.");
    }
    let report = session.orchestrator(options).run(session.username())?;

    if args.json {
        let json = serde_json::to_string_pretty(&report).map_err(|e| Error::operation("serialize_report", e))?;
        println!("{json}");
    } else {
        println!("{}", report.summary());
    }
    Ok(())
}
