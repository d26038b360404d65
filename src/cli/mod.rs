//! Shared plumbing for the command-line entry points.
//!
//! The binary parses arguments and prints; everything it needs that can be
//! tested without a terminal lives here.
//!
//! # Commands
//!
//! | Command | Source tag | Description |
//! |---------|------------|-------------|
//! | `run` | `ci` | Unattended cleanup with the configured policy |
//! | `interactive` | `cli` | Menu-driven cleanup, one rule at a time |
//! | `serve` | `web` | JSON web service (feature `http`) |
//! | `upload` | | Push existing log files to the remote folder |
//! | `config` | | Show the resolved configuration |
//!
//! # Example Usage
//!
//! ```bash
//! # See what the weekly job would delete
//! redsweep run --dry-run
//!
//! # Retire comments older than 30 days regardless of score
//! redsweep run --rule stale-only --days 30 --kinds comments
//!
//! # Backfill dated snapshots
//! redsweep upload deleted_comments.txt deleted_posts.txt --date-suffix 2026-02-27
//! ```

mod args;
mod session;

pub use args::{InteractiveAction, parse_date_suffix, parse_kinds, today_suffix};
pub use session::Session;
