//! Retention policies.
//!
//! A [`RetentionPolicy`] is an immutable value built once per run. It pairs an
//! age threshold with a [`RetentionRule`], a boolean predicate over an item's
//! score, age and (for one rule) reply count.
//!
//! # Example
//!
//! ```rust,ignore
//! use redsweep::retention::{RetentionPolicy, RetentionRule};
//!
//! let policy = RetentionPolicy::new(RetentionRule::StaleOnly, 30);
//! if policy.evaluate(&item, chrono::Utc::now())? {
//!     println!("{} is past retention", item.id());
//! }
//! ```
//!
//! # Configuration
//!
//! - Config file: `[retention] rule = "stale-only"`, `age_threshold_days = 30`
//! - Environment: `REDSWEEP_RETENTION_RULE`, `REDSWEEP_RETENTION_DAYS`

mod policy;

pub use policy::{
    DEFAULT_AGE_THRESHOLD_DAYS, LONELY_AGE_DAYS, RETENTION_DAYS_ENV, RETENTION_RULE_ENV,
    RetentionPolicy, RetentionRule, evaluate,
};
