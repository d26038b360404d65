//! Command handlers module.
//!
//! This module organizes the CLI command implementations into separate files:
//! - `run.rs`: Unattended policy run
//! - `interactive.rs`: Menu-driven cleanup
//! - `serve.rs`: Web service
//! - `upload.rs`: Explicit log upload
//! - `config.rs`: Configuration display command

mod config;
mod interactive;
mod run;
mod serve;
mod upload;

pub use config::cmd_config;
pub use interactive::cmd_interactive;
pub use run::{RunArgs, cmd_run};
pub use serve::cmd_serve;
pub use upload::cmd_upload;
