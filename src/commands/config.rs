//! Configuration display command.

use redsweep::config::SweepConfig;

/// Prints the resolved configuration.
pub fn cmd_config(config: &SweepConfig, show: bool) {
    if show {
        println!("{}", config.describe());
    } else {
        println!("Use 'redsweep config --show' to view the resolved configuration");
    }
}
