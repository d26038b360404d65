//! Web service command.

use redsweep::config::SweepConfig;

/// Logs in, then serves the JSON API on `port`.
///
/// Login happens before the async runtime starts, so the blocking platform
/// client is never created inside it.
#[cfg(feature = "http")]
pub fn cmd_serve(config: SweepConfig, port: u16) -> redsweep::Result<()> {
    use redsweep::cli::Session;
    use redsweep::web::{AppState, serve};
    use std::sync::Arc;

    let (client, username, config) = Session::connect(&config, None)?.into_parts();
    println!("Serving u/{username} on http://0.0.0.0:{port}");
    serve(AppState::new(Arc::new(client), username, &config), port)
}

/// Web service (feature not enabled).
#[cfg(not(feature = "http"))]
pub fn cmd_serve(_config: SweepConfig, _port: u16) -> redsweep::Result<()> {
    Err(redsweep::Error::InvalidInput(
        "this build has no web service; rebuild with `--features http`".to_string(),
    ))
}
