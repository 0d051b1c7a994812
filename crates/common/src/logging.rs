//! Logging setup and configuration
//!
//! Verbosity resolves in order: `RUST_LOG` (full `EnvFilter` syntax),
//! then the numeric `SURFKIT_DEBUG` override (0=error, 1=info, 2=debug,
//! 3=trace), then the caller's default.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Env var holding a numeric verbosity override
pub const DEBUG_ENV: &str = "SURFKIT_DEBUG";

/// Setup tracing subscriber for the application
pub fn setup_logging(default_level: &str) -> crate::Result<()> {
    let level = debug_env_level().unwrap_or(default_level);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| crate::Error::Config(format!("Invalid log filter: {}", e)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    Ok(())
}

/// Resolve `SURFKIT_DEBUG` to a filter level, if set and well-formed
fn debug_env_level() -> Option<&'static str> {
    match std::env::var(DEBUG_ENV).ok()?.trim() {
        "0" => Some("error"),
        "1" => Some("info"),
        "2" => Some("debug"),
        "3" => Some("trace"),
        other => {
            eprintln!("{DEBUG_ENV}={other} not in 0..=3, ignoring");
            None
        }
    }
}
