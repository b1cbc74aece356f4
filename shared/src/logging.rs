use crate::config::Environment;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is not set. Production keeps warnings
/// and errors only; every other environment also shows info and debug.
pub fn default_directive(environment: Environment) -> &'static str {
    if environment.is_production() {
        "warn"
    } else {
        "debug"
    }
}

/// Install the global fmt subscriber. Safe to call more than once; later
/// calls leave the first subscriber in place.
pub fn init(environment: Environment) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(environment)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
