use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

pub mod agents;
pub mod auth;
pub mod phone;

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,wudi=debug,wudi_core=debug,wudi_proxy=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(true)
                .with_thread_ids(false),
        )
        .init();
}
