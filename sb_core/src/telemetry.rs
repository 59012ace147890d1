//! ABOUTME: One-time tracing subscriber setup shared by the binary and tests
//! ABOUTME: JSON lines in production, pretty output locally, compact output under test

use std::sync::Once;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Used when `RUST_LOG` is unset; sqlx logs every statement at info
const DEFAULT_FILTER: &str = "info,sqlx=warn,actix_server=warn";

static INIT: Once = Once::new();

/// Install the global subscriber; later calls are no-ops
pub fn init_tracing(env: &str, service: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let registry = tracing_subscriber::registry().with(filter);

        // another subscriber may already be installed by a test harness
        let installed = match env {
            "production" => registry
                .with(fmt::layer().json().with_current_span(false))
                .try_init(),
            "test" => registry.with(fmt::layer().compact().with_test_writer()).try_init(),
            _ => registry.with(fmt::layer().pretty()).try_init(),
        };

        if installed.is_ok() {
            tracing::info!(service, environment = env, "Tracing ready");
        }
    });
}
