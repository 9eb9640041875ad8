//! Diagnostic tracing for the agent loop.
//!
//! Three outputs never mix:
//!
//! - this subscriber: `RUST_LOG`-filtered diagnostics on stderr, not persisted;
//! - the session log (`io::session_log`): per-step artifacts under
//!   `.agent/<run-id>/`, written regardless of `RUST_LOG`;
//! - console output (`main`): step lines, approval prompts and command output
//!   on stdout for the human gatekeeper.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the stderr subscriber.
///
/// The filter comes from `RUST_LOG` and falls back to `warn`:
///
/// ```bash
/// RUST_LOG=agent_loop=debug agent-loop --goal "make tests pass" --success "passed"
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
