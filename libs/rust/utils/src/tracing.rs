use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Crates that flood the log at `info` when talking to RPC nodes and the subgraph.
const SILENCED_TARGETS: &[&str] = &[
    "hyper_util",
    "alloy_rpc_client",
    "alloy_transport_http",
    "alloy_pubsub",
    "reqwest",
];

/// Installs the JSON stdout subscriber used by every binary in the workspace.
///
/// `RUST_LOG` overrides the default `info` level.
pub fn setup_tracing() {
    let mut env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    for target in SILENCED_TARGETS {
        if let Ok(directive) = format!("{target}=off").parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true),
        )
        .try_init();
}
