use tracing_subscriber::EnvFilter;

/// Initializes a `tracing_subscriber` using `LG_LOG` first, then `RUST_LOG`, then a default.
///
/// Log field contract:
/// - Domain events use `target: "lg_events"` and carry an `event` field.
/// - Include `client_id` on anything done on behalf of the local client.
/// - Include `key` for any event about a single object.
/// - Metric snapshots use `target: "lg_metrics"`.
pub fn init_tracing() {
    let filter = env_filter();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("LG_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
