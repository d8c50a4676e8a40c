use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber. `RUST_LOG` wins over `level` when set.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing(level: &str) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
	let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}
