use tracing_subscriber::EnvFilter;

/// Default filter: `debug` for this crate when tunnel debug mode is on, `info` otherwise.
pub fn default_directive(debug: bool) -> &'static str {
    if debug {
        "ssh_tunnel_proxy=debug,info"
    } else {
        "info"
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the default directive.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
