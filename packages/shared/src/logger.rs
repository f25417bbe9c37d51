//! Logging setup for the TrustLink binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber for a binary and the crates it drives.
///
/// The filter enables `default_log_level` for the binary itself and for each
/// crate listed in `crates`. `RUST_LOG` overrides the whole filter when set.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "trustlink-client")
/// * `crates` - Library crates whose logs should be shown (e.g., "trustlink_client")
/// * `default_log_level` - The default log level (e.g., "debug", "info", "warn")
///
/// # Examples
///
/// ```no_run
/// use trustlink_shared::logger::setup_logger;
///
/// setup_logger("trustlink-client", &["trustlink_client"], "info");
/// ```
pub fn setup_logger(binary_name: &str, crates: &[&str], default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(binary_name, crates, default_log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn default_filter(binary_name: &str, crates: &[&str], default_log_level: &str) -> String {
    let mut targets: Vec<String> = Vec::new();
    // a binary is usually named after its library crate
    for target in std::iter::once(binary_name).chain(crates.iter().copied()) {
        let target = target.replace('-', "_");
        if !targets.contains(&target) {
            targets.push(target);
        }
    }
    targets
        .iter()
        .map(|target| format!("{}={}", target, default_log_level))
        .collect::<Vec<_>>()
        .join(",")
}
