//! Diagnostic logging for both binaries.
//!
//! Output always goes to stderr: stdout carries protocol traffic for the
//! server and the final answer for the client.

use tracing_subscriber::{fmt, EnvFilter};

/// `RUST_LOG` wins when set; otherwise `warn`, or `debug` with `-v`.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "toolbridge=debug,warn"
    } else {
        "warn"
    }
}
