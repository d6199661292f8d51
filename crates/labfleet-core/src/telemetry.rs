//! Tracing initialisation for the labfleet binary.
//!
//! Logs go to stderr so they never interleave with rendered fleet
//! reports on stdout. Safe to call more than once — the global
//! subscriber can only be set once per process, later calls are ignored.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// * `json` — when `true`, emit newline-delimited JSON log lines.
/// * `quiet` — restrict logging to warnings and errors; rollback
///   failures are reported at warn level and still get through.
/// * `level` — default verbosity when neither `quiet` nor `RUST_LOG`
///   applies.
///
/// `RUST_LOG` always wins when set. The default filter caps the SSH
/// transport at warn; russh logs every handshake step at debug, which
/// drowns out fleet progress on multi-node runs.
pub fn init_tracing(json: bool, quiet: bool, level: Level) {
    let default_filter = if quiet {
        "warn".to_string()
    } else {
        format!("{level},russh=warn,russh_sftp=warn")
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .json(),
            )
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}
