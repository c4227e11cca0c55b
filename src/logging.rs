//! tracing subscriber setup shared by both binaries

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Highest value accepted by `--loglevel`
pub const MAX_LOG_LEVEL: u8 = 4;

/// Map a numeric verbosity to a filter directive
///
/// 0 and 1 both mean errors only, 2 adds warnings, 3 info, 4 debug.
pub fn level_filter(level: u8) -> &'static str {
    match level {
        0 | 1 => "error",
        2 => "warn",
        3 => "info",
        _ => "debug",
    }
}

/// Local wall-clock timestamps, e.g. `14:03:59 19.10.2026`
struct LocalTime;

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S %d.%m.%Y"))
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over `level`. Output goes to stderr so raw
/// audio on stdout stays clean.
pub fn init(level: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_filter(level)));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTime)
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();

    if let Err(e) = result {
        eprintln!("Logging already initialised: {}", e);
    }
}
