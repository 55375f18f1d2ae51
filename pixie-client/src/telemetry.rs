//! Tracing setup ("component G"). This crate emits `tracing` spans and
//! events throughout `connect_to_cluster`, `list_healthy_clusters`, and
//! script execution; [`init_tracing`] is a convenience subscriber wiring
//! for binaries embedding this client, not something the library itself
//! calls on your behalf.

use clap::Parser;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;

/// CLI/env knobs for a binary's tracing setup, meant to be `#[command(flatten)]`d
/// into that binary's own `clap` options struct.
#[derive(Parser, Debug, Clone)]
pub struct TracingOptions {
    /// Log level filter, in `tracing_subscriber::EnvFilter` syntax (e.g.
    /// `pixie_client=debug,warn`).
    #[arg(long, env = "PIXIE_LOG", default_value = "info")]
    pub log_level: String,

    /// Emit logs as newline-delimited JSON instead of the human-readable
    /// format.
    #[arg(long, env = "PIXIE_LOG_JSON")]
    pub log_json: bool,
}

impl Default for TracingOptions {
    fn default() -> Self {
        TracingOptions {
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

/// Installs a global `tracing` subscriber built from `options`.
///
/// Returns an error rather than panicking if a global subscriber has
/// already been installed, so callers that embed this client inside a
/// larger binary can call it defensively.
pub fn init_tracing(options: &TracingOptions) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let filter = EnvFilter::try_new(&options.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if options.log_json {
        let subscriber = fmt::Subscriber::builder().with_env_filter(filter).json().finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = fmt::Subscriber::builder().with_env_filter(filter).finish();
        tracing::subscriber::set_global_default(subscriber)
    }
}
