use std::io;

use gethostname::gethostname;
use slog::{self, Drain};
use slog_mozlog_json::MozLogJson;

use crate::errors::{ApcErrorKind, Result};

/// Initialize logging.
///
/// This will generate either mozilla standardized JSON output or a
/// more "human readable" form. It also uses the provided hostname
/// identifier as part of the standardized output.
pub fn init_logging(json: bool, hostname: String) -> Result<()> {
    let logger = if json {
        let drain = MozLogJson::new(io::stdout())
            .logger_name(format!(
                "{}-{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .msg_type(format!("{}:log", env!("CARGO_PKG_NAME")))
            .hostname(hostname)
            .build()
            .fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        slog::Logger::root(drain, o!())
    } else {
        let decorator = slog_term::TermDecorator::new().build();
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        slog::Logger::root(drain, o!())
    };
    // XXX: cancel slog_scope's NoGlobalLoggerSet for now, it's difficult to
    // prevent it from potentially panicing during tests. reset_logging resets
    // the global logger during shutdown anyway:
    // https://github.com/slog-rs/slog/issues/169
    slog_scope::set_global_logger(logger).cancel_reset();
    // Route `log` records from dependencies (reqwest, hyper) into slog.
    slog_stdlog::init()
        .map_err(|e| ApcErrorKind::GeneralError(format!("Could not bridge `log`: {e}")))?;
    Ok(())
}

/// Swap in a discarding logger so the async drain flushes on shutdown.
pub fn reset_logging() {
    let logger = slog::Logger::root(slog::Discard, o!());
    slog_scope::set_global_logger(logger).cancel_reset();
}

/// Use the run time specific Hostname identifier, falling back to the system level hostname
///
/// e.g. for `trailpush` this will attempt to look for `TRAILPUSH_HOSTNAME`, and if that
/// is not defined, will use the locally specified hostname.
pub fn get_default_hostname(prefix: &str) -> String {
    std::env::var(format!("{}_HOSTNAME", prefix.to_uppercase()))
        .unwrap_or_else(|_| gethostname().to_string_lossy().to_string())
}
