//! Logging setup for the two ways memopipe runs.
//!
//! Interactive (TTY): short colored lines routed through the shared
//! [`MultiProgress`], so they land above active progress bars instead of
//! tearing through them. Timestamps are omitted; the run is being watched.
//!
//! Non-interactive: plain `env_logger` output with millisecond timestamps,
//! one line per record, suitable for log aggregation.

use indicatif::MultiProgress;

const RESET: &str = "\x1b[0m";

fn level_color(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[36m",
        log::Level::Trace => "\x1b[35m",
    }
}

/// Filter applied when `RUST_LOG` is unset. `debug` wins over `quiet`.
fn default_filter(quiet: bool, debug: bool) -> &'static str {
    if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    }
}

/// Logger for interactive runs.
///
/// Filtering is delegated to an inner [`env_logger::Logger`] so `RUST_LOG`
/// keeps working; only the output path differs. Debug and trace records
/// carry their module target, matching what a `--debug` user needs to see.
pub struct ProgressLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl ProgressLogger {
    pub fn new(inner: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { inner, multi }
    }

    fn render(record: &log::Record) -> String {
        let level = record.level();
        let color = level_color(level);
        if level >= log::Level::Debug {
            format!("{color}{level:>5}{RESET} {}: {}", record.target(), record.args())
        } else {
            format!("{color}{level:>5}{RESET} {}", record.args())
        }
    }
}

impl log::Log for ProgressLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.inner.enabled(record.metadata()) {
            return;
        }
        let line = Self::render(record);
        self.multi.suspend(|| eprintln!("{line}"));
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the global logger.
///
/// With a `MultiProgress` the TTY path is used; without one, records go
/// straight to stderr with timestamps.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) {
    use std::io::Write;

    let env = env_logger::Env::default().default_filter_or(default_filter(quiet, debug));

    match multi {
        Some(multi) => {
            let inner = env_logger::Builder::from_env(env).build();
            let max_level = inner.filter();
            log::set_boxed_logger(Box::new(ProgressLogger::new(inner, multi.clone())))
                .expect("failed to init logger");
            log::set_max_level(max_level);
        }
        None => {
            env_logger::Builder::from_env(env)
                .format(|buf, record| {
                    writeln!(
                        buf,
                        "{} {:>5} {}",
                        buf.timestamp_millis(),
                        record.level(),
                        record.args()
                    )
                })
                .init();
        }
    }
}
