//! Logger configuration and output formatting.
//!
//! Structured single-line output with a colored level column, driven by the
//! configured level name and honoring `NO_COLOR` for plain environments.

use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::io::Write;

/// Installs the global logger at the given level name.
///
/// Unknown names fall back to `info`. Safe to call more than once; only the
/// first call installs the logger (later calls are no-ops, which keeps test
/// binaries from panicking).
pub fn init(level: &str) {
    let filter = match level.to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" | "warning" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    };

    let no_color = env::var("NO_COLOR").is_ok();

    let _ = Builder::new()
        .format(move |buf, record| {
            let level = record.level();
            let level_display = if no_color {
                format!("[{level:5}]")
            } else {
                let color = match level {
                    log::Level::Error => "\x1b[31m",
                    log::Level::Warn => "\x1b[33m",
                    log::Level::Info => "\x1b[32m",
                    log::Level::Debug => "\x1b[34m",
                    log::Level::Trace => "\x1b[35m",
                };
                format!("[{color}{level:5}\x1b[0m]")
            };

            writeln!(
                buf,
                "{} | {} | {} | {}",
                Local::now().format("%b %d %y %I:%M:%S %p"),
                level_display,
                record.target(),
                record.args(),
            )
        })
        .filter_level(filter)
        .try_init();
}
