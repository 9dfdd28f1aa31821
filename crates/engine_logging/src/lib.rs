#![deny(missing_docs)]
//! Shared logging utilities for the inliner workspace.
//!
//! Library code only talks to the `log` facade through the `engine_*` macros
//! below, which pin every record to the [`TARGET`] target. Installing a
//! backend is left to the binary ([`init_terminal`], [`init_file`]) and to
//! tests ([`initialize_for_tests`]).

use std::fs::File;
use std::io;
use std::path::Path;

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

/// Log target shared by every record emitted through the `engine_*` macros.
pub const TARGET: &str = "inliner";

/// Logs a trace-level message under the [`TARGET`] target.
#[macro_export]
macro_rules! engine_trace {
    ($($arg:tt)*) => {{
        log::trace!(target: $crate::TARGET, $($arg)*);
    }};
}

/// Logs a debug-level message under the [`TARGET`] target.
#[macro_export]
macro_rules! engine_debug {
    ($($arg:tt)*) => {{
        log::debug!(target: $crate::TARGET, $($arg)*);
    }};
}

/// Logs an info-level message under the [`TARGET`] target.
#[macro_export]
macro_rules! engine_info {
    ($($arg:tt)*) => {{
        log::info!(target: $crate::TARGET, $($arg)*);
    }};
}

/// Logs a warn-level message under the [`TARGET`] target.
#[macro_export]
macro_rules! engine_warn {
    ($($arg:tt)*) => {{
        log::warn!(target: $crate::TARGET, $($arg)*);
    }};
}

/// Logs an error-level message under the [`TARGET`] target.
#[macro_export]
macro_rules! engine_error {
    ($($arg:tt)*) => {{
        log::error!(target: $crate::TARGET, $($arg)*);
    }};
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build()
}

/// Installs a terminal logger at `level`.
///
/// Returns `false` if a global logger was already installed.
pub fn init_terminal(level: LevelFilter) -> bool {
    CombinedLogger::init(vec![TermLogger::new(
        level,
        build_config(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )])
    .is_ok()
}

/// Installs a terminal logger plus a file logger writing to `path`.
///
/// The file is truncated on start. Fails only if the file cannot be created;
/// an already-installed global logger is silently kept.
pub fn init_file(path: &Path, level: LevelFilter) -> io::Result<()> {
    let file = File::create(path)?;
    let config = build_config();
    let loggers: Vec<Box<dyn SharedLogger>> = vec![
        TermLogger::new(
            level,
            config.clone(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ),
        WriteLogger::new(level, config, file),
    ];
    let _ = CombinedLogger::init(loggers);
    Ok(())
}

/// Initializes a simple terminal logger for use in tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
