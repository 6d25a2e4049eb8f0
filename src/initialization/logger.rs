//! Logger initialization.
//!
//! Plain output is meant for an operator watching a run; JSON output is one
//! object per line for log shippers.

use std::io::Write;

use colored::*;
use log::{Level, LevelFilter, Record};

use crate::config::LogFormat;
use crate::error_handling::InitializationError;

const CRATE_TARGET: &str = "connectivity_tester::";

/// Initializes the logger with the specified level and format.
///
/// `RUST_LOG` is read first and the explicit `level` overrides it, so
/// `RUST_LOG=connectivity_tester::provider=trace` still narrows a module
/// when the CLI flag is left at its default.
///
/// # Errors
///
/// Returns `InitializationError::LoggerError` if a logger is already installed.
///
/// # Examples
///
/// ```bash
/// RUST_LOG=debug connectivity_tester measure ir mobile soax 5 2
/// connectivity_tester --log-level debug --log-format json measure ir mobile soax 5 2
/// ```
pub fn init_logger_with(level: LevelFilter, format: LogFormat) -> Result<(), InitializationError> {
    colored::control::set_override(true);

    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    for (module, cap) in [
        ("sqlx", LevelFilter::Warn),
        ("reqwest", LevelFilter::Info),
        ("hyper", LevelFilter::Info),
        ("hyper_util", LevelFilter::Info),
        // truncated UDP answers are logged at warn
        ("hickory_proto", LevelFilter::Error),
    ] {
        builder.filter_module(module, cap.min(level));
    }
    builder.filter_module("connectivity_tester", level);

    match format {
        LogFormat::Json => builder.format(|buf, record| writeln!(buf, "{}", json_line(record))),
        LogFormat::Plain => builder.format(|buf, record| {
            let (marker, level) = styled_level(record.level());
            writeln!(
                buf,
                "{} {} {} [{}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                marker,
                short_target(record.target()).cyan(),
                level,
                record.args()
            )
        }),
    };

    builder.try_init().map_err(InitializationError::from)?;
    Ok(())
}

fn json_line(record: &Record) -> String {
    serde_json::json!({
        "ts": chrono::Utc::now().timestamp_millis(),
        "level": record.level().as_str(),
        "target": record.target(),
        "msg": record.args().to_string(),
    })
    .to_string()
}

fn styled_level(level: Level) -> (&'static str, ColoredString) {
    let name = level.as_str();
    match level {
        Level::Error => ("❌", name.red()),
        Level::Warn => ("⚠️", name.yellow()),
        Level::Info => ("✔️", name.green()),
        Level::Debug => ("🔍", name.blue()),
        Level::Trace => ("🔬", name.purple()),
    }
}

/// Module path without the crate prefix.
fn short_target(target: &str) -> &str {
    target.strip_prefix(CRATE_TARGET).unwrap_or(target)
}
