use crate::config::{LogFormat, LogLevel, LoggingConfig};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::io::Write;

/// Effective level: `debug` forces Debug, otherwise the configured level or Info.
pub fn effective_level(config: &LoggingConfig, debug: bool) -> LogLevel {
    if debug {
        LogLevel::Debug
    } else {
        config.level.clone().unwrap_or_default()
    }
}

/// Install the global logger. `RUST_LOG` still overrides the configured level.
pub fn init(config: &LoggingConfig, debug: bool) -> Result<(), log::SetLoggerError> {
    let level = effective_level(config, debug).to_string();
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));

    if let Some(LogFormat::Json) = config.format {
        builder.format(|buf, record| {
            writeln!(buf, "{}", format_json(record.level(), record.target(), &record.args().to_string()))
        });
    }

    builder.try_init()
}

fn format_json(level: log::Level, target: &str, message: &str) -> String {
    let timestamp: DateTime<Utc> = Utc::now();
    json!({
        "timestamp": timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        "level": level.to_string().to_lowercase(),
        "target": target,
        "message": message,
    })
    .to_string()
}

// Parse string to LogLevel
pub fn parse_log_level(s: &str) -> Result<LogLevel, String> {
    match s.to_lowercase().as_str() {
        "trace" => Ok(LogLevel::Trace),
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warn" => Ok(LogLevel::Warn),
        "error" => Ok(LogLevel::Error),
        _ => Err(format!("Invalid log level: {}. Must be one of: trace, debug, info, warn, error", s)),
    }
}
