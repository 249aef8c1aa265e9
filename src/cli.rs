//! Helpers shared by the command-line binaries

use crate::audit::AuditLog;
use crate::config::{load_config, Config};
use crate::error::LedgerError;
use crate::ledger::Payload;
use serde_json::Value;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Install the `tracing` subscriber; `RUST_LOG` overrides the `info` default.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Load the configuration and open the audit log it describes.
pub fn load_audit_log_from_config(path: Option<&Path>) -> Result<(Config, AuditLog), LedgerError> {
    let config = load_config(path)?;
    let log = AuditLog::open(&config.ledger)?;
    Ok((config, log))
}

/// Parse `key=value` pairs into a payload. Values that parse as JSON keep
/// their type (`count=3`, `on=true`); anything else is stored as a string.
pub fn parse_metadata<S: AsRef<str>>(pairs: &[S]) -> Result<Payload, LedgerError> {
    let mut payload = Payload::new();
    for pair in pairs {
        let pair = pair.as_ref();
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| LedgerError::Config(format!("metadata {:?} is not key=value", pair)))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(LedgerError::Config(format!("metadata {:?} has an empty key", pair)));
        }
        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        payload.insert(key.to_string(), value);
    }
    Ok(payload)
}

/// Shorten a seal for tables: first 12 and last 6 characters.
pub fn short_seal(seal: &str) -> String {
    if seal.len() > 20 {
        format!("{}...{}", &seal[..12], &seal[seal.len() - 6..])
    } else {
        seal.to_string()
    }
}

/// Render an epoch-seconds timestamp as local `YYYY-MM-DD HH:MM:SS`.
pub fn format_timestamp(timestamp: f64) -> String {
    let secs = timestamp.floor() as i64;
    let nanos = ((timestamp - timestamp.floor()) * 1e9) as u32;
    match chrono::DateTime::from_timestamp(secs, nanos) {
        Some(dt) => dt
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => "Invalid".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_metadata_keeps_json_types() {
        let payload = parse_metadata(&["query=jazz", "volume=30", "muted=false", "rooms=[\"hall\"]"]).unwrap();
        assert_eq!(payload["query"], json!("jazz"));
        assert_eq!(payload["volume"], json!(30));
        assert_eq!(payload["muted"], json!(false));
        assert_eq!(payload["rooms"], json!(["hall"]));
    }

    #[test]
    fn test_parse_metadata_rejects_malformed_pairs() {
        assert!(parse_metadata(&["novalue"]).is_err());
        assert!(parse_metadata(&["=x"]).is_err());
    }

    #[test]
    fn test_short_seal() {
        let seal = "0".repeat(4) + &"a".repeat(60);
        assert_eq!(short_seal(&seal), "0000aaaaaaaa...aaaaaa");
        assert_eq!(short_seal("0"), "0");
    }
}
