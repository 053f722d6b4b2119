/*!
 * Subcommand implementations
 *
 * `serve` runs a broker in-process. Every other command opens a resilient
 * client against the configured address, performs one operation and
 * returns a JSON document for the caller to print.
 */

mod client;
mod serve;

pub use client::{health, publish, signal, wait_cleanup, wait_completion, PublishArgs};
pub use serve::serve;

use crate::error::{KbusError, Result};
use kbus_proto::EventData;

/// Parse a `--data` argument; it must be a JSON object
pub fn parse_data(raw: Option<&str>) -> Result<EventData> {
    let Some(raw) = raw else {
        return Ok(EventData::new());
    };

    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(KbusError::InvalidData(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(KbusError::InvalidData(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_absent() {
        assert!(parse_data(None).unwrap().is_empty());
    }

    #[test]
    fn test_parse_data_object() {
        let data = parse_data(Some(r#"{"exit_code": 0, "node": "worker-3"}"#)).unwrap();
        assert_eq!(data["exit_code"], 0);
        assert_eq!(data["node"], "worker-3");
    }

    #[test]
    fn test_parse_data_rejects_non_objects() {
        assert!(matches!(
            parse_data(Some("[1, 2]")),
            Err(KbusError::InvalidData(msg)) if msg.contains("JSON object")
        ));
        assert!(matches!(
            parse_data(Some("{not json")),
            Err(KbusError::InvalidData(_))
        ));
    }
}
