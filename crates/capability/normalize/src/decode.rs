//! 传感器报文解码。
//!
//! 报文为扁平 JSON 对象，`sensor`、`sensor_id`、`value`、`unit`、`timestamp`
//! 均可缺省；缺失或类型不符时取默认值。只有无法解析为 JSON 对象时才报错。

use domain::SensorEvent;
use serde_json::{Map, Value};

/// 文本字段缺省值。
pub const DEFAULT_TEXT: &str = "unknown";

/// 解码错误。
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed json: {0}")]
    Syntax(#[from] serde_json::Error),
    #[error("payload is not a json object")]
    NotObject,
}

/// 以当前时间作为缺省时间戳解码。
pub fn decode(payload: &[u8]) -> Result<SensorEvent, DecodeError> {
    decode_at(payload, crate::now_epoch_ms())
}

/// 解码报文，`now_ms` 为缺省时间戳（毫秒）。
pub fn decode_at(payload: &[u8], now_ms: i64) -> Result<SensorEvent, DecodeError> {
    let value: Value = serde_json::from_slice(payload)?;
    let Value::Object(object) = value else {
        return Err(DecodeError::NotObject);
    };

    Ok(SensorEvent {
        sensor: text_or(&object, "sensor", DEFAULT_TEXT),
        sensor_id: text_or(&object, "sensor_id", DEFAULT_TEXT),
        value: object.get("value").and_then(Value::as_f64).unwrap_or(0.0),
        unit: text_or(&object, "unit", ""),
        timestamp_ms: object
            .get("timestamp")
            .and_then(Value::as_f64)
            .and_then(seconds_to_millis)
            .unwrap_or(now_ms),
    })
}

fn text_or(object: &Map<String, Value>, key: &str, default: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

/// 秒（可带小数）转毫秒，乘 1000 后截断；负值视为缺失。
fn seconds_to_millis(seconds: f64) -> Option<i64> {
    let millis = seconds * 1000.0;
    if !millis.is_finite() || millis < 0.0 {
        return None;
    }
    Some(millis as i64)
}
