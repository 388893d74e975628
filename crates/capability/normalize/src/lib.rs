//! 报文规范化：RawMessage → SensorEvent → DataPoint。
//!
//! - [`decode`]：JSON 报文解码，逐字段缺省
//! - [`derive_measurement`]：topic 第二段作为 measurement
//! - [`build_point`]：事件 + measurement 组装数据点

pub mod build;
pub mod decode;
pub mod route;

pub use build::build_point;
pub use decode::{DEFAULT_TEXT, DecodeError, decode, decode_at};
pub use route::derive_measurement;

pub(crate) fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
