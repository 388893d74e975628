use domain::{DataPoint, FieldValue, SensorEvent, WritePrecision};
use std::collections::BTreeMap;

/// 由事件和 measurement 组装数据点（毫秒精度）。
///
/// 缺省值（如 `unknown`）照常写入 tag/field。
pub fn build_point(event: SensorEvent, measurement: &str) -> DataPoint {
    let mut tags = BTreeMap::new();
    tags.insert("sensor".to_string(), event.sensor);
    tags.insert("sensor_id".to_string(), event.sensor_id);

    let mut fields = BTreeMap::new();
    fields.insert("value".to_string(), FieldValue::Float(event.value));
    fields.insert("unit".to_string(), FieldValue::String(event.unit));

    DataPoint::new(
        measurement,
        tags,
        fields,
        event.timestamp_ms,
        WritePrecision::Milliseconds,
    )
}
