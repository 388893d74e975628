//! InfluxDB Line Protocol 编码。
//!
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2="text" timestamp
//! ```
//!
//! tag 按 key 排序；空值 tag 不写出（InfluxDB 不接受空 tag 值）。

use crate::error::WriteError;
use domain::{DataPoint, FieldValue};

/// 将数据点编码为一行 Line Protocol。
pub fn encode_point(point: &DataPoint) -> Result<String, WriteError> {
    if point.measurement().is_empty() {
        return Err(WriteError::InvalidPoint("empty measurement".to_string()));
    }
    if point.fields().is_empty() {
        return Err(WriteError::InvalidPoint("no fields".to_string()));
    }

    let mut line = escape_measurement(point.measurement());
    for (key, value) in point.tags() {
        if value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&escape_key(value));
    }

    line.push(' ');
    for (index, (key, value)) in point.fields().iter().enumerate() {
        if index > 0 {
            line.push(',');
        }
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&field_value(key, value)?);
    }

    line.push(' ');
    line.push_str(&point.timestamp().to_string());
    Ok(line)
}

fn field_value(key: &str, value: &FieldValue) -> Result<String, WriteError> {
    match value {
        FieldValue::Float(v) if !v.is_finite() => Err(WriteError::InvalidPoint(format!(
            "field {} is not finite",
            key
        ))),
        FieldValue::Float(v) => Ok(format!("{}", v)),
        FieldValue::String(v) => {
            let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
            Ok(format!("\"{}\"", escaped))
        }
    }
}

/// measurement 中逗号与空格需转义。
fn escape_measurement(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace(' ', "\\ ")
        .replace('\n', "\\n")
}

/// tag key / tag value / field key 中逗号、等号与空格需转义。
fn escape_key(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::WritePrecision;
    use std::collections::BTreeMap;

    fn point(measurement: &str, tags: &[(&str, &str)], fields: &[(&str, FieldValue)]) -> DataPoint {
        DataPoint::new(
            measurement,
            tags.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
            1_700_000_000_000,
            WritePrecision::Milliseconds,
        )
    }

    #[test]
    fn encodes_sensor_point() {
        let line = encode_point(&point(
            "humidity",
            &[("sensor_id", "hum001"), ("sensor", "humidity")],
            &[
                ("value", FieldValue::Float(55.5)),
                ("unit", FieldValue::String("%".to_string())),
            ],
        ))
        .expect("encode");
        assert_eq!(
            line,
            "humidity,sensor=humidity,sensor_id=hum001 unit=\"%\",value=55.5 1700000000000"
        );
    }

    #[test]
    fn zero_float_has_no_integer_suffix() {
        let line = encode_point(&point("pressure", &[], &[("value", FieldValue::Float(0.0))]))
            .expect("encode");
        assert_eq!(line, "pressure value=0 1700000000000");
    }

    #[test]
    fn escapes_special_characters() {
        let line = encode_point(&point(
            "air quality",
            &[("sensor id", "a=b,c")],
            &[("unit", FieldValue::String("say \"hi\"".to_string()))],
        ))
        .expect("encode");
        assert_eq!(
            line,
            "air\\ quality,sensor\\ id=a\\=b\\,c unit=\"say \\\"hi\\\"\" 1700000000000"
        );
    }

    #[test]
    fn empty_tag_values_are_skipped() {
        let line = encode_point(&point(
            "temperature",
            &[("sensor", ""), ("sensor_id", "t1")],
            &[("value", FieldValue::Float(1.5))],
        ))
        .expect("encode");
        assert_eq!(line, "temperature,sensor_id=t1 value=1.5 1700000000000");
    }

    #[test]
    fn rejects_invalid_points() {
        assert!(matches!(
            encode_point(&point("", &[], &[("value", FieldValue::Float(1.0))])),
            Err(WriteError::InvalidPoint(_))
        ));
        assert!(matches!(
            encode_point(&point("m", &[], &[])),
            Err(WriteError::InvalidPoint(_))
        ));
        assert!(matches!(
            encode_point(&point("m", &[], &[("value", FieldValue::Float(f64::NAN))])),
            Err(WriteError::InvalidPoint(_))
        ));
    }
}
