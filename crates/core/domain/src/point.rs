//! 时序数据点模型。

use std::collections::BTreeMap;

/// 字段值类型。
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    String(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Float(_) => None,
            FieldValue::String(v) => Some(v),
        }
    }
}

/// 时间戳精度。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePrecision {
    Milliseconds,
}

impl WritePrecision {
    /// InfluxDB `precision` 查询参数取值。
    pub fn as_str(&self) -> &'static str {
        match self {
            WritePrecision::Milliseconds => "ms",
        }
    }
}

/// 可写入时序库的数据点。
///
/// 构建后不可变，由单次写入调用消费。
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: i64,
    precision: WritePrecision,
}

impl DataPoint {
    pub fn new(
        measurement: impl Into<String>,
        tags: BTreeMap<String, String>,
        fields: BTreeMap<String, FieldValue>,
        timestamp: i64,
        precision: WritePrecision,
    ) -> Self {
        Self {
            measurement: measurement.into(),
            tags,
            fields,
            timestamp,
            precision,
        }
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn precision(&self) -> WritePrecision {
        self.precision
    }
}
