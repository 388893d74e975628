/// Broker 投递的原始消息（一次性消费）。
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at_ms: i64,
}

impl RawMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>, received_at_ms: i64) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at_ms,
        }
    }
}

/// 解码后的传感器事件，缺失字段已填充默认值。
#[derive(Debug, Clone, PartialEq)]
pub struct SensorEvent {
    pub sensor: String,
    pub sensor_id: String,
    pub value: f64,
    pub unit: String,
    pub timestamp_ms: i64,
}
