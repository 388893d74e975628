//! MQTT 采集：Broker 会话管理与消息投递。
//!
//! - [`BrokerConnector`] / [`BrokerSession`]：传输抽象，生产实现见 [`mqtt`]
//! - [`ConnectionManager`]：连接 → 订阅 → 接收 → 丢失 → 重连 的状态机

use async_trait::async_trait;
use domain::RawMessage;

pub mod manager;
pub mod mqtt;

pub use manager::{ConnectionManager, ManagerConfig, ManagerHandle};
pub use mqtt::{MqttConnector, MqttSession, qos_from_u8};
pub use rumqttc::QoS;

/// 采集错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("connect error: {0}")]
    Connect(String),
    #[error("subscribe error: {0}")]
    Subscribe(String),
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("timed out after {0}s")]
    Timeout(u64),
    #[error("cancelled")]
    Cancelled,
}

/// 会话事件。
#[derive(Debug)]
pub enum SessionEvent {
    /// 订阅 topic 上的入站消息。
    Message(RawMessage),
    /// 心跳、确认等协议报文。
    Other,
}

/// 已建立的 Broker 会话。
#[async_trait]
pub trait BrokerSession: Send {
    /// 订阅 topic filter，Broker 确认后返回。
    async fn subscribe(&mut self, filter: &str, qos: QoS) -> Result<(), IngestError>;

    /// 等待下一个会话事件；返回错误表示会话已丢失。
    async fn next_event(&mut self) -> Result<SessionEvent, IngestError>;

    async fn disconnect(&mut self);
}

/// Broker 连接器：每次调用发起一次握手。
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn BrokerSession>, IngestError>;
}

pub(crate) fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
