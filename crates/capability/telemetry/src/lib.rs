//! 日志初始化与桥接计数指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 日志中报文截断长度（字节）。
pub const PAYLOAD_LOG_LIMIT: usize = 256;

/// 指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub decode_failures: u64,
    pub points_written: u64,
    pub write_failures: u64,
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub connection_lost: u64,
    pub write_latency_ms_total: u64,
    pub write_latency_ms_count: u64,
}

/// 进程级计数指标。
pub struct BridgeMetrics {
    messages_received: AtomicU64,
    decode_failures: AtomicU64,
    points_written: AtomicU64,
    write_failures: AtomicU64,
    connect_attempts: AtomicU64,
    connect_failures: AtomicU64,
    connection_lost: AtomicU64,
    write_latency_ms_total: AtomicU64,
    write_latency_ms_count: AtomicU64,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            points_written: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            connect_attempts: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            connection_lost: AtomicU64::new(0),
            write_latency_ms_total: AtomicU64::new(0),
            write_latency_ms_count: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            points_written: self.points_written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            connection_lost: self.connection_lost.load(Ordering::Relaxed),
            write_latency_ms_total: self.write_latency_ms_total.load(Ordering::Relaxed),
            write_latency_ms_count: self.write_latency_ms_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<BridgeMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static BridgeMetrics {
    METRICS.get_or_init(BridgeMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 截断报文用于日志输出（非 UTF-8 字节按 lossy 处理）。
pub fn truncate_payload(payload: &[u8]) -> String {
    if payload.len() <= PAYLOAD_LOG_LIMIT {
        return String::from_utf8_lossy(payload).into_owned();
    }
    let mut text = String::from_utf8_lossy(&payload[..PAYLOAD_LOG_LIMIT]).into_owned();
    text.push_str("...");
    text
}

/// 记录收到的消息数。
pub fn record_message_received() {
    metrics().messages_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录解码失败次数。
pub fn record_decode_failure() {
    metrics().decode_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录写入成功次数。
pub fn record_point_written() {
    metrics().points_written.fetch_add(1, Ordering::Relaxed);
}

/// 记录写入失败次数。
pub fn record_write_failure() {
    metrics().write_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录 Broker 连接尝试次数。
pub fn record_connect_attempt() {
    metrics().connect_attempts.fetch_add(1, Ordering::Relaxed);
}

/// 记录 Broker 连接失败次数。
pub fn record_connect_failure() {
    metrics().connect_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录会话丢失次数。
pub fn record_connection_lost() {
    metrics().connection_lost.fetch_add(1, Ordering::Relaxed);
}

/// 记录写入延迟（毫秒）。
pub fn record_write_latency_ms(latency_ms: u64) {
    let metrics = metrics();
    metrics
        .write_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .write_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}
