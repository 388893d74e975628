//! 消息处理流水线：decode → route → build → write。
//!
//! 每条消息是独立的处理单元，任一阶段失败只丢弃该条消息并记录日志，
//! 不会中断派发循环。

use bridge_normalize::{DecodeError, build_point, decode_at, derive_measurement};
use bridge_storage::{PointSink, WriteError};
use bridge_telemetry::{
    record_decode_failure, record_message_received, record_point_written, record_write_failure,
    record_write_latency_ms, truncate_payload,
};
use domain::RawMessage;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// 单条消息处理错误。
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("write failed: {0}")]
    Write(#[from] WriteError),
}

/// 单条消息处理器。
#[derive(Clone)]
pub struct MessageHandler {
    sink: Arc<dyn PointSink>,
}

impl MessageHandler {
    pub fn new(sink: Arc<dyn PointSink>) -> Self {
        Self { sink }
    }

    /// 解码、路由、构建并写入，错误向上返回。
    pub async fn handle(&self, message: &RawMessage) -> Result<(), PipelineError> {
        let event = decode_at(&message.payload, message.received_at_ms)?;
        let measurement = derive_measurement(&message.topic);
        let point = build_point(event, &measurement);
        debug!(
            target: "bridge.pipeline",
            measurement = %point.measurement(),
            sensor = ?point.tag("sensor"),
            sensor_id = ?point.tag("sensor_id"),
            ts_ms = point.timestamp(),
            "point_built"
        );
        self.sink.write(point).await?;
        Ok(())
    }

    /// 处理一条消息并吞掉错误（记录日志与指标），返回是否写入成功。
    pub async fn process(&self, message: RawMessage) -> bool {
        record_message_received();
        info!(
            target: "bridge.pipeline",
            topic = %message.topic,
            payload_size = message.payload.len(),
            received_at_ms = message.received_at_ms,
            "message_received"
        );

        let started_at = Instant::now();
        match self.handle(&message).await {
            Ok(()) => {
                record_point_written();
                record_write_latency_ms(started_at.elapsed().as_millis() as u64);
                info!(
                    target: "bridge.pipeline",
                    topic = %message.topic,
                    "point_written"
                );
                true
            }
            Err(PipelineError::Decode(err)) => {
                record_decode_failure();
                warn!(
                    target: "bridge.pipeline",
                    topic = %message.topic,
                    payload = %truncate_payload(&message.payload),
                    error = %err,
                    "decode_failed"
                );
                false
            }
            Err(PipelineError::Write(err)) => {
                record_write_failure();
                warn!(
                    target: "bridge.pipeline",
                    topic = %message.topic,
                    payload = %truncate_payload(&message.payload),
                    error = %err,
                    "write_failed"
                );
                false
            }
        }
    }
}

/// 派发统计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub processed: u64,
    pub written: u64,
    pub dropped: u64,
}

/// 启动派发任务：从通道逐条取消息，最多 `workers` 条并发处理。
///
/// 通道关闭后等待在途消息处理完成再返回，因此 shutdown 不会打断写入。
pub fn spawn_dispatcher(
    mut receiver: mpsc::Receiver<RawMessage>,
    handler: MessageHandler,
    workers: usize,
) -> tokio::task::JoinHandle<DispatchStats> {
    let workers = workers.max(1);
    tokio::spawn(async move {
        let permits = Arc::new(Semaphore::new(workers));
        let mut in_flight = JoinSet::new();
        let mut stats = DispatchStats::default();

        while let Some(message) = receiver.recv().await {
            let permit = match permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            while let Some(done) = in_flight.try_join_next() {
                tally(&mut stats, done);
            }
            let handler = handler.clone();
            in_flight.spawn(async move {
                let written = handler.process(message).await;
                drop(permit);
                written
            });
        }

        while let Some(done) = in_flight.join_next().await {
            tally(&mut stats, done);
        }
        info!(
            target: "bridge.pipeline",
            processed = stats.processed,
            written = stats.written,
            dropped = stats.dropped,
            "dispatcher_stopped"
        );
        stats
    })
}

fn tally(stats: &mut DispatchStats, done: Result<bool, tokio::task::JoinError>) {
    stats.processed += 1;
    match done {
        Ok(true) => stats.written += 1,
        Ok(false) => stats.dropped += 1,
        Err(err) => {
            stats.dropped += 1;
            warn!(target: "bridge.pipeline", error = %err, "message_task_failed");
        }
    }
}
