//! 桥接装配：连接管理 → 通道 → 派发 → 写入。

use bridge_config::BridgeConfig;
use bridge_ingest::{BrokerConnector, ConnectionManager, IngestError, ManagerConfig, ManagerHandle};
use bridge_pipeline::{DispatchStats, MessageHandler, spawn_dispatcher};
use bridge_storage::PointSink;
use domain::ConnectionState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// 运行中的桥接。
pub struct Bridge {
    manager: ManagerHandle,
    dispatcher: tokio::task::JoinHandle<DispatchStats>,
}

impl Bridge {
    /// 启动派发任务，连接 Broker 并订阅。
    ///
    /// 订阅失败时返回错误，此时派发任务随通道关闭而退出。
    pub async fn start(
        config: &BridgeConfig,
        sink: Arc<dyn PointSink>,
        connector: Arc<dyn BrokerConnector>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, IngestError> {
        let (sender, receiver) = mpsc::channel(config.dispatch.queue_capacity);
        let dispatcher = spawn_dispatcher(
            receiver,
            MessageHandler::new(sink),
            config.dispatch.workers,
        );

        let manager = ConnectionManager::new(connector, ManagerConfig::from_mqtt(&config.mqtt));
        let manager = match manager.start(sender, shutdown).await {
            Ok(manager) => manager,
            Err(err) => {
                if dispatcher.await.is_err() {
                    warn!(target: "bridge.app", "dispatcher_join_failed");
                }
                return Err(err);
            }
        };
        Ok(Self {
            manager,
            dispatcher,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.manager.state_receiver()
    }

    /// 等待连接管理退出（需先触发 shutdown），再等待在途消息处理完成。
    pub async fn stop(self) -> DispatchStats {
        self.manager.join().await;
        match self.dispatcher.await {
            Ok(stats) => stats,
            Err(err) => {
                warn!(target: "bridge.app", error = %err, "dispatcher_join_failed");
                DispatchStats::default()
            }
        }
    }
}

/// 保活等待：周期性空闲休眠，直到 shutdown 置位。
pub async fn keep_alive(idle_interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let idle_interval = idle_interval.max(Duration::from_millis(10));
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(idle_interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    info!(target: "bridge.app", "keep_alive_finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_config::BridgeConfig;
    use bridge_ingest::{BrokerSession, QoS, SessionEvent};
    use bridge_storage::{InMemorySink, WriteError};
    use domain::{DataPoint, FieldValue, RawMessage};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedConnector {
        failures: usize,
        attempts: AtomicUsize,
        subscribes: Arc<AtomicUsize>,
        messages: Mutex<Option<VecDeque<RawMessage>>>,
    }

    #[async_trait]
    impl BrokerConnector for ScriptedConnector {
        async fn connect(&self) -> Result<Box<dyn BrokerSession>, IngestError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures {
                return Err(IngestError::Connect("broker unavailable".to_string()));
            }
            let messages = self.messages.lock().unwrap().take().unwrap_or_default();
            Ok(Box::new(ScriptedSession {
                messages,
                subscribes: self.subscribes.clone(),
            }))
        }
    }

    struct ScriptedSession {
        messages: VecDeque<RawMessage>,
        subscribes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BrokerSession for ScriptedSession {
        async fn subscribe(&mut self, _filter: &str, _qos: QoS) -> Result<(), IngestError> {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn next_event(&mut self) -> Result<SessionEvent, IngestError> {
            match self.messages.pop_front() {
                Some(message) => Ok(SessionEvent::Message(message)),
                None => std::future::pending().await,
            }
        }

        async fn disconnect(&mut self) {}
    }

    /// 第二次写入失败。
    struct SecondWriteFails {
        calls: AtomicUsize,
        inner: InMemorySink,
    }

    #[async_trait]
    impl PointSink for SecondWriteFails {
        async fn write(&self, point: DataPoint) -> Result<(), WriteError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
                return Err(WriteError::Rejected {
                    status: 400,
                    body: "unable to parse".to_string(),
                });
            }
            self.inner.write(point).await
        }
    }

    fn test_config() -> BridgeConfig {
        let env: HashMap<&str, &str> = HashMap::from([
            ("MQTT_RETRY_DELAY_SECONDS", "0"),
            ("MQTT_CONNECT_TIMEOUT_SECONDS", "1"),
        ]);
        BridgeConfig::from_lookup(|key| env.get(key).map(|value| value.to_string()))
            .expect("config")
    }

    fn connector(failures: usize, messages: Vec<(&str, &str)>) -> Arc<ScriptedConnector> {
        Arc::new(ScriptedConnector {
            failures,
            attempts: AtomicUsize::new(0),
            subscribes: Arc::new(AtomicUsize::new(0)),
            messages: Mutex::new(Some(
                messages
                    .into_iter()
                    .map(|(topic, payload)| RawMessage::new(topic, payload.as_bytes().to_vec(), 1))
                    .collect(),
            )),
        })
    }

    async fn wait_for(sink: &InMemorySink, count: usize) {
        for _ in 0..500 {
            if sink.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} points, got {}", count, sink.len());
    }

    #[tokio::test]
    async fn bridge_writes_points_after_retrying_connect() {
        let sink = Arc::new(InMemorySink::new());
        let connector = connector(
            2,
            vec![
                (
                    "sensors/humidity",
                    r#"{"sensor":"humidity","sensor_id":"hum001","value":55.5,"unit":"%","timestamp":1700000000}"#,
                ),
                ("sensors/pressure", "{}"),
            ],
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let bridge = Bridge::start(&test_config(), sink.clone(), connector.clone(), shutdown_rx)
            .await
            .expect("start");
        assert_eq!(bridge.state(), ConnectionState::Connected);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(connector.subscribes.load(Ordering::SeqCst), 1);

        wait_for(&sink, 2).await;
        shutdown_tx.send(true).expect("shutdown");
        let stats = bridge.stop().await;

        assert_eq!(stats.written, 2);
        let points = sink.points();
        assert_eq!(points[0].measurement(), "humidity");
        assert_eq!(points[0].timestamp(), 1_700_000_000_000);
        assert_eq!(points[1].measurement(), "pressure");
        assert_eq!(points[1].tag("sensor"), Some("unknown"));
        assert_eq!(points[1].field("unit"), Some(&FieldValue::String(String::new())));
    }

    #[tokio::test]
    async fn failed_write_is_isolated_end_to_end() {
        let sink = Arc::new(SecondWriteFails {
            calls: AtomicUsize::new(0),
            inner: InMemorySink::new(),
        });
        let connector = connector(
            0,
            vec![
                ("sensors/temperature", r#"{"sensor_id":"t1","value":1.0}"#),
                ("sensors/temperature", r#"{"sensor_id":"t2","value":2.0}"#),
                ("sensors/temperature", "not json"),
                ("sensors/temperature", r#"{"sensor_id":"t4","value":4.0}"#),
            ],
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let bridge = Bridge::start(&test_config(), sink.clone(), connector, shutdown_rx)
            .await
            .expect("start");
        wait_for(&sink.inner, 2).await;
        shutdown_tx.send(true).expect("shutdown");
        let stats = bridge.stop().await;

        assert_eq!(stats.processed, 4);
        assert_eq!(stats.written, 2);
        assert_eq!(stats.dropped, 2);
        let ids: Vec<_> = sink
            .inner
            .points()
            .iter()
            .filter_map(|point| point.tag("sensor_id").map(str::to_string))
            .collect();
        assert_eq!(ids, vec!["t1", "t4"]);
    }

    #[tokio::test]
    async fn keep_alive_returns_on_shutdown() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let waiter = tokio::spawn(keep_alive(Duration::from_millis(10), shutdown_rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        shutdown_tx.send(true).expect("shutdown");
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("keep_alive finished")
            .expect("join");
    }
}
