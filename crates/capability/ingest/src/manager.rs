//! Broker 连接管理状态机。
//!
//! ```text
//! Disconnected → Connecting → Connected → Lost → Connecting → …
//! ```
//!
//! - 连接：每次尝试受 `connect_timeout` 约束，失败后固定间隔 `retry_delay` 无限重试
//! - 订阅：启动时订阅失败直接返回错误；重连后显式重新订阅（clean session 下 Broker 不保留订阅）
//! - 投递：入站消息写入有界通道，由派发端逐条处理

use crate::{BrokerConnector, BrokerSession, IngestError, SessionEvent};
use bridge_config::MqttConfig;
use bridge_telemetry::{record_connect_attempt, record_connect_failure, record_connection_lost};
use domain::{ConnectionState, RawMessage};
use rumqttc::QoS;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// 连接管理参数。
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub topics: Vec<String>,
    pub qos: QoS,
    pub connect_timeout: Duration,
    pub retry_delay: Duration,
    /// 会话丢失后是否重连。
    pub reconnect: bool,
}

impl ManagerConfig {
    pub fn from_mqtt(config: &MqttConfig) -> Self {
        Self {
            topics: config.topics.clone(),
            qos: crate::qos_from_u8(config.qos),
            connect_timeout: config.connect_timeout,
            retry_delay: config.retry_delay,
            reconnect: config.auto_reconnect,
        }
    }
}

/// Broker 连接管理器。
pub struct ConnectionManager {
    connector: Arc<dyn BrokerConnector>,
    config: ManagerConfig,
    state: watch::Sender<ConnectionState>,
}

/// 后台运行中的连接管理任务。
pub struct ManagerHandle {
    task: tokio::task::JoinHandle<()>,
    state: watch::Receiver<ConnectionState>,
}

impl ManagerHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// 等待后台任务退出（需先触发 shutdown）。
    pub async fn join(self) {
        if let Err(err) = self.task.await {
            warn!(target: "bridge.ingest", error = %err, "connection_manager_join_failed");
        }
    }
}

enum Step {
    Shutdown,
    Event(Result<SessionEvent, IngestError>),
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn BrokerConnector>, config: ManagerConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            config,
            state,
        }
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// 连接（直到成功）并订阅，成功后在后台接收消息。
    ///
    /// 订阅失败返回 [`IngestError::Subscribe`]，调用方不应继续运行；
    /// 启动阶段收到 shutdown 返回 [`IngestError::Cancelled`]。
    pub async fn start(
        self,
        sender: mpsc::Sender<RawMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<ManagerHandle, IngestError> {
        let Some(mut session) = self.connect_until_ready(&mut shutdown).await else {
            self.set_state(ConnectionState::Disconnected);
            return Err(IngestError::Cancelled);
        };
        if let Err(err) = self.subscribe_all(session.as_mut()).await {
            warn!(target: "bridge.ingest", error = %err, "mqtt_subscribe_failed");
            session.disconnect().await;
            self.set_state(ConnectionState::Disconnected);
            return Err(err);
        }

        let state = self.state();
        let task = tokio::spawn(self.run(session, sender, shutdown));
        Ok(ManagerHandle { task, state })
    }

    async fn run(
        self,
        mut session: Box<dyn BrokerSession>,
        sender: mpsc::Sender<RawMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let step = tokio::select! {
                _ = wait_shutdown(&mut shutdown) => Step::Shutdown,
                event = session.next_event() => Step::Event(event),
            };

            match step {
                Step::Shutdown => break,
                Step::Event(Ok(SessionEvent::Message(message))) => {
                    if sender.send(message).await.is_err() {
                        warn!(target: "bridge.ingest", "dispatch_channel_closed");
                        break;
                    }
                }
                Step::Event(Ok(SessionEvent::Other)) => {}
                Step::Event(Err(err)) => {
                    self.set_state(ConnectionState::Lost);
                    record_connection_lost();
                    warn!(target: "bridge.ingest", error = %err, "mqtt_connection_lost");
                    if !self.config.reconnect {
                        return;
                    }
                    match self.reconnect(&mut shutdown).await {
                        Some(next) => session = next,
                        None => {
                            self.set_state(ConnectionState::Disconnected);
                            return;
                        }
                    }
                }
            }
        }

        session.disconnect().await;
        self.set_state(ConnectionState::Disconnected);
        info!(target: "bridge.ingest", "mqtt_disconnected");
    }

    /// 重连并重新订阅，直到成功或收到 shutdown。
    async fn reconnect(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<Box<dyn BrokerSession>> {
        loop {
            let mut session = self.connect_until_ready(shutdown).await?;
            match self.subscribe_all(session.as_mut()).await {
                Ok(()) => {
                    info!(target: "bridge.ingest", "mqtt_resubscribed");
                    return Some(session);
                }
                Err(err) => {
                    warn!(
                        target: "bridge.ingest",
                        error = %err,
                        retry_in_ms = self.config.retry_delay.as_millis() as u64,
                        "mqtt_resubscribe_failed"
                    );
                    session.disconnect().await;
                    self.set_state(ConnectionState::Lost);
                    if !self.sleep_or_shutdown(shutdown).await {
                        return None;
                    }
                }
            }
        }
    }

    /// 固定间隔重试连接；收到 shutdown 时返回 None。
    async fn connect_until_ready(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<Box<dyn BrokerSession>> {
        let mut attempt: u64 = 0;
        loop {
            if *shutdown.borrow() {
                return None;
            }
            attempt += 1;
            self.set_state(ConnectionState::Connecting);
            record_connect_attempt();

            let result = tokio::select! {
                result = tokio::time::timeout(self.config.connect_timeout, self.connector.connect()) => {
                    match result {
                        Ok(result) => result,
                        Err(_) => Err(IngestError::Timeout(self.config.connect_timeout.as_secs())),
                    }
                }
                _ = wait_shutdown(shutdown) => return None,
            };

            match result {
                Ok(session) => {
                    self.set_state(ConnectionState::Connected);
                    info!(target: "bridge.ingest", attempt = attempt, "mqtt_connected");
                    return Some(session);
                }
                Err(err) => {
                    record_connect_failure();
                    warn!(
                        target: "bridge.ingest",
                        attempt = attempt,
                        error = %err,
                        retry_in_ms = self.config.retry_delay.as_millis() as u64,
                        "mqtt_connect_failed"
                    );
                    if !self.sleep_or_shutdown(shutdown).await {
                        return None;
                    }
                }
            }
        }
    }

    async fn subscribe_all(&self, session: &mut dyn BrokerSession) -> Result<(), IngestError> {
        for filter in &self.config.topics {
            match tokio::time::timeout(
                self.config.connect_timeout,
                session.subscribe(filter, self.config.qos),
            )
            .await
            {
                Ok(Ok(())) => {
                    info!(
                        target: "bridge.ingest",
                        filter = %filter,
                        qos = ?self.config.qos,
                        "mqtt_subscribed"
                    );
                }
                Ok(Err(err)) => return Err(err),
                Err(_) => {
                    return Err(IngestError::Subscribe(format!(
                        "no SUBACK for {} within {}s",
                        filter,
                        self.config.connect_timeout.as_secs()
                    )));
                }
            }
        }
        Ok(())
    }

    /// 休眠 `retry_delay`；期间收到 shutdown 返回 false。
    async fn sleep_or_shutdown(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.config.retry_delay) => true,
            _ = wait_shutdown(shutdown) => false,
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

/// 等待 shutdown 置位（发送端被丢弃同样视为 shutdown）。
async fn wait_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
