//! 基于 rumqttc 的 Broker 传输实现。

use crate::{BrokerConnector, BrokerSession, IngestError, SessionEvent, now_epoch_ms};
use async_trait::async_trait;
use bridge_config::MqttConfig;
use domain::RawMessage;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, Publish, QoS,
    SubscribeReasonCode,
};
use std::collections::VecDeque;
use std::time::Duration;

/// 请求通道容量。
const REQUEST_CAPACITY: usize = 10;
/// 断开时等待 DISCONNECT 报文发出的上限。
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

pub fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

/// MQTT 连接器，每次 `connect` 创建新的客户端与事件循环。
#[derive(Debug, Clone)]
pub struct MqttConnector {
    options: MqttOptions,
}

impl MqttConnector {
    pub fn new(config: &MqttConfig) -> Self {
        let mut options =
            MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(config.clean_session);
        if let (Some(username), Some(password)) =
            (config.username.as_ref(), config.password.as_ref())
        {
            options.set_credentials(username, password);
        }
        Self { options }
    }

    pub fn client_id(&self) -> String {
        self.options.client_id()
    }
}

#[async_trait]
impl BrokerConnector for MqttConnector {
    async fn connect(&self) -> Result<Box<dyn BrokerSession>, IngestError> {
        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), REQUEST_CAPACITY);
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(IngestError::Connect(format!(
                            "connection refused: {:?}",
                            ack.code
                        )));
                    }
                    return Ok(Box::new(MqttSession {
                        client,
                        eventloop,
                        pending: VecDeque::new(),
                    }));
                }
                Ok(_) => {}
                Err(err) => return Err(IngestError::Connect(err.to_string())),
            }
        }
    }
}

/// 已完成 CONNACK 的 MQTT 会话。
pub struct MqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
    /// 等待 SUBACK 期间到达的消息。
    pending: VecDeque<RawMessage>,
}

#[async_trait]
impl BrokerSession for MqttSession {
    async fn subscribe(&mut self, filter: &str, qos: QoS) -> Result<(), IngestError> {
        self.client
            .subscribe(filter, qos)
            .await
            .map_err(|err| IngestError::Subscribe(err.to_string()))?;
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        return Err(IngestError::Subscribe(format!(
                            "broker rejected filter {}",
                            filter
                        )));
                    }
                    return Ok(());
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.pending.push_back(raw_message(publish));
                }
                Ok(_) => {}
                Err(err) => return Err(IngestError::Subscribe(err.to_string())),
            }
        }
    }

    async fn next_event(&mut self) -> Result<SessionEvent, IngestError> {
        if let Some(message) = self.pending.pop_front() {
            return Ok(SessionEvent::Message(message));
        }
        match self.eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                Ok(SessionEvent::Message(raw_message(publish)))
            }
            Ok(_) => Ok(SessionEvent::Other),
            Err(err) => Err(IngestError::ConnectionLost(err.to_string())),
        }
    }

    async fn disconnect(&mut self) {
        if self.client.disconnect().await.is_err() {
            return;
        }
        let eventloop = &mut self.eventloop;
        let _ = tokio::time::timeout(DISCONNECT_GRACE, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;
    }
}

fn raw_message(publish: Publish) -> RawMessage {
    RawMessage {
        topic: publish.topic,
        payload: publish.payload.to_vec(),
        received_at_ms: now_epoch_ms(),
    }
}
