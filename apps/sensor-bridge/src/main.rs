//! MQTT → InfluxDB 传感器桥接进程。
//!
//! 启动顺序：连接 InfluxDB → 连接 Broker（重试直到成功）→ 订阅 → 保活等待。
//! 收到 Ctrl-C / SIGTERM 后断开 Broker、处理完在途消息，再释放 InfluxDB 连接。

mod bridge;
mod http;

use bridge::{Bridge, keep_alive};
use bridge_config::BridgeConfig;
use bridge_ingest::{IngestError, MqttConnector};
use bridge_storage::{InfluxSink, PointSink};
use bridge_telemetry::init_tracing;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = BridgeConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();
    info!(
        target: "bridge.app",
        mqtt_host = %config.mqtt.host,
        mqtt_port = config.mqtt.port,
        client_id = %config.mqtt.client_id,
        topics = ?config.mqtt.topics,
        influx_url = %config.influx.url,
        workers = config.dispatch.workers,
        "bridge_starting"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    // InfluxDB 不可达属于启动致命错误
    let sink = Arc::new(InfluxSink::connect(&config.influx).await?);

    let connector = Arc::new(MqttConnector::new(&config.mqtt));
    let bridge = match Bridge::start(&config, sink.clone(), connector, shutdown_rx.clone()).await {
        Ok(bridge) => bridge,
        Err(IngestError::Cancelled) => {
            info!(target: "bridge.app", "bridge_cancelled_during_startup");
            sink.close().await;
            return Ok(());
        }
        Err(err) => {
            sink.close().await;
            return Err(err.into());
        }
    };

    if let Some(addr) = config.http_addr.clone() {
        let state = bridge.state_receiver();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(err) = http::serve(&addr, state, shutdown).await {
                warn!(target: "bridge.app", addr = %addr, error = %err, "http_server_failed");
            }
        });
    }

    info!(target: "bridge.app", state = %bridge.state(), "bridge_running");
    keep_alive(config.idle_interval, shutdown_rx).await;

    let stats = bridge.stop().await;
    sink.close().await;
    info!(
        target: "bridge.app",
        processed = stats.processed,
        written = stats.written,
        dropped = stats.dropped,
        "bridge_stopped"
    );
    Ok(())
}

/// 等待 Ctrl-C 或 SIGTERM。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target: "bridge.app", error = %err, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(target: "bridge.app", error = %err, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(target: "bridge.app", "ctrl_c_received"),
        _ = terminate => info!(target: "bridge.app", "sigterm_received"),
    }
}
