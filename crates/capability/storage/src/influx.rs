//! InfluxDB HTTP 写入实现
//!
//! - 配置 token 时走 2.x 接口：`POST /api/v2/write?org=&bucket=&precision=ms`
//! - 否则走 1.x 兼容接口：`POST /write?db=&precision=ms` + Basic 认证
//!
//! `connect` 时通过 `GET /ping` 探测，失败即视为启动致命错误。

use crate::error::{SinkInitError, WriteError};
use crate::line_protocol::encode_point;
use crate::traits::PointSink;
use async_trait::async_trait;
use bridge_config::{InfluxAuth, InfluxConfig};
use domain::DataPoint;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, info};

/// InfluxDB 写入器。
///
/// 进程生命周期内持有一个线程安全的 `reqwest::Client`；写入句柄按调用获取。
pub struct InfluxSink {
    client: reqwest::Client,
    url: String,
    auth: InfluxAuth,
    closed: AtomicBool,
    next_handle_id: AtomicU64,
    open_handles: AtomicUsize,
}

impl InfluxSink {
    /// 建立客户端并探测 `/ping`。
    pub async fn connect(config: &InfluxConfig) -> Result<Self, SinkInitError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| SinkInitError::Client(err.to_string()))?;
        let url = config.url.trim_end_matches('/').to_string();

        let ping_url = format!("{}/ping", url);
        let response = client
            .get(&ping_url)
            .send()
            .await
            .map_err(|err| SinkInitError::Unreachable {
                url: ping_url.clone(),
                reason: err.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(SinkInitError::Unreachable {
                url: ping_url,
                reason: format!("status {}", response.status().as_u16()),
            });
        }

        info!(
            target: "bridge.storage",
            url = %url,
            api = api_name(&config.auth),
            "influx_connected"
        );
        Ok(Self {
            client,
            url,
            auth: config.auth.clone(),
            closed: AtomicBool::new(false),
            next_handle_id: AtomicU64::new(1),
            open_handles: AtomicUsize::new(0),
        })
    }

    /// 获取本次调用专用的写入句柄。
    pub fn acquire(&self) -> Result<WriteHandle<'_>, WriteError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WriteError::Closed);
        }
        let id = self.next_handle_id.fetch_add(1, Ordering::Relaxed);
        self.open_handles.fetch_add(1, Ordering::AcqRel);
        debug!(target: "bridge.storage", handle_id = id, "write_handle_acquired");
        Ok(WriteHandle { sink: self, id })
    }

    /// 当前未释放的写入句柄数。
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::Acquire)
    }

    fn write_request(&self, body: String, precision: &str) -> reqwest::RequestBuilder {
        match &self.auth {
            InfluxAuth::V1 {
                username,
                password,
                database,
            } => self
                .client
                .post(format!("{}/write", self.url))
                .query(&[("db", database.as_str()), ("precision", precision)])
                .basic_auth(username, Some(password))
                .body(body),
            InfluxAuth::V2 { token, org, bucket } => self
                .client
                .post(format!("{}/api/v2/write", self.url))
                .query(&[
                    ("org", org.as_str()),
                    ("bucket", bucket.as_str()),
                    ("precision", precision),
                ])
                .header(reqwest::header::AUTHORIZATION, format!("Token {}", token))
                .body(body),
        }
    }
}

#[async_trait]
impl PointSink for InfluxSink {
    async fn write(&self, point: DataPoint) -> Result<(), WriteError> {
        let handle = self.acquire()?;
        handle.write_point(&point).await
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(
                target: "bridge.storage",
                url = %self.url,
                open_handles = self.open_handles(),
                "influx_closed"
            );
        }
    }
}

/// 单次写入句柄，离开作用域时释放。
pub struct WriteHandle<'a> {
    sink: &'a InfluxSink,
    id: u64,
}

impl WriteHandle<'_> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 写入一个数据点并消费句柄。
    pub async fn write_point(self, point: &DataPoint) -> Result<(), WriteError> {
        let body = encode_point(point)?;
        let response = self
            .sink
            .write_request(body, point.precision().as_str())
            .send()
            .await
            .map_err(|err| WriteError::Network(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let code = status.as_u16();
        if code == 401 || code == 403 {
            return Err(WriteError::Unauthorized(code));
        }
        let body = response.text().await.unwrap_or_default();
        Err(WriteError::Rejected { status: code, body })
    }
}

impl Drop for WriteHandle<'_> {
    fn drop(&mut self) {
        self.sink.open_handles.fetch_sub(1, Ordering::AcqRel);
        debug!(target: "bridge.storage", handle_id = self.id, "write_handle_released");
    }
}

fn api_name(auth: &InfluxAuth) -> &'static str {
    match auth {
        InfluxAuth::V1 { .. } => "v1",
        InfluxAuth::V2 { .. } => "v2",
    }
}
