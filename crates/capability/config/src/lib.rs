//! 桥接进程运行配置加载。
//!
//! 配置在启动时一次性构建，之后以只读方式传入各组件。

use std::env;
use std::time::Duration;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// MQTT Broker 会话配置。
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// 每个进程实例唯一（前缀 + UUID v4）。
    pub client_id: String,
    pub topics: Vec<String>,
    pub qos: u8,
    pub clean_session: bool,
    pub auto_reconnect: bool,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub retry_delay: Duration,
}

/// InfluxDB 写入鉴权方式。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfluxAuth {
    /// 1.x 兼容接口：用户名/口令 + database。
    V1 {
        username: String,
        password: String,
        database: String,
    },
    /// 2.x 接口：token + org/bucket。
    V2 {
        token: String,
        org: String,
        bucket: String,
    },
}

/// InfluxDB 连接配置。
#[derive(Debug, Clone)]
pub struct InfluxConfig {
    pub url: String,
    pub auth: InfluxAuth,
    pub timeout: Duration,
}

/// 消息派发配置。
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

/// 桥接进程运行配置。
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub mqtt: MqttConfig,
    pub influx: InfluxConfig,
    pub dispatch: DispatchConfig,
    pub idle_interval: Duration,
    pub http_addr: Option<String>,
}

impl BridgeConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源读取配置（测试可注入 HashMap）。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let reader = Reader { lookup };

        let client_id_prefix = reader.string_or("MQTT_CLIENT_ID_PREFIX", "sensor-bridge");
        let topics = reader
            .string_or("MQTT_TOPICS", "sensors/#")
            .split(',')
            .map(str::trim)
            .filter(|topic| !topic.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        if topics.is_empty() {
            return Err(ConfigError::Invalid(
                "MQTT_TOPICS".to_string(),
                "no topic filter".to_string(),
            ));
        }
        let qos = reader.parse_or::<u8>("MQTT_QOS", 1)?;
        if qos > 2 {
            return Err(ConfigError::Invalid("MQTT_QOS".to_string(), qos.to_string()));
        }

        let mqtt = MqttConfig {
            host: reader.string_or("MQTT_BROKER_HOST", "broker"),
            port: reader.parse_or("MQTT_BROKER_PORT", 1883)?,
            username: reader.optional("MQTT_USERNAME"),
            password: reader.optional("MQTT_PASSWORD"),
            client_id: format!("{}-{}", client_id_prefix, uuid::Uuid::new_v4()),
            topics,
            qos,
            clean_session: true,
            auto_reconnect: true,
            keep_alive: reader.seconds_or("MQTT_KEEP_ALIVE_SECONDS", 30)?,
            connect_timeout: reader.seconds_or("MQTT_CONNECT_TIMEOUT_SECONDS", 10)?,
            retry_delay: reader.seconds_or("MQTT_RETRY_DELAY_SECONDS", 5)?,
        };

        let url = match reader.optional("INFLUXDB_URL") {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!(
                "http://{}:{}",
                reader.string_or("INFLUXDB_HOST", "influxdb"),
                reader.parse_or::<u16>("INFLUXDB_PORT", 8086)?
            ),
        };
        let auth = match reader.optional("INFLUXDB_TOKEN") {
            Some(token) => InfluxAuth::V2 {
                token,
                org: reader.string_or("INFLUXDB_ORG", ""),
                bucket: reader.string_or("INFLUXDB_BUCKET", "mqtt"),
            },
            None => InfluxAuth::V1 {
                username: reader.string_or("INFLUXDB_USER", "admin"),
                password: reader.string_or("INFLUXDB_PASSWORD", "adminpassword"),
                database: reader.string_or("INFLUXDB_DATABASE", "mqtt"),
            },
        };
        let influx = InfluxConfig {
            url,
            auth,
            timeout: reader.seconds_or("INFLUXDB_TIMEOUT_SECONDS", 10)?,
        };

        let dispatch = DispatchConfig {
            workers: reader.positive_or("BRIDGE_WORKERS", 1)?,
            queue_capacity: reader.positive_or("BRIDGE_QUEUE_CAPACITY", 256)?,
        };

        Ok(Self {
            mqtt,
            influx,
            dispatch,
            idle_interval: reader.seconds_or("BRIDGE_IDLE_INTERVAL_SECONDS", 1)?,
            http_addr: reader.optional("BRIDGE_HTTP_ADDR"),
        })
    }
}

struct Reader<F> {
    lookup: F,
}

impl<F> Reader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        match (self.lookup)(key) {
            Some(value) if !value.is_empty() => Some(value),
            _ => None,
        }
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        let value = match self.optional(key) {
            Some(value) => value,
            None => return Ok(default),
        };
        value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid(key.to_string(), value))
    }

    fn seconds_or(&self, key: &str, default: u64) -> Result<Duration, ConfigError> {
        self.parse_or::<u64>(key, default).map(Duration::from_secs)
    }

    fn positive_or(&self, key: &str, default: usize) -> Result<usize, ConfigError> {
        let value = self.parse_or::<usize>(key, default)?;
        if value == 0 {
            return Err(ConfigError::Invalid(key.to_string(), "0".to_string()));
        }
        Ok(value)
    }
}
