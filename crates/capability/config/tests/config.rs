use bridge_config::{BridgeConfig, ConfigError, InfluxAuth};
use std::collections::HashMap;
use std::time::Duration;

fn load(pairs: &[(&str, &str)]) -> Result<BridgeConfig, ConfigError> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    BridgeConfig::from_lookup(|key| map.get(key).cloned())
}

#[test]
fn defaults_match_reference_deployment() {
    let config = load(&[]).expect("config");

    assert_eq!(config.mqtt.host, "broker");
    assert_eq!(config.mqtt.port, 1883);
    assert_eq!(config.mqtt.topics, vec!["sensors/#".to_string()]);
    assert_eq!(config.mqtt.qos, 1);
    assert!(config.mqtt.clean_session);
    assert!(config.mqtt.auto_reconnect);
    assert_eq!(config.mqtt.connect_timeout, Duration::from_secs(10));
    assert_eq!(config.mqtt.retry_delay, Duration::from_secs(5));
    assert!(config.mqtt.client_id.starts_with("sensor-bridge-"));
    assert_eq!(config.influx.url, "http://influxdb:8086");
    assert_eq!(
        config.influx.auth,
        InfluxAuth::V1 {
            username: "admin".to_string(),
            password: "adminpassword".to_string(),
            database: "mqtt".to_string(),
        }
    );
    assert_eq!(config.dispatch.workers, 1);
    assert!(config.http_addr.is_none());
}

#[test]
fn client_id_is_unique_per_load() {
    let first = load(&[]).expect("config");
    let second = load(&[]).expect("config");
    assert_ne!(first.mqtt.client_id, second.mqtt.client_id);
}

#[test]
fn token_selects_v2_auth() {
    let config = load(&[
        ("INFLUXDB_URL", "https://influx.example:8086/"),
        ("INFLUXDB_TOKEN", "tok"),
        ("INFLUXDB_ORG", "org-1"),
        ("INFLUXDB_BUCKET", "telemetry"),
    ])
    .expect("config");

    assert_eq!(config.influx.url, "https://influx.example:8086");
    assert_eq!(
        config.influx.auth,
        InfluxAuth::V2 {
            token: "tok".to_string(),
            org: "org-1".to_string(),
            bucket: "telemetry".to_string(),
        }
    );
}

#[test]
fn topics_are_split_and_trimmed() {
    let config = load(&[("MQTT_TOPICS", "sensors/#, plant/+/data ,")]).expect("config");
    assert_eq!(config.mqtt.topics, vec!["sensors/#", "plant/+/data"]);
}

#[test]
fn invalid_values_are_rejected() {
    let err = load(&[("MQTT_BROKER_PORT", "abc")]).expect_err("port");
    assert_eq!(err.to_string(), "invalid value for MQTT_BROKER_PORT: abc");

    assert!(load(&[("MQTT_QOS", "3")]).is_err());
    assert!(load(&[("BRIDGE_WORKERS", "0")]).is_err());
    assert!(load(&[("MQTT_TOPICS", " , ")]).is_err());
}

#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("MQTT_BROKER_HOST", "127.0.0.1");
        std::env::set_var("MQTT_RETRY_DELAY_SECONDS", "2");
    }

    let config = BridgeConfig::from_env().expect("config");
    assert_eq!(config.mqtt.host, "127.0.0.1");
    assert_eq!(config.mqtt.retry_delay, Duration::from_secs(2));
}
