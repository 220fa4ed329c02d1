//! 运行时配置
//!
//! 由外部加载器反序列化或以 builder 构造；缺省值可直接用于单进程部署。
//!
use bon::Builder;
use esactor_domain::persist::{RetryPolicy, SnapshotPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 请求/应答的默认超时
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 5_000;

/// 进程内最多常驻的聚合数
pub const DEFAULT_MAX_CACHED_AGGREGATES: usize = 1_048_576;

/// 本地投递不做编码，直接移交值
pub const PASSTHROUGH_CODEC: &str = "passthrough";

/// 随每次发送附带的投递选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryOptions {
    pub codec: String,
    pub send_timeout_ms: u64,
}

impl DeliveryOptions {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout_ms = timeout.as_millis() as u64;
        self
    }
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            codec: PASSTHROUGH_CODEC.to_string(),
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// 集群地址前缀 `{node_id}::{address}`
    #[builder(default = DEFAULT_NODE_ID.to_string(), into)]
    pub node_id: String,
    #[builder(default)]
    pub delivery: DeliveryOptions,
    #[builder(default = DEFAULT_MAX_CACHED_AGGREGATES)]
    pub max_cached_aggregates: usize,
    #[builder(default)]
    pub snapshot_policy: SnapshotPolicy,
    #[builder(default)]
    pub retry_policy: RetryPolicy,
    /// 聚合直连地址前缀，缺省时地址即聚合 id
    #[builder(into)]
    pub address_prefix: Option<String>,
}

pub const DEFAULT_NODE_ID: &str = "local";

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.node_id, "local");
        assert_eq!(config.delivery.codec, PASSTHROUGH_CODEC);
        assert_eq!(config.delivery.send_timeout(), Duration::from_millis(5_000));
        assert_eq!(config.max_cached_aggregates, 1_048_576);
        assert_eq!(config.snapshot_policy, SnapshotPolicy::Never);
        assert_eq!(config.retry_policy, RetryPolicy::None);
        assert!(config.address_prefix.is_none());
    }

    #[test]
    fn partial_document_falls_back_to_defaults() {
        let config: RuntimeConfig = serde_json::from_value(serde_json::json!({
            "node_id": "node-7",
            "delivery": { "send_timeout_ms": 250 },
            "snapshot_policy": { "every": 50 },
            "retry_policy": { "kind": "fixed", "attempts": 3, "delay_ms": 10 }
        }))
        .unwrap();

        assert_eq!(config.node_id, "node-7");
        assert_eq!(config.delivery.codec, PASSTHROUGH_CODEC);
        assert_eq!(config.delivery.send_timeout(), Duration::from_millis(250));
        assert_eq!(config.snapshot_policy, SnapshotPolicy::Every(50));
        assert_eq!(
            config.retry_policy,
            RetryPolicy::Fixed {
                attempts: 3,
                delay_ms: 10
            }
        );
        assert_eq!(config.max_cached_aggregates, DEFAULT_MAX_CACHED_AGGREGATES);
    }

    #[test]
    fn builder_overrides() {
        let config = RuntimeConfig::builder()
            .node_id("n1")
            .max_cached_aggregates(2)
            .address_prefix("orders")
            .build();
        assert_eq!(config.node_id, "n1");
        assert_eq!(config.max_cached_aggregates, 2);
        assert_eq!(config.address_prefix.as_deref(), Some("orders"));
    }
}
