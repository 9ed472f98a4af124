//! Broker configuration read from string maps, such as environment-derived settings or a host's
//! per-link configuration.

use core::time::Duration;

use std::collections::HashMap;

use broker_core::Options;
use serde::{Deserialize, Serialize};

use crate::{ClientOptions, StanOptionsExt};

pub const CONFIG_STAN_CLUSTER_ID: &str = "cluster_id";
pub const CONFIG_STAN_URI: &str = "cluster_uris";
pub const CONFIG_STAN_RECONNECT: &str = "reconnect";
pub const CONFIG_STAN_CONNECT_TIMEOUT: &str = "connect_timeout";
pub const CONFIG_STAN_ACK_TIMEOUT: &str = "ack_timeout";
pub const CONFIG_STAN_PING_INTERVAL: &str = "ping_interval";
pub const CONFIG_STAN_MAX_PUB_ACKS_INFLIGHT: &str = "max_pub_acks_inflight";
pub const CONFIG_STAN_JS_DOMAIN: &str = "js_domain";

/// A configuration value that could not be parsed
#[derive(Debug, thiserror::Error)]
#[error("invalid value `{value}` for `{key}`: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

impl ConfigError {
    fn new(key: &'static str, value: &str, reason: impl ToString) -> Self {
        Self {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Settings for a streaming broker
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StanConfig {
    /// Streaming cluster to connect to
    #[serde(default)]
    pub cluster_id: Option<String>,

    /// Servers to connect to
    #[serde(default)]
    pub cluster_uris: Vec<String>,

    /// Re-establish the connection when it is lost
    #[serde(default)]
    pub reconnect: Option<bool>,

    #[serde(default, with = "humantime_serde_opt")]
    pub connect_timeout: Option<Duration>,

    #[serde(default, with = "humantime_serde_opt")]
    pub ack_timeout: Option<Duration>,

    #[serde(default, with = "humantime_serde_opt")]
    pub ping_interval: Option<Duration>,

    #[serde(default)]
    pub max_pub_acks_inflight: Option<usize>,

    /// JetStream domain, when the cluster is not in the local one
    #[serde(default)]
    pub js_domain: Option<String>,
}

impl StanConfig {
    /// Construct configuration from a string map. Durations use the humantime format,
    /// e.g. `5s` or `1m 30s`.
    pub fn from_map(values: &HashMap<String, String>) -> Result<StanConfig, ConfigError> {
        let mut config = StanConfig::default();

        if let Some(id) = values.get(CONFIG_STAN_CLUSTER_ID) {
            config.cluster_id = Some(id.clone());
        }
        if let Some(uris) = values.get(CONFIG_STAN_URI) {
            config.cluster_uris = uris
                .split(',')
                .map(str::trim)
                .filter(|uri| !uri.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(reconnect) = values.get(CONFIG_STAN_RECONNECT) {
            config.reconnect = Some(
                reconnect
                    .parse()
                    .map_err(|e| ConfigError::new(CONFIG_STAN_RECONNECT, reconnect, e))?,
            );
        }
        config.connect_timeout = parse_duration(values, CONFIG_STAN_CONNECT_TIMEOUT)?;
        config.ack_timeout = parse_duration(values, CONFIG_STAN_ACK_TIMEOUT)?;
        config.ping_interval = parse_duration(values, CONFIG_STAN_PING_INTERVAL)?;
        if let Some(max) = values.get(CONFIG_STAN_MAX_PUB_ACKS_INFLIGHT) {
            let max: usize = max
                .parse()
                .map_err(|e| ConfigError::new(CONFIG_STAN_MAX_PUB_ACKS_INFLIGHT, max, e))?;
            if max == 0 {
                return Err(ConfigError::new(
                    CONFIG_STAN_MAX_PUB_ACKS_INFLIGHT,
                    "0",
                    "must be greater than zero",
                ));
            }
            config.max_pub_acks_inflight = Some(max);
        }
        if let Some(domain) = values.get(CONFIG_STAN_JS_DOMAIN) {
            config.js_domain = Some(domain.clone());
        }

        Ok(config)
    }

    /// Merge with another configuration, fields set in `extra` override ours
    pub fn merge(&self, extra: &StanConfig) -> StanConfig {
        let mut out = self.clone();
        if extra.cluster_id.is_some() {
            out.cluster_id.clone_from(&extra.cluster_id);
        }
        // Replace rather than combine, two URI lists may name unrelated clusters
        if !extra.cluster_uris.is_empty() {
            out.cluster_uris.clone_from(&extra.cluster_uris);
        }
        if extra.reconnect.is_some() {
            out.reconnect = extra.reconnect;
        }
        if extra.connect_timeout.is_some() {
            out.connect_timeout = extra.connect_timeout;
        }
        if extra.ack_timeout.is_some() {
            out.ack_timeout = extra.ack_timeout;
        }
        if extra.ping_interval.is_some() {
            out.ping_interval = extra.ping_interval;
        }
        if extra.max_pub_acks_inflight.is_some() {
            out.max_pub_acks_inflight = extra.max_pub_acks_inflight;
        }
        if extra.js_domain.is_some() {
            out.js_domain.clone_from(&extra.js_domain);
        }
        out
    }

    /// Write the configuration into broker options. Settings not present here are left as
    /// they are in `opts`.
    pub fn apply(&self, mut opts: Options) -> Options {
        if !self.cluster_uris.is_empty() {
            opts.addrs.clone_from(&self.cluster_uris);
        }
        if let Some(id) = &self.cluster_id {
            opts = opts.cluster_id(id.clone());
        }
        if let Some(reconnect) = self.reconnect {
            opts = opts.reconnect(reconnect);
        }
        if let Some(timeout) = self.connect_timeout {
            opts = opts.connect_timeout(timeout);
        }
        let mut client = opts
            .context
            .value::<ClientOptions>()
            .map(|ClientOptions(client)| client.clone())
            .unwrap_or_default();
        if let Some(ack_timeout) = self.ack_timeout {
            client.ack_timeout = ack_timeout;
        }
        if let Some(ping_interval) = self.ping_interval {
            client.ping_interval = ping_interval;
        }
        if let Some(max) = self.max_pub_acks_inflight {
            client.max_pub_acks_inflight = max;
        }
        if self.js_domain.is_some() {
            client.js_domain.clone_from(&self.js_domain);
        }
        opts.client_options(client)
    }
}

fn parse_duration(
    values: &HashMap<String, String>,
    key: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    values
        .get(key)
        .map(|value| humantime::parse_duration(value).map_err(|e| ConfigError::new(key, value, e)))
        .transpose()
}

/// (De)serialize optional durations as humantime strings
mod humantime_serde_opt {
    use core::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_str(&humantime::format_duration(*d).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|s| humantime::parse_duration(&s).map_err(de::Error::custom))
            .transpose()
    }
}
