//! Common config block shared by all plugins attached to one host.

use std::collections::BTreeMap;

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
    tracing::debug,
};

use crate::error::{Error, Result};

/// Property key under which the host hands over the common config block.
pub const COMMON_PATH: &str = "./config.yml";

/// Key of the listen port inside the common config block.
pub const PORT_KEY: &str = "grpc_server_port";

fn default_host() -> String {
    "0.0.0.0".into()
}

/// Listen port as it appears in configuration: YAML writers emit either a
/// bare integer or a quoted string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(i64),
    Text(String),
}

impl PortValue {
    /// Resolve to a bindable TCP port. Port 0 asks the OS for an ephemeral
    /// port.
    pub fn resolve(&self) -> Result<u16> {
        match self {
            Self::Number(n) => u16::try_from(*n)
                .map_err(|_| Error::invalid_port(n.to_string(), "out of range for a TCP port")),
            Self::Text(s) => {
                let n: i64 = s
                    .trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| Error::invalid_port(s, e.to_string()))?;
                u16::try_from(n).map_err(|_| Error::invalid_port(s, "out of range for a TCP port"))
            },
        }
    }
}

impl From<u16> for PortValue {
    fn from(port: u16) -> Self {
        Self::Number(i64::from(port))
    }
}

/// Typed view of the common config block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_server_port: Option<PortValue>,
    #[serde(default = "default_host")]
    pub grpc_server_host: String,
    /// Plugin-specific keys this crate does not interpret.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            grpc_server_port: None,
            grpc_server_host: default_host(),
            extra: BTreeMap::new(),
        }
    }
}

impl CommonConfig {
    pub fn with_port(port: impl Into<PortValue>) -> Self {
        Self {
            grpc_server_port: Some(port.into()),
            ..Self::default()
        }
    }

    pub fn from_yaml_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_yaml::from_slice(bytes)?)
    }

    pub fn from_map(map: Map<String, Value>) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(map))?)
    }

    /// The configured listen port, validated.
    pub fn port(&self) -> Result<u16> {
        self.grpc_server_port
            .as_ref()
            .ok_or(Error::MissingPort)?
            .resolve()
    }
}

/// The common config block as delivered by the host: either already parsed
/// into a map, or raw YAML bytes still to be deserialized.
#[derive(Debug, Clone)]
pub enum CommonConfigSource {
    Map(Map<String, Value>),
    Raw(Vec<u8>),
}

impl CommonConfigSource {
    pub fn resolve(&self) -> Result<CommonConfig> {
        match self {
            Self::Map(map) => CommonConfig::from_map(map.clone()),
            Self::Raw(bytes) => {
                debug!(len = bytes.len(), "parsing serialized common config");
                CommonConfig::from_yaml_bytes(bytes)
            },
        }
    }
}

impl From<CommonConfig> for CommonConfigSource {
    fn from(config: CommonConfig) -> Self {
        match serde_json::to_value(config) {
            Ok(Value::Object(map)) => Self::Map(map),
            _ => Self::Map(Map::new()),
        }
    }
}
