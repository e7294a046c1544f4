//! The property bag a host hands to a plugin at attach time.

use std::collections::HashMap;

use {
    hive_config::{COMMON_PATH, CommonConfig, CommonConfigSource},
    serde_json::{Map, Value},
    tracing::Span,
};

use crate::channels::ChannelGroups;

/// Key of the host-provided logging span.
pub const LOG_KEY: &str = "log";
/// Key of the nested channel map.
pub const CHANNELS_KEY: &str = "pluginEventChannelsMap";
/// Key of the identifier statistics are filed under.
pub const ARGOS_ID_KEY: &str = "argosId";

/// One value in the bag.
#[derive(Debug)]
pub enum PropertyValue {
    /// Raw blob: serialized config, certificate or key.
    Bytes(Vec<u8>),
    /// Config already parsed by the host.
    Map(Map<String, Value>),
    Text(String),
    Logger(Span),
    Channels(ChannelGroups),
}

impl PropertyValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "bytes",
            Self::Map(_) => "map",
            Self::Text(_) => "text",
            Self::Logger(_) => "logger",
            Self::Channels(_) => "channels",
        }
    }
}

/// Untyped bag of named attach-time values.
///
/// Consumed once by [`crate::init`], which turns it into a typed
/// [`crate::ConfigContext`].
#[derive(Debug, Default)]
pub struct PropertyBag {
    values: HashMap<String, PropertyValue>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: PropertyValue) -> Option<PropertyValue> {
        self.values.insert(key.into(), value)
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.insert(key, value);
        self
    }

    /// Set the common config block from a typed config.
    #[must_use]
    pub fn with_common_config(self, config: CommonConfig) -> Self {
        match CommonConfigSource::from(config) {
            CommonConfigSource::Map(map) => self.with(COMMON_PATH, PropertyValue::Map(map)),
            CommonConfigSource::Raw(bytes) => self.with(COMMON_PATH, PropertyValue::Bytes(bytes)),
        }
    }

    /// Set the common config block as serialized YAML.
    #[must_use]
    pub fn with_common_yaml(self, yaml: impl Into<Vec<u8>>) -> Self {
        self.with(COMMON_PATH, PropertyValue::Bytes(yaml.into()))
    }

    #[must_use]
    pub fn with_blob(self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.with(key, PropertyValue::Bytes(bytes.into()))
    }

    #[must_use]
    pub fn with_logger(self, span: Span) -> Self {
        self.with(LOG_KEY, PropertyValue::Logger(span))
    }

    #[must_use]
    pub fn with_argos_id(self, id: impl Into<String>) -> Self {
        self.with(ARGOS_ID_KEY, PropertyValue::Text(id.into()))
    }

    #[must_use]
    pub fn with_channels(self, groups: ChannelGroups) -> Self {
        self.with(CHANNELS_KEY, PropertyValue::Channels(groups))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.values.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.values.remove(key)
    }

    /// Remove every byte blob whose key satisfies `keep`.
    pub fn take_blobs(&mut self, keep: impl Fn(&str) -> bool) -> HashMap<String, Vec<u8>> {
        let keys: Vec<String> = self
            .values
            .iter()
            .filter(|(k, v)| keep(k.as_str()) && matches!(v, PropertyValue::Bytes(_)))
            .map(|(k, _)| k.clone())
            .collect();
        keys.into_iter()
            .filter_map(|k| match self.values.remove(&k) {
                Some(PropertyValue::Bytes(bytes)) => Some((k, bytes)),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_blobs_moves_only_matching_bytes() {
        let mut bag = PropertyBag::new()
            .with_blob("./p1.crt", "cert")
            .with_blob("./other.crt", "other")
            .with("./p1.key-note", PropertyValue::Text("not bytes".into()))
            .with_common_yaml("grpc_server_port: 1\n");

        let blobs = bag.take_blobs(|k| k.starts_with("./p1"));
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs.get("./p1.crt").map(Vec::as_slice), Some(&b"cert"[..]));
        assert!(bag.contains_key("./other.crt"));
        assert!(bag.contains_key("./p1.key-note"));
        assert!(bag.contains_key(COMMON_PATH));
    }

    #[test]
    fn typed_common_config_is_stored_as_map() {
        let bag = PropertyBag::new().with_common_config(CommonConfig::with_port(9443u16));
        assert_eq!(bag.get(COMMON_PATH).map(PropertyValue::kind), Some("map"));
    }
}
