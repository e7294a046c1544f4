//! Per-plugin configuration context, built once from the property bag.

use std::{collections::HashMap, sync::Mutex};

use {
    hive_common::sanitize_for_logging,
    hive_config::{COMMON_PATH, CertKeys, CommonConfigSource},
    hive_telemetry::DataFlowGroup,
    tokio::sync::mpsc,
    tracing::{Span, debug, info_span, warn},
};

use crate::{
    channels::{ChatMsg, KernelCommand},
    error::{Error, Result},
    properties::{ARGOS_ID_KEY, CHANNELS_KEY, LOG_KEY, PropertyBag, PropertyValue},
    wiring::{WiredChannels, wire_channels},
};

/// Senders back to the host plus the chat receiver the plugin holds.
#[derive(Debug)]
pub struct ContextChannels {
    pub command_out: mpsc::Sender<KernelCommand>,
    pub chat_out: mpsc::Sender<ChatMsg>,
    pub error_out: mpsc::Sender<Error>,
    pub dataflow_out: mpsc::Sender<DataFlowGroup>,
    chat_in: Mutex<Option<mpsc::Receiver<ChatMsg>>>,
}

impl ContextChannels {
    /// Hand the chat receiver to whoever consumes chat. Only the first call
    /// gets it.
    pub fn take_chat_receiver(&self) -> Option<mpsc::Receiver<ChatMsg>> {
        match self.chat_in.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

/// Everything one plugin instance reads from its host.
#[derive(Debug)]
pub struct ConfigContext {
    pub plugin_name: String,
    /// Identifier statistics are filed and named under.
    pub argos_id: String,
    pub common: CommonConfigSource,
    pub cert_keys: CertKeys,
    /// Certificate and key blobs, by property key.
    pub certs: HashMap<String, Vec<u8>>,
    /// Logger for this plugin. Lifecycle work runs inside it.
    pub span: Span,
    pub channels: ContextChannels,
}

impl ConfigContext {
    /// Build the context and split off the command receiver for the
    /// dispatch loop.
    pub fn from_properties(
        plugin_name: &str,
        mut properties: PropertyBag,
        cert_keys: CertKeys,
    ) -> Result<(Self, mpsc::Receiver<KernelCommand>)> {
        let argos_id = match properties.remove(ARGOS_ID_KEY) {
            Some(PropertyValue::Text(id)) => id,
            Some(other) => {
                warn!(kind = other.kind(), "ignoring non-text argos id");
                plugin_name.to_string()
            },
            None => plugin_name.to_string(),
        };

        let span = match properties.remove(LOG_KEY) {
            Some(PropertyValue::Logger(span)) => span,
            _ => info_span!(
                "plugin",
                plugin = %sanitize_for_logging(plugin_name),
                argos_id = %sanitize_for_logging(&argos_id)
            ),
        };
        let entered = span.enter();

        let certs = properties.take_blobs(|key| cert_keys.matches(key));
        debug!(count = certs.len(), "collected certificate material");

        let common = match properties.remove(COMMON_PATH) {
            Some(PropertyValue::Map(map)) => CommonConfigSource::Map(map),
            Some(PropertyValue::Bytes(bytes)) => CommonConfigSource::Raw(bytes),
            Some(other) => {
                return Err(Error::missing_property(format!(
                    "{COMMON_PATH} must be a map or bytes, found {}",
                    other.kind()
                )));
            },
            None => return Err(Error::missing_property("common config components")),
        };

        let groups = match properties.remove(CHANNELS_KEY) {
            Some(PropertyValue::Channels(groups)) => groups,
            Some(other) => {
                return Err(Error::wiring(format!(
                    "channel map has the wrong type: {}",
                    other.kind()
                )));
            },
            None => return Err(Error::wiring("no channels passed")),
        };
        let WiredChannels {
            command_in,
            command_out,
            chat_in,
            chat_out,
            error_out,
            dataflow_out,
        } = wire_channels(groups)?;

        drop(entered);
        let context = Self {
            plugin_name: plugin_name.to_string(),
            argos_id,
            common,
            cert_keys,
            certs,
            span,
            channels: ContextChannels {
                command_out,
                chat_out,
                error_out,
                dataflow_out,
                chat_in: Mutex::new(Some(chat_in)),
            },
        };
        Ok((context, command_in))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::channels::channel_bundle,
        hive_config::{CommonConfig, DEFAULT_CERT_KEY},
    };

    fn bag() -> (crate::channels::HostChannels, PropertyBag) {
        let (host, groups) = channel_bundle(4);
        let bag = PropertyBag::new()
            .with_common_config(CommonConfig::with_port(0u16))
            .with_blob("./p1.crt", "cert")
            .with_blob("./p1key.key", "key")
            .with_blob(DEFAULT_CERT_KEY, "shared")
            .with_blob("./p2.crt", "someone else's")
            .with_channels(groups);
        (host, bag)
    }

    #[test]
    fn builds_context_and_keeps_only_own_certs() {
        let (_host, bag) = bag();
        let (ctx, _commands) =
            ConfigContext::from_properties("p1", bag, CertKeys::for_plugin("p1")).unwrap();
        assert_eq!(ctx.plugin_name, "p1");
        assert_eq!(ctx.argos_id, "p1");
        assert_eq!(ctx.certs.len(), 3);
        assert!(!ctx.certs.contains_key("./p2.crt"));
        assert!(ctx.channels.take_chat_receiver().is_some());
        assert!(ctx.channels.take_chat_receiver().is_none());
    }

    #[test]
    fn argos_id_comes_from_the_bag() {
        let (_host, bag) = bag();
        let bag = bag.with_argos_id("argos-7");
        let (ctx, _) =
            ConfigContext::from_properties("p1", bag, CertKeys::for_plugin("p1")).unwrap();
        assert_eq!(ctx.argos_id, "argos-7");
    }

    #[test]
    fn missing_common_config_fails() {
        let (_host, mut bag) = bag();
        bag.remove(COMMON_PATH);
        let err = ConfigContext::from_properties("p1", bag, CertKeys::for_plugin("p1")).unwrap_err();
        assert!(matches!(err, Error::MissingProperty { .. }));
    }

    #[test]
    fn missing_channel_map_fails() {
        let (_host, mut bag) = bag();
        bag.remove(CHANNELS_KEY);
        let err = ConfigContext::from_properties("p1", bag, CertKeys::for_plugin("p1")).unwrap_err();
        assert!(matches!(err, Error::Wiring { .. }));
    }
}
