//! Messages exchanged between host and plugin, and the queues that carry
//! them.
//!
//! The host owns every queue. It keeps one end of each and hands the other
//! to the plugin inside the property bag, nested by direction and then by
//! purpose.

use std::collections::HashMap;

use {
    hive_telemetry::DataFlowGroup,
    serde::{Deserialize, Serialize},
    tokio::sync::mpsc,
};

use crate::error::Error;

pub const DIRECTION_IN: &str = "in";
pub const DIRECTION_OUT: &str = "out";

pub const COMMAND_CHANNEL: &str = "command";
pub const CHAT_CHANNEL: &str = "chat";
pub const ERROR_CHANNEL: &str = "error";
pub const DATAFLOW_CHANNEL: &str = "dataflow-stat";

/// Default queue depth used by [`channel_bundle`].
pub const DEFAULT_CAPACITY: usize = 32;

/// Lifecycle command understood by the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PluginEvent {
    Start,
    Stop,
    Status,
    /// Anything a newer host may send. Ignored.
    #[serde(other)]
    Unknown,
}

/// One command from the host, or an acknowledgment back to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KernelCommand {
    pub plugin_name: String,
    pub command: PluginEvent,
}

impl KernelCommand {
    pub fn new(plugin_name: impl Into<String>, command: PluginEvent) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            command,
        }
    }

    pub fn start(plugin_name: impl Into<String>) -> Self {
        Self::new(plugin_name, PluginEvent::Start)
    }

    pub fn stop(plugin_name: impl Into<String>) -> Self {
        Self::new(plugin_name, PluginEvent::Stop)
    }
}

/// Chat traffic routed through the host. Plugins in this crate hold the
/// chat queues but do not consume them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMsg {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

/// Plugin-side end of one queue, as stored in the property bag.
#[derive(Debug)]
pub enum ChannelHandle {
    CommandIn(mpsc::Receiver<KernelCommand>),
    CommandOut(mpsc::Sender<KernelCommand>),
    ChatIn(mpsc::Receiver<ChatMsg>),
    ChatOut(mpsc::Sender<ChatMsg>),
    ErrorOut(mpsc::Sender<Error>),
    DataflowOut(mpsc::Sender<DataFlowGroup>),
}

impl ChannelHandle {
    /// Short description used in wiring diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CommandIn(_) => "command receiver",
            Self::CommandOut(_) => "command sender",
            Self::ChatIn(_) => "chat receiver",
            Self::ChatOut(_) => "chat sender",
            Self::ErrorOut(_) => "error sender",
            Self::DataflowOut(_) => "dataflow statistic sender",
        }
    }
}

/// `direction -> purpose -> handle`.
pub type ChannelGroups = HashMap<String, HashMap<String, ChannelHandle>>;

/// Host-side ends of the six queues.
#[derive(Debug)]
pub struct HostChannels {
    /// Commands to the plugin.
    pub commands: mpsc::Sender<KernelCommand>,
    /// Acknowledgments from the plugin.
    pub acks: mpsc::Receiver<KernelCommand>,
    pub chat_to_plugin: mpsc::Sender<ChatMsg>,
    pub chat_from_plugin: mpsc::Receiver<ChatMsg>,
    pub errors: mpsc::Receiver<Error>,
    pub dataflow: mpsc::Receiver<DataFlowGroup>,
}

/// Create all six queues with `capacity` slots each. Returns the host ends
/// and the plugin ends grouped for the property bag.
pub fn channel_bundle(capacity: usize) -> (HostChannels, ChannelGroups) {
    let (command_tx, command_rx) = mpsc::channel(capacity);
    let (ack_tx, ack_rx) = mpsc::channel(capacity);
    let (chat_in_tx, chat_in_rx) = mpsc::channel(capacity);
    let (chat_out_tx, chat_out_rx) = mpsc::channel(capacity);
    let (error_tx, error_rx) = mpsc::channel(capacity);
    let (dataflow_tx, dataflow_rx) = mpsc::channel(capacity);

    let inbound = HashMap::from([
        (COMMAND_CHANNEL.to_string(), ChannelHandle::CommandIn(command_rx)),
        (CHAT_CHANNEL.to_string(), ChannelHandle::ChatIn(chat_in_rx)),
    ]);
    let outbound = HashMap::from([
        (COMMAND_CHANNEL.to_string(), ChannelHandle::CommandOut(ack_tx)),
        (CHAT_CHANNEL.to_string(), ChannelHandle::ChatOut(chat_out_tx)),
        (ERROR_CHANNEL.to_string(), ChannelHandle::ErrorOut(error_tx)),
        (DATAFLOW_CHANNEL.to_string(), ChannelHandle::DataflowOut(dataflow_tx)),
    ]);
    let groups = HashMap::from([
        (DIRECTION_IN.to_string(), inbound),
        (DIRECTION_OUT.to_string(), outbound),
    ]);

    let host = HostChannels {
        commands: command_tx,
        acks: ack_rx,
        chat_to_plugin: chat_in_tx,
        chat_from_plugin: chat_out_rx,
        errors: error_rx,
        dataflow: dataflow_rx,
    };
    (host, groups)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_wire_shape() {
        let cmd = KernelCommand::start("p1");
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            serde_json::json!({"pluginName": "p1", "command": "START"})
        );
    }

    #[test]
    fn unknown_commands_decode_as_unknown() {
        let cmd: KernelCommand =
            serde_json::from_str(r#"{"pluginName":"p1","command":"RELOAD"}"#).unwrap();
        assert_eq!(cmd.command, PluginEvent::Unknown);
    }

    #[test]
    fn bundle_has_six_slots() {
        let (_host, groups) = channel_bundle(1);
        assert_eq!(groups[DIRECTION_IN].len(), 2);
        assert_eq!(groups[DIRECTION_OUT].len(), 4);
        assert_eq!(groups[DIRECTION_IN][COMMAND_CHANNEL].kind(), "command receiver");
        assert_eq!(
            groups[DIRECTION_OUT][DATAFLOW_CHANNEL].kind(),
            "dataflow statistic sender"
        );
    }

    #[tokio::test]
    async fn host_commands_reach_the_plugin_end() {
        let (host, mut groups) = channel_bundle(1);
        let Some(ChannelHandle::CommandIn(mut rx)) = groups
            .get_mut(DIRECTION_IN)
            .and_then(|g| g.remove(COMMAND_CHANNEL))
        else {
            panic!("command receiver missing");
        };
        host.commands.send(KernelCommand::stop("p1")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), KernelCommand::stop("p1"));
    }
}
