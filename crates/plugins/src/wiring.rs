//! Extraction of the six typed channels from the property bag.

use {
    hive_telemetry::DataFlowGroup,
    tokio::sync::mpsc,
    tracing::debug,
};

use crate::{
    channels::{
        CHAT_CHANNEL, COMMAND_CHANNEL, ChannelGroups, ChannelHandle, ChatMsg, DATAFLOW_CHANNEL,
        DIRECTION_IN, DIRECTION_OUT, ERROR_CHANNEL, KernelCommand,
    },
    error::{Error, Result},
};

/// The plugin ends of every queue, typed.
#[derive(Debug)]
pub struct WiredChannels {
    pub command_in: mpsc::Receiver<KernelCommand>,
    pub command_out: mpsc::Sender<KernelCommand>,
    pub chat_in: mpsc::Receiver<ChatMsg>,
    pub chat_out: mpsc::Sender<ChatMsg>,
    pub error_out: mpsc::Sender<Error>,
    pub dataflow_out: mpsc::Sender<DataFlowGroup>,
}

fn take(groups: &mut ChannelGroups, direction: &str, purpose: &str) -> Result<ChannelHandle> {
    let group = groups
        .get_mut(direction)
        .ok_or_else(|| Error::wiring(format!("no {direction:?} channel group")))?;
    group
        .remove(purpose)
        .ok_or_else(|| Error::wiring(format!("no {direction}/{purpose} channel")))
}

fn mistyped(direction: &str, purpose: &str, expected: &str, found: &ChannelHandle) -> Error {
    Error::wiring(format!(
        "unsupported {direction}/{purpose} channel: expected {expected}, found {}",
        found.kind()
    ))
}

/// Validate and move out all six slots. Any missing or mistyped slot fails
/// the whole wiring; nothing is half-wired.
pub fn wire_channels(mut groups: ChannelGroups) -> Result<WiredChannels> {
    let command_in = match take(&mut groups, DIRECTION_IN, COMMAND_CHANNEL)? {
        ChannelHandle::CommandIn(rx) => rx,
        other => return Err(mistyped(DIRECTION_IN, COMMAND_CHANNEL, "command receiver", &other)),
    };
    debug!("command receiver wired");

    let chat_in = match take(&mut groups, DIRECTION_IN, CHAT_CHANNEL)? {
        ChannelHandle::ChatIn(rx) => rx,
        other => return Err(mistyped(DIRECTION_IN, CHAT_CHANNEL, "chat receiver", &other)),
    };
    debug!("chat receiver wired");

    let command_out = match take(&mut groups, DIRECTION_OUT, COMMAND_CHANNEL)? {
        ChannelHandle::CommandOut(tx) => tx,
        other => return Err(mistyped(DIRECTION_OUT, COMMAND_CHANNEL, "command sender", &other)),
    };
    debug!("command sender wired");

    let chat_out = match take(&mut groups, DIRECTION_OUT, CHAT_CHANNEL)? {
        ChannelHandle::ChatOut(tx) => tx,
        other => return Err(mistyped(DIRECTION_OUT, CHAT_CHANNEL, "chat sender", &other)),
    };
    debug!("chat sender wired");

    let dataflow_out = match take(&mut groups, DIRECTION_OUT, DATAFLOW_CHANNEL)? {
        ChannelHandle::DataflowOut(tx) => tx,
        other => {
            return Err(mistyped(
                DIRECTION_OUT,
                DATAFLOW_CHANNEL,
                "dataflow statistic sender",
                &other,
            ));
        },
    };
    debug!("dataflow statistic sender wired");

    let error_out = match take(&mut groups, DIRECTION_OUT, ERROR_CHANNEL)? {
        ChannelHandle::ErrorOut(tx) => tx,
        other => return Err(mistyped(DIRECTION_OUT, ERROR_CHANNEL, "error sender", &other)),
    };
    debug!("error sender wired");

    Ok(WiredChannels {
        command_in,
        command_out,
        chat_in,
        chat_out,
        error_out,
        dataflow_out,
    })
}
