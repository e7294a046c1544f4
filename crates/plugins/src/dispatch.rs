//! The command dispatch loop: the single consumer of host commands.

use std::sync::Arc;

use {
    hive_common::sanitize_for_logging,
    tokio::sync::mpsc,
    tracing::{Instrument, debug, info, warn},
};

use crate::{
    channels::{KernelCommand, PluginEvent},
    error::Error,
    lifecycle::PluginInstance,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Listening,
    Terminated,
}

/// Consume commands until STOP arrives or the host drops the command queue.
///
/// Start and Stop run as background tasks. The lifecycle lock is taken here,
/// in receipt order, before each task is spawned, so their effects apply in
/// the order the host sent them.
pub(crate) async fn run(instance: Arc<PluginInstance>, mut commands: mpsc::Receiver<KernelCommand>) {
    info!("command receiver initialized");
    while let Some(KernelCommand {
        plugin_name,
        command,
    }) = commands.recv().await
    {
        match command {
            PluginEvent::Start => {
                debug!(plugin = %sanitize_for_logging(&plugin_name), "start requested");
                let lifecycle = instance.lock_lifecycle().await;
                let task_instance = Arc::clone(&instance);
                tokio::spawn(
                    async move { task_instance.start_locked(lifecycle, &plugin_name).await }
                        .instrument(instance.context.span.clone()),
                );
            },
            PluginEvent::Stop => {
                debug!(plugin = %sanitize_for_logging(&plugin_name), "stop requested");
                let lifecycle = instance.lock_lifecycle().await;
                let task_instance = Arc::clone(&instance);
                let stopping = plugin_name.clone();
                tokio::spawn(
                    async move { task_instance.stop_locked(lifecycle, &stopping).await }
                        .instrument(instance.context.span.clone()),
                );
                let sentinel = Error::ShuttingDown {
                    plugin: plugin_name,
                };
                if instance
                    .context
                    .channels
                    .error_out
                    .send(sentinel)
                    .await
                    .is_err()
                {
                    warn!("error channel closed, shutdown sentinel not delivered");
                }
                break;
            },
            PluginEvent::Status => debug!("status requested"),
            PluginEvent::Unknown => debug!("ignoring unknown command"),
        }
    }
    info!("command receiver terminated");
    instance.dispatch.send_replace(DispatchState::Terminated);
}

impl PluginInstance {
    pub fn dispatch_state(&self) -> DispatchState {
        *self.dispatch.borrow()
    }

    /// Wait for the dispatch loop to end.
    pub async fn terminated(&self) {
        let mut rx = self.dispatch.subscribe();
        let _ = rx.wait_for(|s| *s == DispatchState::Terminated).await;
    }
}
