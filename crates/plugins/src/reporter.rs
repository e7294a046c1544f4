//! Failure reporting and the telemetry emitter.
//!
//! Finalized ledger snapshots go through one queue per plugin, drained by a
//! background task that persists each snapshot and hands it to a forwarder
//! for the dataflow channel. A host that stops reading dataflow stalls only
//! the forwarder; persistence keeps up. Callers never wait on either.

use {
    hive_common::sanitize_for_logging,
    hive_telemetry::{DataFlowGroup, FAILURE_SENTINEL, MODE_FAILURE},
    tokio::sync::mpsc,
    tracing::{Instrument, Span, debug, info, warn},
};

use crate::{error::Error, lifecycle::PluginInstance, options::Persistence};

impl PluginInstance {
    /// Record `err` against the open ledger entry, emit the finalized
    /// ledger, then hand `err` to the host.
    ///
    /// The error send is the only send that waits for the host; telemetry is
    /// queued before it, so the host sees the failure entry first.
    pub async fn report(&self, err: Error) {
        let error_out = &self.context.channels.error_out;
        if error_out.is_closed() {
            warn!(error = %err, "error channel closed, dropping error");
            return;
        }

        let snapshot = {
            let mut guard = self.ledger_guard();
            match guard.as_mut() {
                Some(ledger) => match ledger.deliver_context() {
                    Ok(ctx) => {
                        ledger.update(
                            &ctx.flow_group,
                            &ctx.flow_name,
                            &failure_state_name(&ctx.state_name),
                            &ctx.state_code,
                            MODE_FAILURE,
                        );
                        Some(self.finish_snapshot(ledger))
                    },
                    Err(e) => {
                        warn!(error = %e, "failed to get dataflow statistic context");
                        None
                    },
                },
                None => None,
            }
        };
        if let Some(snapshot) = snapshot {
            info!(ledger = %snapshot.name, "sending failed dataflow statistic to kernel");
            self.emit(snapshot);
        }

        if let Err(e) = error_out.send(err).await {
            warn!(
                error = %sanitize_for_logging(&e.0.to_string()),
                "error channel closed before the error was delivered"
            );
        }
    }

    /// Name the ledger after the plugin's argos id, close it and copy it for
    /// emission.
    pub(crate) fn finish_snapshot(&self, ledger: &mut DataFlowGroup) -> DataFlowGroup {
        ledger.name = self.context.argos_id.clone();
        ledger.finish();
        ledger.clone()
    }

    /// Queue a snapshot for persistence and delivery.
    pub(crate) fn emit(&self, snapshot: DataFlowGroup) {
        if self.emitter.send(snapshot).is_err() {
            debug!("telemetry emitter stopped, dropping dataflow statistic");
        }
    }
}

/// Name of the failure entry recorded against an open state. Repeated
/// failures of the same state keep a single marker.
fn failure_state_name(state_name: &str) -> String {
    if state_name.contains(FAILURE_SENTINEL) {
        state_name.to_string()
    } else {
        format!("{state_name} {FAILURE_SENTINEL}")
    }
}

pub(crate) async fn run_emitter(
    mut queue: mpsc::UnboundedReceiver<DataFlowGroup>,
    dataflow_out: mpsc::Sender<DataFlowGroup>,
    persistence: Option<Persistence>,
    id: String,
) {
    let (stream, pending) = mpsc::unbounded_channel();
    tokio::spawn(forward(pending, dataflow_out).instrument(Span::current()));

    while let Some(ledger) = queue.recv().await {
        if let Some(target) = &persistence {
            let summary = ledger
                .persist(target.store.as_ref(), &target.base_path, &target.id_name, &id)
                .await;
            if summary.failed > 0 {
                warn!(
                    written = summary.written,
                    failed = summary.failed,
                    "dataflow statistics partially persisted"
                );
            }
        }
        if stream.send(ledger).is_err() {
            debug!("dataflow forwarder stopped");
        }
    }
}

/// Deliver snapshots to the host in emission order.
async fn forward(
    mut pending: mpsc::UnboundedReceiver<DataFlowGroup>,
    dataflow_out: mpsc::Sender<DataFlowGroup>,
) {
    while let Some(ledger) = pending.recv().await {
        debug!(ledger = %ledger.name, "sending dataflow statistic to kernel");
        if dataflow_out.send(ledger).await.is_err() {
            debug!("dataflow channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_marker_is_not_repeated() {
        assert_eq!(failure_state_name("Start up"), "Start up Failure");
        assert_eq!(failure_state_name("Start up Failure"), "Start up Failure");
    }
}
