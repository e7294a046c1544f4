//! Start/Stop of the plugin's RPC server and the ledger milestones that go
//! with them.
//!
//! Start and Stop are transitions of one state machine,
//! `Idle -> Starting -> Running -> Stopping -> Idle`. Each transition holds
//! the lifecycle lock from its first check to its last state write, so a
//! Stop issued right behind a Start waits for the Start to settle instead of
//! racing it. The lock is released before anything is sent to the host.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex as StdMutex, MutexGuard},
};

use {
    hive_config::{CertKeys, resolve_cert_pair},
    hive_telemetry::{DataFlowGroup, MODE_SUCCESS},
    tokio::{
        net::TcpListener,
        sync::{Mutex, OwnedMutexGuard, mpsc, watch},
        task::JoinHandle,
    },
    tokio_util::sync::CancellationToken,
    tracing::{Instrument, debug, info, warn},
};

use crate::{
    channels::KernelCommand,
    context::ConfigContext,
    dispatch::DispatchState,
    error::{Context as _, Error, Result},
    health::HealthReporter,
    options::PluginOptions,
    reporter,
    rpc::build_router,
};

/// Flow group of lifecycle milestones.
pub const FLOW_GROUP_SYSTEM: &str = "System";
pub const STATE_START_UP: &str = "Start up";
pub const STATE_CODE_START_UP: &str = "1";
pub const STATE_SHUTDOWN: &str = "Shutdown";
pub const STATE_CODE_SHUTDOWN: &str = "0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// A running RPC server.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Close the listener and wait for the serve task to finish.
    async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "serve task ended abnormally");
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    server: Option<ServerHandle>,
}

/// One attached plugin: its context plus the live server and ledger.
pub struct PluginInstance {
    pub(crate) context: ConfigContext,
    pub(crate) options: PluginOptions,
    health: HealthReporter,
    lifecycle: Arc<Mutex<Lifecycle>>,
    phase: watch::Sender<Phase>,
    pub(crate) ledger: StdMutex<Option<DataFlowGroup>>,
    pub(crate) emitter: mpsc::UnboundedSender<DataFlowGroup>,
    pub(crate) dispatch: watch::Sender<DispatchState>,
}

impl PluginInstance {
    /// Must be called inside a tokio runtime: the telemetry emitter is
    /// spawned here.
    pub(crate) fn new(context: ConfigContext, options: PluginOptions) -> Arc<Self> {
        let (emitter, queue) = mpsc::unbounded_channel();
        tokio::spawn(
            reporter::run_emitter(
                queue,
                context.channels.dataflow_out.clone(),
                options.persistence.clone(),
                context.argos_id.clone(),
            )
            .instrument(context.span.clone()),
        );
        let (phase, _) = watch::channel(Phase::Idle);
        let (dispatch, _) = watch::channel(DispatchState::Listening);
        Arc::new(Self {
            context,
            options,
            health: HealthReporter::new(),
            lifecycle: Arc::new(Mutex::new(Lifecycle::default())),
            phase,
            ledger: StdMutex::new(None),
            emitter,
            dispatch,
        })
    }

    pub fn context(&self) -> &ConfigContext {
        &self.context
    }

    pub fn health(&self) -> &HealthReporter {
        &self.health
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Address the RPC server is bound to, while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle
            .lock()
            .await
            .server
            .as_ref()
            .map(ServerHandle::local_addr)
    }

    /// Copy of the live ledger, if the plugin has started.
    pub fn ledger_snapshot(&self) -> Option<DataFlowGroup> {
        self.ledger_guard().clone()
    }

    pub(crate) fn ledger_guard(&self) -> MutexGuard<'_, Option<DataFlowGroup>> {
        match self.ledger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) async fn lock_lifecycle(&self) -> OwnedMutexGuard<Lifecycle> {
        Arc::clone(&self.lifecycle).lock_owned().await
    }

    fn set_phase(&self, phase: Phase) {
        debug!(?phase, "lifecycle phase");
        self.phase.send_replace(phase);
    }

    pub(crate) fn cert_keys(plugin_name: &str, options: &PluginOptions) -> CertKeys {
        let keys = CertKeys::for_plugin(plugin_name);
        match &options.default_certs {
            Some((cert, key)) => keys.with_defaults(cert.clone(), key.clone()),
            None => keys,
        }
    }

    /// Bring the RPC server up and record the "Start up" milestone.
    ///
    /// Failures are reported to the host and leave the plugin idle and
    /// startable. Starting a running plugin is a no-op.
    pub async fn start(self: &Arc<Self>, plugin_name: &str) {
        let lifecycle = self.lock_lifecycle().await;
        self.start_locked(lifecycle, plugin_name).await;
    }

    pub(crate) async fn start_locked(
        self: &Arc<Self>,
        mut lifecycle: OwnedMutexGuard<Lifecycle>,
        plugin_name: &str,
    ) {
        if lifecycle.server.is_some() {
            info!(plugin = plugin_name, "already running, ignoring start");
            return;
        }
        self.set_phase(Phase::Starting);

        let server = match self.bring_up(plugin_name).await {
            Ok(server) => server,
            Err(e) => {
                self.set_phase(Phase::Idle);
                drop(lifecycle);
                warn!(plugin = plugin_name, error = %e, "failed to start server");
                self.report(e).await;
                return;
            },
        };
        info!(plugin = plugin_name, addr = %server.local_addr, "server listening");
        lifecycle.server = Some(server);

        let snapshot = {
            let mut ledger = DataFlowGroup::new(self.context.argos_id.clone(), false);
            ledger.update(
                FLOW_GROUP_SYSTEM,
                plugin_name,
                STATE_START_UP,
                STATE_CODE_START_UP,
                MODE_SUCCESS,
            );
            let snapshot = self.finish_snapshot(&mut ledger);
            *self.ledger_guard() = Some(ledger);
            snapshot
        };
        self.set_phase(Phase::Running);
        drop(lifecycle);

        self.emit(snapshot);
    }

    async fn bring_up(self: &Arc<Self>, plugin_name: &str) -> Result<ServerHandle> {
        let common = self
            .context
            .common
            .resolve()
            .inspect_err(|e| warn!(error = %e, "missing common configs"))?;
        let pair = resolve_cert_pair(&self.context.certs, &self.context.cert_keys)?;
        let port = common.port()?;

        let tls = hive_tls::server_config_from_pem(&pair.cert, pair.key_bytes())?;
        let addr = format!("{}:{port}", common.grpc_server_host);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::bind(addr.clone(), e))?;
        let local_addr = listener.local_addr().context("reading listener address")?;

        let router = build_router(&self.health, &self.options.services).await;
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let instance = Arc::clone(self);
        let ack = KernelCommand::start(plugin_name);
        let task = tokio::spawn(
            async move {
                if instance.context.channels.command_out.send(ack).await.is_err() {
                    warn!("command channel closed, start not acknowledged");
                }
                if let Err(e) =
                    hive_tls::serve_tls(listener, Arc::new(tls), router, token).await
                {
                    warn!(error = %e, "failed to serve");
                    instance
                        .report(Error::Serve {
                            message: e.to_string(),
                        })
                        .await;
                }
            }
            .instrument(self.context.span.clone()),
        );

        Ok(ServerHandle {
            local_addr,
            shutdown,
            task,
        })
    }

    /// Bring the server down, record the "Shutdown" milestone and
    /// acknowledge to the host.
    ///
    /// Safe on a plugin that never started: nothing is recorded, the
    /// acknowledgment is still sent.
    pub async fn stop(self: &Arc<Self>, plugin_name: &str) {
        let lifecycle = self.lock_lifecycle().await;
        self.stop_locked(lifecycle, plugin_name).await;
    }

    pub(crate) async fn stop_locked(
        self: &Arc<Self>,
        mut lifecycle: OwnedMutexGuard<Lifecycle>,
        plugin_name: &str,
    ) {
        info!(plugin = plugin_name, "received shutdown message from kernel");

        match lifecycle.server.take() {
            Some(server) => {
                self.set_phase(Phase::Stopping);
                info!("stopping server");
                self.health.shutdown().await;
                server.stop().await;
                info!("stopped server");
            },
            None => info!("no server running"),
        }

        let snapshot = {
            let mut guard = self.ledger_guard();
            match guard.take() {
                Some(mut ledger) => {
                    ledger.update(
                        FLOW_GROUP_SYSTEM,
                        plugin_name,
                        STATE_SHUTDOWN,
                        STATE_CODE_SHUTDOWN,
                        MODE_SUCCESS,
                    );
                    Some(self.finish_snapshot(&mut ledger))
                },
                None => None,
            }
        };
        self.set_phase(Phase::Idle);
        drop(lifecycle);

        if let Some(snapshot) = snapshot {
            self.emit(snapshot);
        }
        if self
            .context
            .channels
            .command_out
            .send(KernelCommand::stop(plugin_name))
            .await
            .is_err()
        {
            warn!("command channel closed, stop not acknowledged");
        }
    }
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstance")
            .field("plugin", &self.context.plugin_name)
            .field("argos_id", &self.context.argos_id)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
