use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    anyhow::{Context, bail},
    clap::Args,
    hive_config::{CertKeys, CommonConfig, PortValue},
    hive_plugins::{
        HostChannels, IntegrityCheck, KernelCommand, LogDigest, ManifestDigest, Persistence,
        PluginOptions, PropertyBag, channel_bundle, init_with_options,
    },
    hive_telemetry::{DataFlowGroup, MemoryStatStore, SqliteStatStore, StatStore},
    tokio::{sync::mpsc, task::JoinHandle},
    tracing::{info, warn},
};

#[derive(Args)]
pub struct RunArgs {
    /// Plugin name.
    #[arg(long, default_value = "healthcheck")]
    plugin: String,
    /// Identifier statistics are recorded under. Defaults to the plugin name.
    #[arg(long)]
    argos_id: Option<String>,
    /// Common config YAML. Overrides --host and --port.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// Listen port; 0 picks a free one.
    #[arg(long, default_value_t = 0)]
    port: u16,
    /// PEM certificate. A throwaway CA and server certificate are generated
    /// when omitted.
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,
    /// SQLite database statistics are written to. Kept in memory when
    /// omitted.
    #[arg(long)]
    db: Option<PathBuf>,
    /// Plugin artifact to hash before attaching.
    #[arg(long)]
    artifact: Option<PathBuf>,
    /// Expected SHA-256 of --artifact. Only logged when omitted.
    #[arg(long, requires = "artifact")]
    sha256: Option<String>,
    /// Seconds to keep the plugin running; 0 waits for Ctrl-C.
    #[arg(long, default_value_t = 0)]
    hold_secs: u64,
}

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let keys = CertKeys::for_plugin(&args.plugin);
    let (cert, key) = match (&args.cert, &args.key) {
        (Some(cert), Some(key)) => (
            std::fs::read(cert).with_context(|| format!("reading {}", cert.display()))?,
            std::fs::read(key).with_context(|| format!("reading {}", key.display()))?,
        ),
        _ => {
            let dev = hive_tls::generate_dev_certs("localhost")?;
            println!("Trust this CA to call the plugin:\n{}", dev.ca_cert);
            (dev.server_cert.into_bytes(), dev.server_key.into_bytes())
        },
    };

    let (host, groups) = channel_bundle(hive_plugins::DEFAULT_CAPACITY);
    let mut bag = PropertyBag::new()
        .with_blob(keys.cert, cert)
        .with_blob(keys.key, key)
        .with_argos_id(args.argos_id.clone().unwrap_or_else(|| args.plugin.clone()))
        .with_channels(groups);
    bag = match &args.config {
        Some(path) => bag.with_common_yaml(
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?,
        ),
        None => {
            let mut common = CommonConfig::with_port(PortValue::from(args.port));
            common.grpc_server_host = args.host.clone();
            bag.with_common_config(common)
        },
    };

    let store: Arc<dyn StatStore> = match &args.db {
        Some(path) => Arc::new(SqliteStatStore::new(path).await?),
        None => Arc::new(MemoryStatStore::new()),
    };
    let mut options = PluginOptions::new().with_persistence(Persistence::new(store));
    if let Some(artifact) = &args.artifact {
        options = options.with_integrity(match &args.sha256 {
            Some(digest) => IntegrityCheck::new(artifact, ManifestDigest::new(digest)),
            None => IntegrityCheck::new(artifact, LogDigest),
        });
    }

    let plugin = init_with_options(&args.plugin, bag, options)?;
    let HostChannels {
        commands,
        mut acks,
        errors,
        dataflow,
        ..
    } = host;
    let printers = [print_errors(errors), print_dataflow(dataflow)];

    commands.send(KernelCommand::start(&args.plugin)).await?;
    let started = tokio::select! {
        ack = acks.recv() => ack.is_some(),
        _ = tokio::time::sleep(Duration::from_secs(10)) => false,
    };
    if !started {
        bail!("plugin {} did not acknowledge start", args.plugin);
    }
    if let Some(addr) = plugin.local_addr().await {
        info!(addr = %addr, "plugin serving");
    }

    if args.hold_secs == 0 {
        tokio::signal::ctrl_c().await?;
    } else {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(args.hold_secs)) => {},
            res = tokio::signal::ctrl_c() => res?,
        }
    }

    commands.send(KernelCommand::stop(&args.plugin)).await?;
    if acks.recv().await.is_none() {
        warn!("plugin went away before acknowledging stop");
    }
    plugin.terminated().await;
    drop(plugin);
    drop(commands);

    for printer in printers {
        printer.await?;
    }
    Ok(())
}

fn print_errors(mut errors: mpsc::Receiver<hive_plugins::Error>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(err) = errors.recv().await {
            if err.is_shutdown() {
                println!("plugin: {err}");
            } else {
                eprintln!("plugin error: {err}");
            }
        }
    })
}

fn print_dataflow(mut dataflow: mpsc::Receiver<DataFlowGroup>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(ledger) = dataflow.recv().await {
            println!("dataflow {}:", ledger.name);
            for stat in ledger.statistics() {
                println!(
                    "  {}/{} {} ({}) mode={} elapsed={}",
                    stat.flow_group,
                    stat.flow_name,
                    stat.state_name,
                    stat.state_code,
                    stat.mode,
                    stat.time_split()
                );
            }
        }
    })
}
