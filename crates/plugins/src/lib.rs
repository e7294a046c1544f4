//! Plugin kernel protocol.
//!
//! A host attaches a plugin by handing it a [`PropertyBag`]: the common
//! config block, certificate blobs, a logging span and the plugin ends of
//! six queues (command in/out, chat in/out, error out, dataflow statistics
//! out). [`init`] validates the bag, builds the plugin's [`ConfigContext`]
//! and starts the dispatch loop. From then on the host drives the plugin
//! with START/STOP commands and observes it through acknowledgments,
//! errors and dataflow statistics.

pub mod channels;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod integrity;
pub mod lifecycle;
pub mod options;
pub mod properties;
pub mod reporter;
pub mod rpc;
pub mod wiring;

use std::sync::Arc;

use tracing::{Instrument, info, warn};

pub use {
    channels::{
        ChannelGroups, ChannelHandle, ChatMsg, DEFAULT_CAPACITY, HostChannels, KernelCommand,
        PluginEvent, channel_bundle,
    },
    context::ConfigContext,
    dispatch::DispatchState,
    error::{Error, Result},
    health::{HealthReporter, ServingStatus},
    hive_config::config_paths,
    integrity::{IntegrityCheck, IntegrityVerifier, LogDigest, ManifestDigest},
    lifecycle::{Phase, PluginInstance},
    options::{Persistence, PluginOptions},
    properties::{PropertyBag, PropertyValue},
    rpc::RpcService,
};

/// Attach a plugin with default options.
pub fn init(plugin_name: &str, properties: PropertyBag) -> Result<Arc<PluginInstance>> {
    init_with_options(plugin_name, properties, PluginOptions::default())
}

/// Attach a plugin: verify its artifact, wire its channels and start its
/// dispatch loop.
///
/// On error nothing is left running; the host may attach again with a new
/// bag. Must be called inside a tokio runtime.
pub fn init_with_options(
    plugin_name: &str,
    properties: PropertyBag,
    options: PluginOptions,
) -> Result<Arc<PluginInstance>> {
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| Error::message(format!("plugin init requires a tokio runtime: {e}")))?;

    if let Some(check) = &options.integrity {
        check
            .run()
            .inspect_err(|e| warn!(plugin = plugin_name, error = %e, "plugin rejected"))?;
    }

    let cert_keys = PluginInstance::cert_keys(plugin_name, &options);
    let (context, commands) = ConfigContext::from_properties(plugin_name, properties, cert_keys)
        .inspect_err(|e| {
            warn!(plugin = plugin_name, error = %e, "plugin initialization aborted");
        })?;

    let span = context.span.clone();
    let instance = PluginInstance::new(context, options);
    runtime.spawn(dispatch::run(Arc::clone(&instance), commands).instrument(span));
    info!(plugin = plugin_name, "plugin initialized");
    Ok(instance)
}
