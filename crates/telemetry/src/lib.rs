//! Dataflow statistics: the timeline of named state transitions a plugin
//! records across its lifecycle.
//!
//! A [`DataFlowGroup`] is appended to on every milestone, streamed to the
//! host, and written entry-by-entry into a [`StatStore`] under a
//! hierarchical key so it can be read back for audit.

pub mod duration;
pub mod error;
pub mod ledger;
pub mod record;
pub mod store;

pub use {
    error::{Error, Result},
    ledger::{
        DataFlowGroup, DataFlowStatistic, DeliverContext, FAILURE_SENTINEL, MODE_FAILURE,
        MODE_SUCCESS, PersistSummary, StatStatus,
    },
    record::{StatRecord, entry_path, flow_path},
    store::{MemoryStatStore, StatStore},
};

#[cfg(feature = "sqlite")]
pub use store::SqliteStatStore;
