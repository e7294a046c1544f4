//! The in-memory timeline and its operations.

use std::time::Instant;

use {
    time::{Duration, OffsetDateTime},
    tracing::{debug, info, warn},
};

use crate::{
    duration,
    error::{Error, Result},
    record::{StatRecord, entry_path, flow_path},
    store::StatStore,
};

/// Mode recorded for a milestone that completed normally.
pub const MODE_SUCCESS: i64 = 1;
/// Mode recorded when an error interrupted the flow.
pub const MODE_FAILURE: i64 = 2;

/// Legacy failure marker. Hosts reading the store treat any state name
/// containing it as a failure, whatever the mode says.
pub const FAILURE_SENTINEL: &str = "Failure";

/// Outcome of one recorded state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatStatus {
    Success,
    Failure,
}

impl StatStatus {
    /// Derive the status from the stored fields. The failure mode is
    /// authoritative; the name sentinel is honored for records written
    /// before the mode carried it.
    pub fn classify(mode: i64, state_name: &str) -> Self {
        if mode == MODE_FAILURE || state_name.contains(FAILURE_SENTINEL) {
            Self::Failure
        } else {
            Self::Success
        }
    }
}

/// One state transition in a flow.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFlowStatistic {
    pub flow_group: String,
    pub flow_name: String,
    pub state_name: String,
    pub state_code: String,
    pub mode: i64,
    pub status: StatStatus,
    elapsed: Duration,
}

impl DataFlowStatistic {
    /// Negative elapsed times are clamped to zero.
    pub fn new(
        flow_group: impl Into<String>,
        flow_name: impl Into<String>,
        state_name: impl Into<String>,
        state_code: impl Into<String>,
        mode: i64,
        elapsed: Duration,
    ) -> Self {
        let state_name = state_name.into();
        Self {
            flow_group: flow_group.into(),
            flow_name: flow_name.into(),
            status: StatStatus::classify(mode, &state_name),
            state_name,
            state_code: state_code.into(),
            mode,
            elapsed: elapsed.max(Duration::ZERO),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn is_failure(&self) -> bool {
        self.status == StatStatus::Failure
    }

    /// Elapsed time as stored: truncated to the storage resolution.
    pub fn time_split(&self) -> String {
        duration::format_duration(duration::truncate(self.elapsed))
    }
}

/// Coordinates of the entry currently open in a ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverContext {
    pub flow_group: String,
    pub flow_name: String,
    pub state_name: String,
    pub state_code: String,
}

/// Outcome of a best-effort [`DataFlowGroup::persist`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistSummary {
    pub written: usize,
    pub failed: usize,
}

/// A named timeline of state transitions.
#[derive(Debug, Clone)]
pub struct DataFlowGroup {
    pub name: String,
    /// Wall-clock creation time, for display. Elapsed times are measured
    /// from `started`.
    pub time_start: OffsetDateTime,
    started: Instant,
    /// Log every entry as it is appended instead of once on finish.
    pub log_stat: bool,
    statistics: Vec<DataFlowStatistic>,
    finished: bool,
}

impl DataFlowGroup {
    pub fn new(name: impl Into<String>, log_stat: bool) -> Self {
        Self {
            name: name.into(),
            time_start: OffsetDateTime::now_utc(),
            started: Instant::now(),
            log_stat,
            statistics: Vec::new(),
            finished: false,
        }
    }

    pub fn statistics(&self) -> &[DataFlowStatistic] {
        &self.statistics
    }

    pub fn is_empty(&self) -> bool {
        self.statistics.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Append a state with elapsed time measured from the group's start.
    pub fn update(
        &mut self,
        flow_group: &str,
        flow_name: &str,
        state_name: &str,
        state_code: &str,
        mode: i64,
    ) {
        let elapsed = Duration::try_from(self.started.elapsed()).unwrap_or(Duration::MAX);
        self.update_with_time(flow_group, flow_name, state_name, state_code, mode, elapsed);
    }

    /// Append a state with an elapsed time measured by the caller.
    pub fn update_with_time(
        &mut self,
        flow_group: &str,
        flow_name: &str,
        state_name: &str,
        state_code: &str,
        mode: i64,
        elapsed: Duration,
    ) {
        let stat =
            DataFlowStatistic::new(flow_group, flow_name, state_name, state_code, mode, elapsed);
        if self.log_stat {
            log_statistic(&self.name, &stat);
        }
        self.statistics.push(stat);
    }

    /// The most recent entry's coordinates.
    pub fn deliver_context(&self) -> Result<DeliverContext> {
        let last = self.statistics.last().ok_or(Error::EmptyLedger)?;
        Ok(DeliverContext {
            flow_group: last.flow_group.clone(),
            flow_name: last.flow_name.clone(),
            state_name: last.state_name.clone(),
            state_code: last.state_code.clone(),
        })
    }

    /// Close the ledger. Without incremental logging the whole timeline is
    /// logged now.
    pub fn finish(&mut self) {
        self.finished = true;
        self.finish_log();
    }

    /// Log every entry; no-op when entries were already logged on append.
    pub fn finish_log(&self) {
        if self.log_stat {
            return;
        }
        for stat in &self.statistics {
            log_statistic(&self.name, stat);
        }
    }

    /// Write every entry under
    /// `<base>/<id_name>/<id>/DataFlowStatistics/DataFlowGroup/<group>/dataFlowName/<flow>/<code>`.
    ///
    /// A failed write is logged and the remaining entries are still written.
    pub async fn persist(
        &self,
        store: &dyn StatStore,
        base_path: &str,
        id_name: &str,
        id: &str,
    ) -> PersistSummary {
        let mut summary = PersistSummary::default();
        for stat in &self.statistics {
            let path = entry_path(
                base_path,
                id_name,
                id,
                &stat.flow_group,
                &stat.flow_name,
                &stat.state_code,
            );
            let written = match StatRecord::from(stat).to_map() {
                Ok(record) => store.write(&path, &record).await,
                Err(e) => Err(e),
            };
            match written {
                Ok(()) => summary.written += 1,
                Err(e) => {
                    warn!(path = %path, error = %e, "error writing dataflow statistic");
                    summary.failed += 1;
                },
            }
        }
        debug!(
            ledger = %self.name,
            written = summary.written,
            failed = summary.failed,
            "persisted dataflow statistics"
        );
        summary
    }

    /// Append every entry stored for one flow. Returns how many were read.
    ///
    /// Unreadable entries are logged and skipped; a missing or malformed
    /// mode reads as 0.
    pub async fn retrieve(
        &mut self,
        store: &dyn StatStore,
        base_path: &str,
        id_name: &str,
        id: &str,
        flow_group: &str,
        flow_name: &str,
    ) -> usize {
        let dir = flow_path(base_path, id_name, id, flow_group, flow_name);
        let codes = match store.list(&dir).await {
            Ok(codes) => codes,
            Err(e) => {
                warn!(path = %dir, error = %e, "error listing dataflow statistics");
                return 0;
            },
        };

        let mut read = 0;
        for code in codes.iter().filter(|c| !c.ends_with('/')) {
            let path = format!("{dir}/{code}");
            let record = match store.read(&path).await {
                Ok(Some(map)) => StatRecord::from_map(&path, map),
                Ok(None) => {
                    debug!(path = %path, "listed dataflow statistic vanished");
                    continue;
                },
                Err(e) => Err(e),
            };
            match record {
                Ok(record) => {
                    self.statistics.push(record.into_statistic());
                    read += 1;
                },
                Err(e) => warn!(path = %path, error = %e, "error reading dataflow statistic"),
            }
        }
        read
    }
}

fn log_statistic(ledger: &str, stat: &DataFlowStatistic) {
    let elapsed = stat.time_split();
    match stat.status {
        StatStatus::Failure => warn!(
            ledger,
            flow_group = %stat.flow_group,
            state_code = %stat.state_code,
            elapsed = %elapsed,
            "{}-{}",
            stat.flow_name,
            stat.state_name
        ),
        StatStatus::Success => info!(
            ledger,
            flow_group = %stat.flow_group,
            state_code = %stat.state_code,
            elapsed = %elapsed,
            "{}-{}",
            stat.flow_name,
            stat.state_name
        ),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_appends_in_order_with_non_negative_elapsed() {
        let mut group = DataFlowGroup::new("argos-1", false);
        group.update("System", "p1", "Start up", "1", MODE_SUCCESS);
        group.update("System", "p1", "Shutdown", "0", MODE_SUCCESS);

        let stats = group.statistics();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].state_name, "Start up");
        assert_eq!(stats[1].state_name, "Shutdown");
        assert!(stats.iter().all(|s| !s.elapsed().is_negative()));
        assert!(stats[0].elapsed() <= stats[1].elapsed());
    }

    #[test]
    fn elapsed_ignores_wall_clock_steps() {
        let mut group = DataFlowGroup::new("argos-1", false);
        group.time_start -= Duration::hours(1);
        group.update("System", "p1", "Start up", "1", MODE_SUCCESS);
        assert!(group.statistics()[0].elapsed() < Duration::minutes(1));

        let mut group = DataFlowGroup::new("argos-1", false);
        group.time_start += Duration::hours(1);
        std::thread::sleep(std::time::Duration::from_millis(15));
        group.update("System", "p1", "Start up", "1", MODE_SUCCESS);
        assert!(group.statistics()[0].elapsed() >= Duration::milliseconds(10));
    }

    #[test]
    fn negative_elapsed_is_clamped_and_stored_as_zero() {
        let mut group = DataFlowGroup::new("argos-1", true);
        group.update_with_time("System", "p1", "Start up", "1", MODE_SUCCESS, Duration::microseconds(-40));
        let stat = &group.statistics()[0];
        assert_eq!(stat.elapsed(), Duration::ZERO);
        assert_eq!(stat.time_split(), "0s");
    }

    #[test]
    fn time_split_truncates_to_ten_millis() {
        let stat = DataFlowStatistic::new("System", "p1", "Start up", "1", 1, Duration::milliseconds(127));
        assert_eq!(stat.time_split(), "120ms");
    }

    #[test]
    fn status_prefers_mode_and_honors_legacy_sentinel() {
        assert_eq!(StatStatus::classify(MODE_FAILURE, "Start up"), StatStatus::Failure);
        assert_eq!(StatStatus::classify(MODE_SUCCESS, "Start up Failure"), StatStatus::Failure);
        assert_eq!(StatStatus::classify(MODE_SUCCESS, "Start up"), StatStatus::Success);
        assert_eq!(StatStatus::classify(0, "Shutdown"), StatStatus::Success);
    }

    #[test]
    fn deliver_context_tracks_last_entry() {
        let mut group = DataFlowGroup::new("argos-1", false);
        assert!(matches!(group.deliver_context(), Err(Error::EmptyLedger)));

        group.update("System", "p1", "Start up", "1", MODE_SUCCESS);
        let ctx = group.deliver_context().unwrap();
        assert_eq!(ctx.flow_group, "System");
        assert_eq!(ctx.flow_name, "p1");
        assert_eq!(ctx.state_name, "Start up");
        assert_eq!(ctx.state_code, "1");
    }

    #[test]
    fn finish_marks_closed_but_allows_later_milestones() {
        let mut group = DataFlowGroup::new("argos-1", false);
        group.update("System", "p1", "Start up", "1", MODE_SUCCESS);
        group.finish();
        assert!(group.is_finished());
        group.update("System", "p1", "Shutdown", "0", MODE_SUCCESS);
        assert_eq!(group.statistics().len(), 2);
    }

    #[tokio::test]
    async fn persisted_entries_read_back_at_storage_resolution() {
        let store = crate::store::MemoryStatStore::new();
        let mut group = DataFlowGroup::new("argos-1", false);
        group.update_with_time("System", "p1", "Start up", "1", MODE_SUCCESS, Duration::milliseconds(1_237));
        group.update_with_time("System", "p1", "Shutdown", "0", MODE_SUCCESS, Duration::microseconds(-40));

        let summary = group.persist(&store, "base", "argosId", "argos-1").await;
        assert_eq!(summary, PersistSummary { written: 2, failed: 0 });

        let mut restored = DataFlowGroup::new("argos-1", false);
        let read = restored
            .retrieve(&store, "base", "argosId", "argos-1", "System", "p1")
            .await;
        assert_eq!(read, 2);

        for original in group.statistics() {
            let back = restored
                .statistics()
                .iter()
                .find(|s| s.state_code == original.state_code)
                .unwrap();
            assert_eq!(back.flow_group, original.flow_group);
            assert_eq!(back.flow_name, original.flow_name);
            assert_eq!(back.state_name, original.state_name);
            assert_eq!(back.mode, original.mode);
            assert_eq!(back.elapsed(), duration::truncate(original.elapsed()));
        }

        let by_code = |code: &str| {
            restored
                .statistics()
                .iter()
                .find(|s| s.state_code == code)
                .unwrap()
                .elapsed()
        };
        assert_eq!(by_code("1"), Duration::milliseconds(1_230));
        assert_eq!(by_code("0"), Duration::ZERO);
    }
}
