use std::path::PathBuf;

use {
    clap::Args,
    hive_plugins::options::{DEFAULT_BASE_PATH, DEFAULT_ID_NAME},
    hive_telemetry::{DataFlowGroup, SqliteStatStore},
};

#[derive(Args)]
pub struct StatsArgs {
    /// SQLite database written by `hive run --db`.
    #[arg(long)]
    db: PathBuf,
    /// Identifier the statistics were recorded under.
    #[arg(long)]
    argos_id: String,
    /// Flow name; lifecycle milestones use the plugin name.
    #[arg(long)]
    flow: String,
    #[arg(long, default_value = "System")]
    flow_group: String,
    #[arg(long, default_value = DEFAULT_BASE_PATH)]
    base_path: String,
    #[arg(long, default_value = DEFAULT_ID_NAME)]
    id_name: String,
}

pub async fn show(args: StatsArgs) -> anyhow::Result<()> {
    if !args.db.exists() {
        anyhow::bail!("database not found: {}", args.db.display());
    }
    let store = SqliteStatStore::new(&args.db).await?;

    let mut ledger = DataFlowGroup::new(args.argos_id.clone(), false);
    let read = ledger
        .retrieve(
            &store,
            &args.base_path,
            &args.id_name,
            &args.argos_id,
            &args.flow_group,
            &args.flow,
        )
        .await;
    if read == 0 {
        println!("No statistics recorded for {}/{}.", args.flow_group, args.flow);
        return Ok(());
    }

    for stat in ledger.statistics() {
        let outcome = if stat.is_failure() { "FAILED" } else { "ok" };
        println!(
            "{:<6} {:<24} code={:<4} mode={} elapsed={}",
            outcome,
            stat.state_name,
            stat.state_code,
            stat.mode,
            stat.time_split()
        );
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        hive_plugins::Persistence,
        hive_telemetry::{MODE_SUCCESS, StatStore},
        std::sync::Arc,
    };

    fn args(db: PathBuf) -> StatsArgs {
        StatsArgs {
            db,
            argos_id: "argos-1".into(),
            flow: "p1".into(),
            flow_group: "System".into(),
            base_path: DEFAULT_BASE_PATH.into(),
            id_name: DEFAULT_ID_NAME.into(),
        }
    }

    #[tokio::test]
    async fn missing_database_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = show(args(dir.path().join("absent.db"))).await.unwrap_err();
        assert!(err.to_string().contains("database not found"));
    }

    #[tokio::test]
    async fn reads_back_persisted_statistics() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.db");
        let store: Arc<dyn StatStore> = Arc::new(SqliteStatStore::new(&path).await.unwrap());
        let target = Persistence::new(store);

        let mut ledger = DataFlowGroup::new("argos-1", false);
        ledger.update("System", "p1", "Start up", "1", MODE_SUCCESS);
        let summary = ledger
            .persist(target.store.as_ref(), &target.base_path, &target.id_name, "argos-1")
            .await;
        assert_eq!(summary.written, 1);

        show(args(path)).await.unwrap();
    }
}
