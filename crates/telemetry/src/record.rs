//! Stored shape of one statistic and the key layout it is stored under.

use {
    serde::{Deserialize, Deserializer, Serialize},
    serde_json::{Map, Value},
    tracing::debug,
};

use crate::{
    duration::parse_duration,
    error::{Error, Result},
    ledger::DataFlowStatistic,
};

/// Directory holding every state code recorded for one flow.
pub fn flow_path(base_path: &str, id_name: &str, id: &str, flow_group: &str, flow_name: &str) -> String {
    format!(
        "{}/{id_name}/{id}/DataFlowStatistics/DataFlowGroup/{flow_group}/dataFlowName/{flow_name}",
        base_path.trim_end_matches('/')
    )
}

/// Full key of one state code's record.
pub fn entry_path(
    base_path: &str,
    id_name: &str,
    id: &str,
    flow_group: &str,
    flow_name: &str,
    state_code: &str,
) -> String {
    format!("{}/{state_code}", flow_path(base_path, id_name, id, flow_group, flow_name))
}

/// One persisted state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatRecord {
    pub flow_group: String,
    pub flow_name: String,
    pub state_name: String,
    pub state_code: String,
    pub time_split: String,
    #[serde(default, deserialize_with = "lenient_mode")]
    pub mode: i64,
}

/// Stores hand numbers back as JSON numbers or numeric strings; anything
/// else reads as 0.
fn lenient_mode<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_i64().unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    })
}

impl StatRecord {
    pub fn to_map(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(Error::message(format!("statistic serialized to {other}"))),
        }
    }

    pub fn from_map(path: &str, map: Map<String, Value>) -> Result<Self> {
        serde_json::from_value(Value::Object(map)).map_err(|e| Error::malformed(path, e.to_string()))
    }

    /// Rebuild the in-memory entry. An unparseable time split reads as zero.
    pub fn into_statistic(self) -> DataFlowStatistic {
        let elapsed = parse_duration(&self.time_split).unwrap_or_else(|e| {
            debug!(error = %e, "unparseable stored time split");
            time::Duration::ZERO
        });
        DataFlowStatistic::new(
            self.flow_group,
            self.flow_name,
            self.state_name,
            self.state_code,
            self.mode,
            elapsed,
        )
    }
}

impl From<&DataFlowStatistic> for StatRecord {
    fn from(stat: &DataFlowStatistic) -> Self {
        Self {
            flow_group: stat.flow_group.clone(),
            flow_name: stat.flow_name.clone(),
            state_name: stat.state_name.clone(),
            state_code: stat.state_code.clone(),
            time_split: stat.time_split(),
            mode: stat.mode,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json, time::Duration};

    #[test]
    fn paths_follow_the_audit_layout() {
        assert_eq!(
            entry_path("super-secrets/PublicIndex/hive/", "argosId", "a-1", "System", "p1", "1"),
            "super-secrets/PublicIndex/hive/argosId/a-1/DataFlowStatistics/DataFlowGroup/System/dataFlowName/p1/1"
        );
    }

    #[test]
    fn record_uses_camel_case_keys() {
        let stat = DataFlowStatistic::new("System", "p1", "Start up", "1", 1, Duration::milliseconds(123));
        let map = StatRecord::from(&stat).to_map().unwrap();
        assert_eq!(
            Value::Object(map),
            json!({
                "flowGroup": "System",
                "flowName": "p1",
                "stateName": "Start up",
                "stateCode": "1",
                "timeSplit": "120ms",
                "mode": 1,
            })
        );
    }

    #[test]
    fn mode_is_read_leniently() {
        let base = json!({
            "flowGroup": "System",
            "flowName": "p1",
            "stateName": "Start up",
            "stateCode": "1",
            "timeSplit": "0s",
        });
        let with = |mode: Option<Value>| {
            let mut v = base.clone();
            if let (Some(mode), Some(obj)) = (mode, v.as_object_mut()) {
                obj.insert("mode".into(), mode);
            }
            match v {
                Value::Object(map) => StatRecord::from_map("k", map).unwrap().mode,
                _ => unreachable!(),
            }
        };
        assert_eq!(with(Some(json!(2))), 2);
        assert_eq!(with(Some(json!("1"))), 1);
        assert_eq!(with(Some(json!("one"))), 0);
        assert_eq!(with(Some(json!(null))), 0);
        assert_eq!(with(None), 0);
    }

    #[test]
    fn missing_state_name_is_malformed() {
        let map = json!({"flowGroup": "System", "flowName": "p1", "stateCode": "1", "timeSplit": "0s"});
        let Value::Object(map) = map else { unreachable!() };
        assert!(matches!(
            StatRecord::from_map("k", map),
            Err(Error::MalformedRecord { .. })
        ));
    }

    #[test]
    fn bad_time_split_reads_as_zero() {
        let record = StatRecord {
            flow_group: "System".into(),
            flow_name: "p1".into(),
            state_name: "Start up".into(),
            state_code: "1".into(),
            time_split: "soon".into(),
            mode: 1,
        };
        assert_eq!(record.into_statistic().elapsed(), Duration::ZERO);
    }
}
