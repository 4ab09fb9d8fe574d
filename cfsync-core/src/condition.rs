//! Ready/Synced conditions written into a declared resource's status.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Condition type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    /// The remote object exists and is usable.
    Ready,
    /// The remote object matches the declared spec.
    Synced,
}

/// Condition status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Machine-readable reason attached to a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reason {
    Available,
    Deleting,
    ReconcileSuccess,
    ReconcileError,
    TransientError,
    KindUnsupported,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Reason::Available => "Available",
            Reason::Deleting => "Deleting",
            Reason::ReconcileSuccess => "ReconcileSuccess",
            Reason::ReconcileError => "ReconcileError",
            Reason::TransientError => "TransientError",
            Reason::KindUnsupported => "KindUnsupported",
        };
        f.write_str(s)
    }
}

/// A timestamped status entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    pub reason: Reason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        type_: ConditionType,
        status: ConditionStatus,
        reason: Reason,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            type_,
            status,
            reason,
            message,
            last_transition_time: now,
        }
    }

    pub fn ready(now: DateTime<Utc>) -> Self {
        Self::new(
            ConditionType::Ready,
            ConditionStatus::True,
            Reason::Available,
            None,
            now,
        )
    }

    pub fn not_ready(reason: Reason, message: Option<String>, now: DateTime<Utc>) -> Self {
        Self::new(
            ConditionType::Ready,
            ConditionStatus::False,
            reason,
            message,
            now,
        )
    }

    pub fn synced(now: DateTime<Utc>) -> Self {
        Self::new(
            ConditionType::Synced,
            ConditionStatus::True,
            Reason::ReconcileSuccess,
            None,
            now,
        )
    }

    pub fn not_synced(reason: Reason, message: Option<String>, now: DateTime<Utc>) -> Self {
        Self::new(
            ConditionType::Synced,
            ConditionStatus::False,
            reason,
            message,
            now,
        )
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Replace the condition of the same type.
///
/// The previous `last_transition_time` is kept when the status did not change.
pub fn set_condition(conditions: &mut Vec<Condition>, mut cond: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == cond.type_) {
        Some(existing) => {
            if existing.status == cond.status {
                cond.last_transition_time = existing.last_transition_time;
            }
            *existing = cond;
        }
        None => conditions.push(cond),
    }
}

/// Find a condition by type.
pub fn find_condition(conditions: &[Condition], type_: ConditionType) -> Option<&Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_set_condition_appends_new_type() {
        let mut conds = vec![];
        set_condition(&mut conds, Condition::ready(t(0)));
        set_condition(&mut conds, Condition::synced(t(0)));
        assert_eq!(conds.len(), 2);
    }

    #[test]
    fn test_set_condition_keeps_transition_time_on_same_status() {
        let mut conds = vec![Condition::ready(t(0))];
        set_condition(&mut conds, Condition::ready(t(60)));

        assert_eq!(conds.len(), 1);
        assert_eq!(conds[0].last_transition_time, t(0));
    }

    #[test]
    fn test_set_condition_updates_transition_time_on_status_change() {
        let mut conds = vec![Condition::ready(t(0))];
        set_condition(
            &mut conds,
            Condition::not_ready(Reason::ReconcileError, Some("bad token".into()), t(60)),
        );

        let ready = find_condition(&conds, ConditionType::Ready).unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason, Reason::ReconcileError);
        assert_eq!(ready.message.as_deref(), Some("bad token"));
        assert_eq!(ready.last_transition_time, t(60));
    }

    #[test]
    fn test_condition_serializes_camel_case() {
        let json = serde_json::to_value(Condition::synced(t(0))).unwrap();
        assert_eq!(json["type"], "Synced");
        assert_eq!(json["status"], "True");
        assert_eq!(json["reason"], "ReconcileSuccess");
        assert!(json.get("lastTransitionTime").is_some());
        assert!(json.get("message").is_none());
    }
}
