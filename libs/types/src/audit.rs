//! Append-only audit records
//!
//! Every admin action (approvals, rejections, freezes) is recorded with the
//! acting identity, the action name, and a reference to the touched entity.

use serde::{Deserialize, Serialize};

/// One audit entry. Append-only; never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: u64,
    /// Acting identity, e.g. `admin:7` or `system`
    pub actor: String,
    /// Action name, e.g. `withdrawal_second_approval`
    pub action: String,
    /// Reference to the touched entity, e.g. `withdrawal:42`
    pub entity: String,
    pub metadata: serde_json::Value,
    pub created_at: i64,
}

impl AuditRecord {
    pub fn new(
        id: u64,
        actor: impl Into<String>,
        action: impl Into<String>,
        entity: impl Into<String>,
        metadata: serde_json::Value,
        created_at: i64,
    ) -> Self {
        Self {
            id,
            actor: actor.into(),
            action: action.into(),
            entity: entity.into(),
            metadata,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_audit_record_round_trip() {
        let record = AuditRecord::new(
            1,
            "admin:7",
            "withdrawal_rejected",
            "withdrawal:42",
            json!({"reason": "suspicious destination"}),
            1_700_000_000,
        );
        let json = serde_json::to_string(&record).unwrap();
        let back: AuditRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }
}
