// src/model/audit.rs

//! Audit columns common to every persisted entity (spec.md section 3).

use serde::{Deserialize, Serialize};

/// Soft-delete flag. `Y` means the row participates in normal queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveFlag {
    Y,
    N,
}

impl ActiveFlag {
    pub fn is_active(&self) -> bool {
        matches!(self, ActiveFlag::Y)
    }
}

/// Columns every persisted row carries: tenant isolation, audit trail, and
/// an optimistic-concurrency version counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditFields {
    pub tenant_id: String,
    pub add_time: i64,
    pub edit_time: i64,
    pub add_who: String,
    pub edit_who: String,
    pub current_version: u64,
    pub active_flag: ActiveFlag,
}

impl AuditFields {
    /// Creates a freshly-created row's audit fields at `now` (epoch millis).
    pub fn new(tenant_id: impl Into<String>, who: impl Into<String>, now: i64) -> Self {
        let who = who.into();
        Self {
            tenant_id: tenant_id.into(),
            add_time: now,
            edit_time: now,
            add_who: who.clone(),
            edit_who: who,
            current_version: 1,
            active_flag: ActiveFlag::Y,
        }
    }

    /// Bumps the version and edit metadata for an in-place update.
    pub fn touch(&mut self, who: impl Into<String>, now: i64) {
        self.edit_time = now;
        self.edit_who = who.into();
        self.current_version += 1;
    }

    pub fn soft_delete(&mut self, who: impl Into<String>, now: i64) {
        self.active_flag = ActiveFlag::N;
        self.touch(who, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_bumps_version_monotonically() {
        let mut fields = AuditFields::new("t1", "alice", 100);
        assert_eq!(fields.current_version, 1);
        fields.touch("bob", 200);
        assert_eq!(fields.current_version, 2);
        assert_eq!(fields.edit_who, "bob");
        assert_eq!(fields.add_who, "alice");
    }

    #[test]
    fn soft_delete_sets_flag_n() {
        let mut fields = AuditFields::new("t1", "alice", 100);
        fields.soft_delete("alice", 150);
        assert!(!fields.active_flag.is_active());
    }
}
