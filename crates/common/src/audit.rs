use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Creation/update timestamps maintained by the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuditStamp {
    /// Stamp for a freshly inserted row.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
        }
    }

    /// Records an update, leaving `created_at` untouched.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl Default for AuditStamp {
    fn default() -> Self {
        Self::at(Utc::now())
    }
}
