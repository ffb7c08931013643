use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Browser session record, keyed by an opaque token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user: Uuid,
    pub timestamp: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    #[serde(default)]
    pub removed: bool,
}
