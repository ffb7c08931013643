use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Desired disk record attached to an instance. `index` is unique within
/// an instance; the backing path is derived, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Disk {
    pub id: Uuid,
    pub instance: Uuid,
    pub index: u32,
}
