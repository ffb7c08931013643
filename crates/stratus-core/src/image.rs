use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog entry for a bootable image held in an object store.
/// `(storage, key)` is unique; a changed `etag` means changed content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub organization: Option<Uuid>,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub storage: Uuid,
    pub key: String,
    #[serde(default)]
    pub etag: String,
}
