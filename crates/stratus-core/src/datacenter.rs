use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An image is listable in a datacenter iff its storage is one of the
/// public storages or the private storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datacenter {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub public_storages: Vec<Uuid>,
    #[serde(default)]
    pub private_storage: Option<Uuid>,
}
