use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Object-store endpoint record. Credentials are opaque to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Storage {
    pub id: Uuid,
    pub name: String,
    pub endpoint: String,
    pub bucket: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub insecure: bool,
    #[serde(rename = "type", default)]
    pub kind: String,
}
