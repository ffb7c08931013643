use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimal user record; the policy evaluator's disable action commits
/// the single `disabled` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(default)]
    pub disabled: bool,
}
