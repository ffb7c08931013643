use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Local hypervisor flavor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypervisorKind {
    #[default]
    Kvm,
    Qemu,
}

/// Hypervisor node record. The reconciler commits the reserved resource
/// fields after each tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub zone: Option<Uuid>,
    #[serde(default)]
    pub hypervisor: HypervisorKind,
    #[serde(default)]
    pub admin_domain: String,
    #[serde(default)]
    pub cpu_units_res: u32,
    #[serde(default)]
    pub memory_units_res: f64,
}
