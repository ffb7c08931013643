use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Observed hypervisor-side lifecycle position for an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl std::fmt::Display for VmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Observed disk attached to a virt. Ordering is stable by `index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    pub index: u32,
    pub path: String,
    pub format: String,
}

/// Position-stable network adapter on a virt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAdapter {
    pub mac_address: String,
    pub vpc: Uuid,
}

/// Observed hypervisor-side state for an instance, built from the
/// hypervisor probe and the persisted sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub id: Uuid,
    pub state: VmState,
    pub processors: u32,
    pub memory: u32,
    pub disks: Vec<Disk>,
    pub network_adapters: Vec<NetworkAdapter>,
}

/// Kernel network namespace owned by a virt. Deterministic from the
/// instance id so reconciliation never has to persist the name.
pub fn get_namespace(id: Uuid, n: usize) -> String {
    let hex = id.simple().to_string();
    format!("n{}{}", &hex[..12], n)
}

/// Host-side interface name for an adapter position. Must fit the Linux
/// 15-char IFNAMSIZ limit.
pub fn get_iface(id: Uuid, n: usize) -> String {
    let hex = id.simple().to_string();
    format!("e{}{}", &hex[..12], n)
}

/// Deterministic, locally administered MAC for an adapter position.
pub fn get_mac_addr(id: Uuid, n: usize) -> String {
    let bytes = id.as_bytes();
    format!(
        "06:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        bytes[0],
        bytes[1],
        bytes[2],
        bytes[3],
        n as u8
    )
}

/// Backing file path for a disk index.
pub fn get_disk_path(id: Uuid, index: u32) -> String {
    format!("/var/lib/stratus/disks/{}/{}.qcow2", id.simple(), index)
}
