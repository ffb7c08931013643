use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::disk;
use crate::errortypes::ErrorData;
use crate::vm::{self, VirtualMachine};

/// User-requested lifecycle position. The node reconciler drives the
/// observed virt toward this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredState {
    Start,
    Stop,
    Restart,
    Destroy,
}

impl std::fmt::Display for DesiredState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
            Self::Restart => write!(f, "restart"),
            Self::Destroy => write!(f, "destroy"),
        }
    }
}

/// Desired-state record for a virtual machine. The record is shared
/// between handler writes (name, vpc, memory, processors, network_roles,
/// domain, state) and reconciler writes (restart, deletion); the two
/// field sets are disjoint and partial-field commits must keep them so.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: Uuid,
    pub organization: Uuid,
    pub zone: Uuid,
    pub node: Uuid,
    pub vpc: Uuid,
    pub image: Uuid,
    pub name: String,
    pub state: DesiredState,
    pub memory: u32,
    pub processors: u32,
    #[serde(default)]
    pub network_roles: Vec<String>,
    #[serde(default)]
    pub domain: Option<Uuid>,
    #[serde(default)]
    pub init_disk_size: u32,
    #[serde(default)]
    pub restart: bool,
}

impl Instance {
    pub fn validate(&mut self) -> Result<(), ErrorData> {
        if self.name.is_empty() {
            return Err(ErrorData::new(
                "instance_name_missing",
                "Instance name is required",
            ));
        }

        if self.memory < 256 {
            return Err(ErrorData::new(
                "invalid_memory",
                "Instance memory must be at least 256 MiB",
            ));
        }

        if self.processors < 1 {
            return Err(ErrorData::new(
                "invalid_processors",
                "Instance requires at least one processor",
            ));
        }

        Ok(())
    }

    /// Build the desired virt from this record and its disk records.
    pub fn virt(&self, disks: &[disk::Disk]) -> VirtualMachine {
        let mut vm_disks: Vec<vm::Disk> = disks
            .iter()
            .map(|dsk| vm::Disk {
                index: dsk.index,
                path: vm::get_disk_path(self.id, dsk.index),
                format: "qcow2".to_string(),
            })
            .collect();
        vm_disks.sort_by_key(|dsk| dsk.index);

        VirtualMachine {
            id: self.id,
            state: vm::VmState::Stopped,
            processors: self.processors,
            memory: self.memory,
            disks: vm_disks,
            network_adapters: vec![vm::NetworkAdapter {
                mac_address: vm::get_mac_addr(self.id, 0),
                vpc: self.vpc,
            }],
        }
    }

    /// True if the desired config differs from the observed virt in
    /// processors, memory or the network adapter set.
    pub fn changed(&self, virt: &VirtualMachine) -> bool {
        if self.processors != virt.processors || self.memory != virt.memory {
            return true;
        }

        if virt.network_adapters.len() != 1 {
            return true;
        }

        virt.network_adapters[0].vpc != self.vpc
    }

    /// Symmetric disk difference by `index` against the observed virt.
    /// Returns (disks to add, disks to remove); removals carry the
    /// observed paths and are ordered by index ascending.
    pub fn disk_changed(
        &self,
        disks: &[disk::Disk],
        virt: &VirtualMachine,
    ) -> (Vec<vm::Disk>, Vec<vm::Disk>) {
        let desired: std::collections::HashSet<u32> = disks.iter().map(|dsk| dsk.index).collect();
        let observed: std::collections::HashSet<u32> =
            virt.disks.iter().map(|dsk| dsk.index).collect();

        let mut add: Vec<vm::Disk> = desired
            .difference(&observed)
            .map(|&index| vm::Disk {
                index,
                path: vm::get_disk_path(self.id, index),
                format: "qcow2".to_string(),
            })
            .collect();
        add.sort_by_key(|dsk| dsk.index);

        let mut rem: Vec<vm::Disk> = virt
            .disks
            .iter()
            .filter(|dsk| !desired.contains(&dsk.index))
            .cloned()
            .collect();
        rem.sort_by_key(|dsk| dsk.index);

        (add, rem)
    }
}
