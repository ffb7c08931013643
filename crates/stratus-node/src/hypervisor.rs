use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stratus_core::instance::Instance;
use stratus_core::vm::{self, VirtualMachine};
use stratus_store::database::oid;

use crate::exec;

/// Opaque VM transition primitives. Every call blocks until the local
/// hypervisor reports completion and is safe on an already-converged
/// state: `power_on` is a no-op on a running virt, `destroy` a no-op on
/// an absent one.
pub trait Hypervisor: Send + Sync {
    fn create(&self, inst: &Instance, virt: &VirtualMachine, spec: &QemuSpec) -> Result<()>;
    fn power_on(&self, inst: &Instance, virt: &VirtualMachine) -> Result<()>;
    fn power_off(&self, virt: &VirtualMachine) -> Result<()>;
    fn destroy(&self, virt: &VirtualMachine) -> Result<()>;
    /// QMP disk detach for one observed disk.
    fn remove_disk(&self, instance_id: Uuid, disk: &vm::Disk) -> Result<()>;
}

/// QEMU launch descriptor, serialized as JSON alongside the instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QemuSpec {
    pub id: Uuid,
    pub kvm: bool,
    pub machine: String,
    pub cpu: String,
    pub cpus: u32,
    pub cores: u32,
    pub threads: u32,
    pub boot: String,
    pub memory: u32,
    pub disks: Vec<QemuDisk>,
    pub networks: Vec<QemuNetwork>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QemuDisk {
    pub media: String,
    pub index: u32,
    pub file: String,
    pub format: String,
    pub discard: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QemuNetwork {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iface: Option<String>,
}

impl QemuSpec {
    /// Render the launch descriptor for a virt. Each adapter yields a
    /// nic entry plus the bridge entry for its position-stable host
    /// interface.
    pub fn new(virt: &VirtualMachine, kvm: bool) -> Self {
        let disks = virt
            .disks
            .iter()
            .map(|disk| QemuDisk {
                media: "disk".to_string(),
                index: disk.index,
                file: disk.path.clone(),
                format: "qcow2".to_string(),
                discard: true,
            })
            .collect();

        let mut networks = Vec::new();
        for (i, adapter) in virt.network_adapters.iter().enumerate() {
            networks.push(QemuNetwork {
                kind: "nic".to_string(),
                mac_address: Some(adapter.mac_address.clone()),
                iface: None,
            });
            networks.push(QemuNetwork {
                kind: "bridge".to_string(),
                mac_address: None,
                iface: Some(vm::get_iface(virt.id, i)),
            });
        }

        Self {
            id: virt.id,
            kvm,
            machine: "pc".to_string(),
            cpu: "host".to_string(),
            cpus: virt.processors,
            cores: 1,
            threads: 1,
            boot: "c".to_string(),
            memory: virt.memory,
            disks,
            networks,
        }
    }
}

/// Drives the privileged hypervisor helper over its narrow CLI. The
/// helper owns QEMU process management and the QMP socket; this adapter
/// only renders descriptors and relays transitions.
pub struct HelperHypervisor {
    helper: String,
}

impl HelperHypervisor {
    pub fn new(helper: &str) -> Self {
        Self {
            helper: helper.to_string(),
        }
    }
}

impl Default for HelperHypervisor {
    fn default() -> Self {
        Self::new("stratus-hv")
    }
}

impl Hypervisor for HelperHypervisor {
    fn create(&self, inst: &Instance, _virt: &VirtualMachine, spec: &QemuSpec) -> Result<()> {
        let spec_json = serde_json::to_string(spec)?;
        exec::combined_output_logged(
            &[],
            &self.helper,
            &["create", "--instance", &oid(inst.id), "--spec", &spec_json],
        )?;
        Ok(())
    }

    fn power_on(&self, inst: &Instance, _virt: &VirtualMachine) -> Result<()> {
        exec::combined_output_logged(&[], &self.helper, &["power-on", "--instance", &oid(inst.id)])?;
        Ok(())
    }

    fn power_off(&self, virt: &VirtualMachine) -> Result<()> {
        exec::combined_output_logged(
            &[],
            &self.helper,
            &["power-off", "--instance", &oid(virt.id)],
        )?;
        Ok(())
    }

    fn destroy(&self, virt: &VirtualMachine) -> Result<()> {
        exec::combined_output_logged(
            &["not found"],
            &self.helper,
            &["destroy", "--instance", &oid(virt.id)],
        )?;
        Ok(())
    }

    fn remove_disk(&self, instance_id: Uuid, disk: &vm::Disk) -> Result<()> {
        exec::combined_output_logged(
            &[],
            &self.helper,
            &[
                "remove-disk",
                "--instance",
                &oid(instance_id),
                "--index",
                &disk.index.to_string(),
            ],
        )?;
        Ok(())
    }
}

impl crate::state::VirtProvider for HelperHypervisor {
    fn list(&self) -> Result<Vec<VirtualMachine>> {
        let output = exec::combined_output_logged(&[], &self.helper, &["list"])?;
        if output.is_empty() {
            return Ok(Vec::new());
        }
        let virts: Vec<VirtualMachine> = serde_json::from_str(&output)?;
        Ok(virts)
    }

    fn namespaces(&self) -> Result<Vec<String>> {
        crate::state::list_namespaces()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_core::vm::{Disk, NetworkAdapter, VmState};

    fn test_virt() -> VirtualMachine {
        let id = Uuid::new_v4();
        VirtualMachine {
            id,
            state: VmState::Stopped,
            processors: 2,
            memory: 2048,
            disks: vec![Disk {
                index: 0,
                path: vm::get_disk_path(id, 0),
                format: "qcow2".to_string(),
            }],
            network_adapters: vec![NetworkAdapter {
                mac_address: vm::get_mac_addr(id, 0),
                vpc: Uuid::new_v4(),
            }],
        }
    }

    #[test]
    fn test_qemu_spec_shape() {
        let virt = test_virt();
        let spec = QemuSpec::new(&virt, true);

        assert_eq!(spec.machine, "pc");
        assert_eq!(spec.cpu, "host");
        assert_eq!(spec.cpus, 2);
        assert_eq!(spec.cores, 1);
        assert_eq!(spec.threads, 1);
        assert_eq!(spec.boot, "c");
        assert_eq!(spec.memory, 2048);

        assert_eq!(spec.disks.len(), 1);
        assert_eq!(spec.disks[0].media, "disk");
        assert_eq!(spec.disks[0].format, "qcow2");
        assert!(spec.disks[0].discard);

        // One nic entry and one bridge entry per adapter.
        assert_eq!(spec.networks.len(), 2);
        assert_eq!(spec.networks[0].kind, "nic");
        assert!(spec.networks[0].mac_address.is_some());
        assert_eq!(spec.networks[1].kind, "bridge");
        assert_eq!(
            spec.networks[1].iface.as_deref(),
            Some(vm::get_iface(virt.id, 0).as_str())
        );
    }

    #[test]
    fn test_qemu_spec_json_omits_absent_fields() {
        let spec = QemuSpec::new(&test_virt(), false);
        let json = serde_json::to_value(&spec).unwrap();

        let nic = &json["networks"][0];
        assert!(nic.get("iface").is_none());
        let bridge = &json["networks"][1];
        assert!(bridge.get("mac_address").is_none());
        assert_eq!(bridge["type"], "bridge");
    }
}
