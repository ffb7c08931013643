use std::collections::{HashMap, HashSet};

use anyhow::Result;
use uuid::Uuid;

use stratus_core::disk::Disk;
use stratus_core::instance::Instance;
use stratus_core::vm::VirtualMachine;
use stratus_core::vpc::Vpc;
use stratus_store::database::Database;
use stratus_store::{disks, instances, vpcs};

use crate::exec;

/// Observed hypervisor-side state source: the virts this node is running
/// and the kernel namespaces backing them.
pub trait VirtProvider: Send + Sync {
    fn list(&self) -> Result<Vec<VirtualMachine>>;
    fn namespaces(&self) -> Result<Vec<String>>;
}

/// Immutable per-tick view of this node's instances, their desired
/// disks, observed virts, VPCs and kernel namespaces. Computed once and
/// passed by value so the reconciler never reads mutating state
/// mid-walk.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub instances: Vec<Instance>,
    pub disks: HashMap<Uuid, Vec<Disk>>,
    pub virts: HashMap<Uuid, VirtualMachine>,
    pub vpcs: HashMap<Uuid, Vpc>,
    pub namespaces: HashSet<String>,
}

impl Snapshot {
    pub fn assemble(db: &Database, node_id: Uuid, provider: &dyn VirtProvider) -> Result<Self> {
        let instances = instances::get_node(db, node_id)?;

        let instance_ids: Vec<Uuid> = instances.iter().map(|inst| inst.id).collect();
        let mut disk_map: HashMap<Uuid, Vec<Disk>> = HashMap::new();
        for dsk in disks::get_instances(db, &instance_ids)? {
            disk_map.entry(dsk.instance).or_default().push(dsk);
        }
        for dsks in disk_map.values_mut() {
            dsks.sort_by_key(|dsk| dsk.index);
        }

        let vpc_map: HashMap<Uuid, Vpc> = vpcs::get_all(db)?
            .into_iter()
            .map(|vc| (vc.id, vc))
            .collect();

        let virt_map: HashMap<Uuid, VirtualMachine> = provider
            .list()?
            .into_iter()
            .map(|virt| (virt.id, virt))
            .collect();

        let namespaces: HashSet<String> = provider.namespaces()?.into_iter().collect();

        Ok(Self {
            instances,
            disks: disk_map,
            virts: virt_map,
            vpcs: vpc_map,
            namespaces,
        })
    }

    pub fn get_virt(&self, instance_id: Uuid) -> Option<&VirtualMachine> {
        self.virts.get(&instance_id)
    }

    pub fn vpc(&self, vpc_id: Uuid) -> Option<&Vpc> {
        self.vpcs.get(&vpc_id)
    }

    pub fn instance_disks(&self, instance_id: Uuid) -> &[Disk] {
        self.disks
            .get(&instance_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Kernel namespace names, one per line of `ip netns list` (the first
/// token; newer iproute2 appends an id suffix).
pub fn list_namespaces() -> Result<Vec<String>> {
    let output = exec::combined_output_logged(&[], "ip", &["netns", "list"])?;

    Ok(output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(|name| name.to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec_mock::{self, MockResponse};
    use crate::sim::SimHypervisor;
    use stratus_core::instance::DesiredState;
    use stratus_core::vm;

    fn seed_instance(db: &Database, node: Uuid) -> Instance {
        let inst = Instance {
            id: Uuid::new_v4(),
            organization: Uuid::new_v4(),
            zone: Uuid::new_v4(),
            node,
            vpc: Uuid::new_v4(),
            image: Uuid::new_v4(),
            name: "web-1".to_string(),
            state: DesiredState::Start,
            memory: 1024,
            processors: 2,
            network_roles: vec![],
            domain: None,
            init_disk_size: 10,
            restart: false,
        };
        db.instances().insert(&inst).unwrap();
        inst
    }

    #[test]
    fn test_assemble_scopes_to_node() {
        let db = Database::new();
        let node = Uuid::new_v4();
        let inst = seed_instance(&db, node);
        seed_instance(&db, Uuid::new_v4());

        db.disks()
            .insert(&Disk {
                id: Uuid::new_v4(),
                instance: inst.id,
                index: 0,
            })
            .unwrap();

        let provider = SimHypervisor::new();
        provider.set_virt(inst.virt(&[]));

        let snapshot = Snapshot::assemble(&db, node, &provider).unwrap();
        assert_eq!(snapshot.instances.len(), 1);
        assert_eq!(snapshot.instance_disks(inst.id).len(), 1);
        assert!(snapshot.get_virt(inst.id).is_some());
        assert!(snapshot.namespaces.contains(&vm::get_namespace(inst.id, 0)));
    }

    #[test]
    fn test_list_namespaces_parses_id_suffix() {
        let _guard = exec_mock::install(|_, _| {
            MockResponse::ok("na1b2c3d4e5f60 (id: 0)\nnf6e5d4c3b2a10")
        });
        let namespaces = list_namespaces().unwrap();
        assert_eq!(namespaces, vec!["na1b2c3d4e5f60", "nf6e5d4c3b2a10"]);
    }
}
