//! In-process simulated collaborators: a hypervisor that tracks virts in
//! memory and a route table that never touches the kernel. Used by tests
//! and local development.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use uuid::Uuid;

use stratus_core::instance::Instance;
use stratus_core::vm::{self, Disk, VirtualMachine, VmState};
use stratus_core::vpc::Route;

use crate::hypervisor::{Hypervisor, QemuSpec};
use crate::routes::RouteOps;
use crate::state::VirtProvider;

/// Simulated hypervisor: transitions mutate an in-memory virt table and
/// every primitive call is recorded for assertions.
#[derive(Default)]
pub struct SimHypervisor {
    virts: Mutex<HashMap<Uuid, VirtualMachine>>,
    calls: Mutex<Vec<String>>,
}

impl SimHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_virt(&self, virt: VirtualMachine) {
        self.virts.lock().unwrap().insert(virt.id, virt);
    }

    pub fn virt(&self, instance_id: Uuid) -> Option<VirtualMachine> {
        self.virts.lock().unwrap().get(&instance_id).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Hypervisor for SimHypervisor {
    fn create(&self, inst: &Instance, virt: &VirtualMachine, _spec: &QemuSpec) -> Result<()> {
        self.record(format!("create {}", inst.id.simple()));
        let mut created = virt.clone();
        created.state = VmState::Stopped;
        self.virts.lock().unwrap().insert(inst.id, created);
        Ok(())
    }

    fn power_on(&self, inst: &Instance, _virt: &VirtualMachine) -> Result<()> {
        self.record(format!("power_on {}", inst.id.simple()));
        // No-op when already running.
        if let Some(virt) = self.virts.lock().unwrap().get_mut(&inst.id) {
            virt.state = VmState::Running;
        }
        Ok(())
    }

    fn power_off(&self, virt: &VirtualMachine) -> Result<()> {
        self.record(format!("power_off {}", virt.id.simple()));
        if let Some(stored) = self.virts.lock().unwrap().get_mut(&virt.id) {
            stored.state = VmState::Stopped;
        }
        Ok(())
    }

    fn destroy(&self, virt: &VirtualMachine) -> Result<()> {
        self.record(format!("destroy {}", virt.id.simple()));
        self.virts.lock().unwrap().remove(&virt.id);
        Ok(())
    }

    fn remove_disk(&self, instance_id: Uuid, disk: &Disk) -> Result<()> {
        self.record(format!("remove_disk {} {}", instance_id.simple(), disk.index));
        if let Some(virt) = self.virts.lock().unwrap().get_mut(&instance_id) {
            virt.disks.retain(|dsk| dsk.index != disk.index);
        }
        Ok(())
    }
}

impl VirtProvider for SimHypervisor {
    fn list(&self) -> Result<Vec<VirtualMachine>> {
        Ok(self.virts.lock().unwrap().values().cloned().collect())
    }

    fn namespaces(&self) -> Result<Vec<String>> {
        Ok(self
            .virts
            .lock()
            .unwrap()
            .keys()
            .map(|id| vm::get_namespace(*id, 0))
            .collect())
    }
}

#[derive(Default, Clone, Debug)]
struct SimTable {
    routes: Vec<Route>,
    routes6: Vec<Route>,
}

/// Simulated namespace route tables with a mutation log.
#[derive(Default)]
pub struct SimRouteOps {
    tables: Mutex<HashMap<Uuid, SimTable>>,
    log: Mutex<Vec<String>>,
}

impl SimRouteOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, instance_id: Uuid, routes: Vec<Route>, routes6: Vec<Route>) {
        self.tables
            .lock()
            .unwrap()
            .insert(instance_id, SimTable { routes, routes6 });
    }

    pub fn routes(&self, instance_id: Uuid) -> (Vec<Route>, Vec<Route>) {
        let tables = self.tables.lock().unwrap();
        let table = tables.get(&instance_id).cloned().unwrap_or_default();
        (table.routes, table.routes6)
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn find_table<'a>(
        tables: &'a mut HashMap<Uuid, SimTable>,
        namespace: &str,
    ) -> Option<&'a mut SimTable> {
        let id = tables
            .keys()
            .find(|id| vm::get_namespace(**id, 0) == namespace)
            .copied()?;
        tables.get_mut(&id)
    }
}

impl RouteOps for SimRouteOps {
    fn get(&self, instance_id: Uuid) -> Result<Option<(Vec<Route>, Vec<Route>)>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .get(&instance_id)
            .cloned()
            .map(|table| (table.routes, table.routes6)))
    }

    fn add(&self, namespace: &str, route: &Route, ipv6: bool) -> Result<()> {
        self.log.lock().unwrap().push(format!(
            "add{} {} via {}",
            if ipv6 { "6" } else { "" },
            route.destination,
            route.target
        ));

        let mut tables = self.tables.lock().unwrap();
        if let Some(table) = Self::find_table(&mut tables, namespace) {
            let routes = if ipv6 {
                &mut table.routes6
            } else {
                &mut table.routes
            };
            if !routes.contains(route) {
                routes.push(route.clone());
            }
        }
        Ok(())
    }

    fn del(&self, namespace: &str, route: &Route, ipv6: bool) -> Result<()> {
        self.log.lock().unwrap().push(format!(
            "del{} {} via {}",
            if ipv6 { "6" } else { "" },
            route.destination,
            route.target
        ));

        let mut tables = self.tables.lock().unwrap();
        if let Some(table) = Self::find_table(&mut tables, namespace) {
            let routes = if ipv6 {
                &mut table.routes6
            } else {
                &mut table.routes
            };
            routes.retain(|r| r != route);
        }
        Ok(())
    }
}
