use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, warn};
use uuid::Uuid;

use stratus_core::disk;
use stratus_core::errortypes::Error;
use stratus_core::instance::{DesiredState, Instance};
use stratus_core::multilock::MultiTimeoutLock;
use stratus_core::vm::{self, VirtualMachine, VmState};
use stratus_core::vpc::{Route, Vpc};
use stratus_store::database::{Database, oid};
use stratus_store::events::{self, EventBus};
use stratus_store::routes_cache::RouteCache;
use stratus_store::{instances, nodes};

use crate::hypervisor::{Hypervisor, QemuSpec};
use crate::routes::RouteOps;
use crate::state::Snapshot;

const LOCK_TIMEOUT: Duration = Duration::from_secs(3 * 60);
const CREATE_LOCK_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Tail delay before a mutating worker releases its lock, damping
/// oscillation when a primitive completes fractionally before the
/// hypervisor's own state propagates.
const SETTLE_DELAY: Duration = Duration::from_secs(3);

/// Per-instance state machine. Each tick consumes one snapshot and
/// either skips a busy instance or spawns a lock-serialized worker for
/// exactly one transition; the tick itself never blocks on worker
/// progress.
pub struct Instances {
    db: Database,
    node_id: Uuid,
    kvm: bool,
    lock: Arc<MultiTimeoutLock>,
    hypervisor: Arc<dyn Hypervisor>,
    route_ops: Arc<dyn RouteOps>,
    route_cache: RouteCache,
    events: Arc<dyn EventBus>,
    settle_delay: Duration,
}

impl Instances {
    pub fn new(
        db: Database,
        node_id: Uuid,
        kvm: bool,
        hypervisor: Arc<dyn Hypervisor>,
        route_ops: Arc<dyn RouteOps>,
        route_cache: RouteCache,
        events: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            db,
            node_id,
            kvm,
            lock: Arc::new(MultiTimeoutLock::new(LOCK_TIMEOUT)),
            hypervisor,
            route_ops,
            route_cache,
            events,
            settle_delay: SETTLE_DELAY,
        }
    }

    /// Shorten the settle delay; tests converge without the production
    /// damping.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// True while a worker holds or waits on the instance lock.
    pub fn busy(&self, instance_id: Uuid) -> bool {
        self.lock.locked(&oid(instance_id))
    }

    /// Guarded worker spawn: skip if the instance is busy, otherwise
    /// acquire the lock and hand release duty to the worker thread.
    fn enqueue<F>(&self, instance_id: Uuid, timeout: Duration, settle: bool, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let key = oid(instance_id);
        if self.lock.locked(&key) {
            return;
        }

        let lock_id = self.lock.lock_timeout(&key, timeout);
        let lock = Arc::clone(&self.lock);
        let settle_delay = if settle { self.settle_delay } else { Duration::ZERO };

        thread::spawn(move || {
            work();
            if !settle_delay.is_zero() {
                thread::sleep(settle_delay);
            }
            lock.unlock(&key, lock_id);
        });
    }

    fn create(&self, inst: &Instance, disks: &[disk::Disk]) {
        let instance_id = inst.id;
        let inst = inst.clone();
        let virt = inst.virt(disks);
        let spec = QemuSpec::new(&virt, self.kvm);
        let hypervisor = Arc::clone(&self.hypervisor);
        let bus = Arc::clone(&self.events);

        self.enqueue(instance_id, CREATE_LOCK_TIMEOUT, true, move || {
            if let Err(e) = hypervisor.create(&inst, &virt, &spec) {
                error!(
                    instance_id = %instance_id,
                    error = %e,
                    "deploy: Failed to create instance"
                );
                return;
            }

            events::dispatch(bus.as_ref(), "instance.change");
        });
    }

    fn start(&self, inst: &Instance, virt: &VirtualMachine) {
        let instance_id = inst.id;
        let inst = inst.clone();
        let virt = virt.clone();
        let hypervisor = Arc::clone(&self.hypervisor);
        let bus = Arc::clone(&self.events);

        self.enqueue(instance_id, LOCK_TIMEOUT, true, move || {
            if let Err(e) = hypervisor.power_on(&inst, &virt) {
                error!(
                    instance_id = %instance_id,
                    error = %e,
                    "deploy: Failed to start instance"
                );
                return;
            }

            events::dispatch(bus.as_ref(), "instance.change");
        });
    }

    fn stop(&self, inst: &Instance, virt: &VirtualMachine) {
        let instance_id = inst.id;
        let virt = virt.clone();
        let hypervisor = Arc::clone(&self.hypervisor);
        let bus = Arc::clone(&self.events);

        self.enqueue(instance_id, LOCK_TIMEOUT, true, move || {
            if let Err(e) = hypervisor.power_off(&virt) {
                error!(
                    instance_id = %instance_id,
                    error = %e,
                    "deploy: Failed to stop instance"
                );
                return;
            }

            events::dispatch(bus.as_ref(), "instance.change");
        });
    }

    /// Ordered power-on, power-off, then a commit back to Start so the
    /// next tick rejoins the Start branch. The power-on is a no-op when
    /// the virt is already running.
    fn restart(&self, inst: &Instance, virt: &VirtualMachine) {
        let instance_id = inst.id;
        let mut inst = inst.clone();
        let virt = virt.clone();
        let db = self.db.clone();
        let hypervisor = Arc::clone(&self.hypervisor);
        let bus = Arc::clone(&self.events);

        self.enqueue(instance_id, LOCK_TIMEOUT, true, move || {
            if let Err(e) = hypervisor.power_on(&inst, &virt) {
                error!(
                    instance_id = %instance_id,
                    error = %e,
                    "deploy: Failed to restart instance"
                );
                return;
            }

            thread::sleep(Duration::from_secs(1));

            if let Err(e) = hypervisor.power_off(&virt) {
                error!(
                    instance_id = %instance_id,
                    error = %e,
                    "deploy: Failed to restart instance"
                );
                return;
            }

            inst.state = DesiredState::Start;
            if instances::commit_fields(&db, &inst, &["state"]).is_err() {
                return;
            }

            events::dispatch(bus.as_ref(), "instance.change");
        });
    }

    fn destroy(&self, inst: &Instance, virt: Option<&VirtualMachine>) {
        let instance_id = inst.id;
        let virt = virt.cloned();
        let db = self.db.clone();
        let hypervisor = Arc::clone(&self.hypervisor);
        let bus = Arc::clone(&self.events);

        self.enqueue(instance_id, LOCK_TIMEOUT, true, move || {
            if let Some(virt) = virt
                && let Err(e) = hypervisor.destroy(&virt)
            {
                error!(
                    instance_id = %instance_id,
                    error = %e,
                    "deploy: Failed to power off instance"
                );
                return;
            }

            if let Err(e) = instances::remove(&db, instance_id) {
                error!(
                    instance_id = %instance_id,
                    error = %e,
                    "deploy: Failed to remove instance"
                );
                return;
            }

            events::dispatch(bus.as_ref(), "instance.change");
            events::dispatch(bus.as_ref(), "disk.change");
        });
    }

    /// Detach vanished disks over QMP, index ascending.
    fn disk_remove(&self, inst: &Instance, rem_disks: Vec<vm::Disk>) {
        let instance_id = inst.id;
        let hypervisor = Arc::clone(&self.hypervisor);
        let bus = Arc::clone(&self.events);

        self.enqueue(instance_id, LOCK_TIMEOUT, true, move || {
            for dsk in &rem_disks {
                if let Err(e) = hypervisor.remove_disk(instance_id, dsk) {
                    error!(
                        instance_id = %instance_id,
                        disk_index = dsk.index,
                        error = %e,
                        "deploy: Failed to remove disk"
                    );
                    return;
                }
            }

            events::dispatch(bus.as_ref(), "instance.change");
            events::dispatch(bus.as_ref(), "disk.change");
        });
    }

    /// Config drift detection. The restart flag is advisory UI state:
    /// the hypervisor is only restarted on an explicit Restart desired
    /// state, never from here.
    fn diff(&self, snapshot: &Snapshot, inst: &Instance) -> Result<()> {
        let Some(virt) = snapshot.get_virt(inst.id) else {
            return Ok(());
        };
        let disks = snapshot.instance_disks(inst.id);

        let mut changed = inst.changed(virt);
        let (add_disks, rem_disks) = inst.disk_changed(disks, virt);
        if !add_disks.is_empty() {
            changed = true;
        }

        if self.lock.locked(&oid(inst.id)) {
            return Ok(());
        }

        if changed && !inst.restart {
            let mut inst = inst.clone();
            inst.restart = true;
            instances::commit_fields(&self.db, &inst, &["restart"])?;
        } else if !changed && inst.restart {
            let mut inst = inst.clone();
            inst.restart = false;
            instances::commit_fields(&self.db, &inst, &["restart"])?;
        }

        if !rem_disks.is_empty() {
            self.disk_remove(inst, rem_disks);
        }

        Ok(())
    }

    /// Verify the instance namespace exists. On a miss the tick abandons
    /// further per-instance work; the namespace is recreated by the
    /// hypervisor primitive on the next transition.
    fn check(&self, snapshot: &Snapshot, inst: &Instance) -> bool {
        let namespace = vm::get_namespace(inst.id, 0);
        if !snapshot.namespaces.contains(&namespace) {
            error!(
                instance_id = %inst.id,
                net_namespace = %namespace,
                "deploy: Instance missing namespace"
            );
            return false;
        }

        true
    }

    fn routes(&self, snapshot: &Snapshot, inst: &Instance) {
        let instance_id = inst.id;
        let vpc_id = inst.vpc;
        let vpc = snapshot.vpc(vpc_id).cloned();
        let route_ops = Arc::clone(&self.route_ops);
        let route_cache = self.route_cache.clone();

        // Route changes converge on the next probe; no settle delay.
        self.enqueue(instance_id, LOCK_TIMEOUT, false, move || {
            let Some(vpc) = vpc else {
                let err = Error::NotFound("deploy: Instance vpc not found".to_string());
                error!(
                    instance_id = %instance_id,
                    vpc_id = %vpc_id,
                    error = %err,
                    "deploy: Failed to deploy instance routes"
                );
                return;
            };

            if let Err(e) =
                reconcile_routes(instance_id, &vpc, route_ops.as_ref(), &route_cache)
            {
                error!(
                    instance_id = %instance_id,
                    error = %e,
                    "deploy: Failed to deploy instance routes"
                );
            }
        });
    }

    /// One reconciler pass over the snapshot.
    pub fn deploy(&self, snapshot: &Snapshot) -> Result<()> {
        let mut cpu_units: u32 = 0;
        let mut memory_units: f64 = 0.0;

        for inst in &snapshot.instances {
            let virt = snapshot.get_virt(inst.id);

            if inst.state == DesiredState::Destroy {
                self.destroy(inst, virt);
                continue;
            }

            cpu_units += inst.processors;
            memory_units += f64::from(inst.memory) / 1024.0;

            let Some(virt) = virt else {
                self.create(inst, snapshot.instance_disks(inst.id));
                continue;
            };

            match inst.state {
                DesiredState::Start => {
                    if virt.state == VmState::Stopped || virt.state == VmState::Failed {
                        self.start(inst, virt);
                        continue;
                    }

                    if !self.check(snapshot, inst) {
                        continue;
                    }

                    self.diff(snapshot, inst)?;
                    self.routes(snapshot, inst);
                }
                DesiredState::Stop => {
                    if virt.state == VmState::Running {
                        self.stop(inst, virt);
                    }
                }
                DesiredState::Restart => {
                    if virt.state == VmState::Running {
                        self.restart(inst, virt);
                    }
                }
                DesiredState::Destroy => {}
            }
        }

        if let Err(e) = nodes::commit_resources(&self.db, self.node_id, cpu_units, memory_units) {
            warn!(
                node_id = %self.node_id,
                error = %e,
                "deploy: Failed to commit node resources"
            );
        }

        Ok(())
    }
}

/// Apply set differences between observed and desired routes in the
/// instance namespace. Add and del failures are logged by the executor
/// and do not fail the tick; any attempted change invalidates the
/// catalog entry so the next tick re-probes.
fn reconcile_routes(
    instance_id: Uuid,
    vpc: &Vpc,
    ops: &dyn RouteOps,
    cache: &RouteCache,
) -> Result<()> {
    let namespace = vm::get_namespace(instance_id, 0);

    let (cur_routes, cur_routes6) = match cache.get(instance_id) {
        Some(cached) => (cached.routes, cached.routes6),
        None => {
            let Some((routes, routes6)) = ops.get(instance_id)? else {
                return Ok(());
            };
            cache.set(instance_id, routes.clone(), routes6.clone());
            (routes, routes6)
        }
    };

    let mut desired: HashSet<Route> = HashSet::new();
    let mut desired6: HashSet<Route> = HashSet::new();
    for route in &vpc.routes {
        if route.destination.contains(':') {
            desired6.insert(route.clone());
        } else {
            desired.insert(route.clone());
        }
    }

    let observed: HashSet<Route> = cur_routes.into_iter().collect();
    let observed6: HashSet<Route> = cur_routes6.into_iter().collect();

    let mut changed = false;

    for route in observed.difference(&desired) {
        changed = true;
        let _ = ops.del(&namespace, route, false);
    }

    for route in observed6.difference(&desired6) {
        changed = true;
        let _ = ops.del(&namespace, route, true);
    }

    for route in desired.difference(&observed) {
        changed = true;
        let _ = ops.add(&namespace, route, false);
    }

    for route in desired6.difference(&observed6) {
        changed = true;
        let _ = ops.add(&namespace, route, true);
    }

    if changed {
        cache.remove(instance_id);
    }

    Ok(())
}
