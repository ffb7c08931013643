use uuid::Uuid;

use stratus_core::errortypes::Error;
use stratus_core::node::Node;

use crate::database::{Database, Filter, oid};

pub fn get(db: &Database, node_id: Uuid) -> Result<Node, Error> {
    db.nodes().find_one_key(&oid(node_id))
}

pub fn get_all(db: &Database) -> Result<Vec<Node>, Error> {
    db.nodes().find(&Filter::new())
}

/// Register or refresh this node's record at startup.
pub fn ensure(db: &Database, node: &Node) -> Result<(), Error> {
    db.nodes().commit(node)
}

/// Commit the per-tick reserved resource accounting.
pub fn commit_resources(
    db: &Database,
    node_id: Uuid,
    cpu_units: u32,
    memory_units: f64,
) -> Result<(), Error> {
    let mut node = get(db, node_id)?;
    node.cpu_units_res = cpu_units;
    node.memory_units_res = memory_units;
    db.nodes()
        .commit_fields(&node, &["cpu_units_res", "memory_units_res"])
}
