use serde_json::json;
use uuid::Uuid;

use stratus_core::errortypes::Error;
use stratus_core::instance::{DesiredState, Instance};

use crate::database::{Database, Filter, oid};

pub fn get(db: &Database, instance_id: Uuid) -> Result<Instance, Error> {
    db.instances().find_one_key(&oid(instance_id))
}

pub fn get_org(db: &Database, org_id: Uuid, instance_id: Uuid) -> Result<Instance, Error> {
    db.instances()
        .find_one(&Filter::new().eq("id", instance_id).eq("organization", org_id))?
        .ok_or_else(|| Error::NotFound("instance: Not found in organization".to_string()))
}

/// All instances this node is authoritative for.
pub fn get_node(db: &Database, node_id: Uuid) -> Result<Vec<Instance>, Error> {
    db.instances().find(&Filter::new().eq("node", node_id))
}

/// Arm deletion: the owning node's next reconciler pass destroys the
/// virt and removes the record.
pub fn delete_org(db: &Database, org_id: Uuid, instance_id: Uuid) -> Result<(), Error> {
    let updated = db.instances().update_many(
        &Filter::new().eq("id", instance_id).eq("organization", org_id),
        &json!({"state": DesiredState::Destroy}),
    )?;
    if updated == 0 {
        return Err(Error::NotFound(
            "instance: Not found in organization".to_string(),
        ));
    }
    Ok(())
}

/// Bulk desired-state change. Any state other than Start also clears the
/// advisory restart flag, a reconciler-owned field the transition
/// invalidates.
pub fn update_multi(
    db: &Database,
    org_id: Uuid,
    ids: &[Uuid],
    state: DesiredState,
) -> Result<(), Error> {
    let mut doc = json!({"state": state});
    if state != DesiredState::Start {
        doc["restart"] = json!(false);
    }

    db.instances().update_many(
        &Filter::new().is_in("id", ids).eq("organization", org_id),
        &doc,
    )?;
    Ok(())
}

/// Force removal of the record, bypassing organization ownership. Used
/// by the reconciler after the virt is destroyed.
pub fn remove(db: &Database, instance_id: Uuid) -> Result<(), Error> {
    match db.instances().remove_key(&oid(instance_id)) {
        Err(Error::NotFound(_)) => Ok(()),
        other => other,
    }
}

pub fn commit_fields(db: &Database, inst: &Instance, fields: &[&str]) -> Result<(), Error> {
    db.instances().commit_fields(inst, fields)
}
