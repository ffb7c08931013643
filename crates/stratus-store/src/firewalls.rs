use uuid::Uuid;

use stratus_core::errortypes::Error;
use stratus_core::firewall::Firewall;

use crate::database::{Database, Filter};

pub fn get_org(db: &Database, org_id: Uuid, firewall_id: Uuid) -> Result<Firewall, Error> {
    db.firewalls()
        .find_one(&Filter::new().eq("id", firewall_id).eq("organization", org_id))?
        .ok_or_else(|| Error::NotFound("firewall: Not found in organization".to_string()))
}

/// Firewalls whose network roles intersect the given roles.
pub fn get_roles(db: &Database, org_id: Uuid, roles: &[String]) -> Result<Vec<Firewall>, Error> {
    if roles.is_empty() {
        return Ok(Vec::new());
    }
    db.firewalls().find(
        &Filter::new()
            .eq("organization", org_id)
            .is_in("network_roles", roles),
    )
}

pub fn insert(db: &Database, fire: &Firewall) -> Result<(), Error> {
    db.firewalls().insert(fire)
}
