use uuid::Uuid;

use stratus_core::errortypes::Error;
use stratus_core::vpc::Vpc;

use crate::database::{Database, Filter, oid};

pub fn get(db: &Database, vpc_id: Uuid) -> Result<Vpc, Error> {
    db.vpcs().find_one_key(&oid(vpc_id))
}

pub fn get_all(db: &Database) -> Result<Vec<Vpc>, Error> {
    db.vpcs().find(&Filter::new())
}

pub fn exists_org(db: &Database, org_id: Uuid, vpc_id: Uuid) -> Result<bool, Error> {
    Ok(db
        .vpcs()
        .find_one(&Filter::new().eq("id", vpc_id).eq("organization", org_id))?
        .is_some())
}
