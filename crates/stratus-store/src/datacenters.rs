use uuid::Uuid;

use stratus_core::datacenter::Datacenter;
use stratus_core::errortypes::Error;

use crate::database::{Database, Filter, oid};

pub fn get(db: &Database, dc_id: Uuid) -> Result<Datacenter, Error> {
    db.datacenters().find_one_key(&oid(dc_id))
}

pub fn get_all(db: &Database) -> Result<Vec<Datacenter>, Error> {
    db.datacenters().find(&Filter::new())
}

/// Removing an absent datacenter is a no-op.
pub fn remove(db: &Database, dc_id: Uuid) -> Result<(), Error> {
    match db.datacenters().remove_key(&oid(dc_id)) {
        Err(Error::NotFound(_)) => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_absent_is_noop() {
        let db = Database::new();
        assert!(remove(&db, Uuid::new_v4()).is_ok());
    }
}
