use uuid::Uuid;

use stratus_core::errortypes::Error;
use stratus_core::storage::Storage;

use crate::database::{Database, Filter, oid};

pub fn get(db: &Database, storage_id: Uuid) -> Result<Storage, Error> {
    db.storages().find_one_key(&oid(storage_id))
}

pub fn get_all(db: &Database) -> Result<Vec<Storage>, Error> {
    db.storages().find(&Filter::new())
}
