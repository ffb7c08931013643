use chrono::Utc;
use uuid::Uuid;

use stratus_core::device::Device;
use stratus_core::errortypes::Error;

use crate::database::{Database, Filter, oid};

pub fn get(db: &Database, device_id: Uuid) -> Result<Device, Error> {
    db.devices().find_one_key(&oid(device_id))
}

pub fn get_all(db: &Database, user_id: Uuid) -> Result<Vec<Device>, Error> {
    db.devices().find(&Filter::new().eq("user", user_id))
}

pub fn insert(db: &Database, dev: &Device) -> Result<(), Error> {
    db.devices().insert(dev)
}

pub fn commit_fields(db: &Database, dev: &Device, fields: &[&str]) -> Result<(), Error> {
    db.devices().commit_fields(dev, fields)
}

/// Record a successful assertion: bump the signature counter and the
/// activity timestamp.
pub fn set_active(db: &Database, dev: &mut Device, counter: u32) -> Result<(), Error> {
    dev.u2f_counter = counter;
    dev.last_active = Utc::now();
    db.devices()
        .commit_fields(dev, &["u2f_counter", "last_active"])
}

/// Removing an absent device is a no-op.
pub fn remove(db: &Database, device_id: Uuid) -> Result<(), Error> {
    match db.devices().remove_key(&oid(device_id)) {
        Err(Error::NotFound(_)) => Ok(()),
        other => other,
    }
}
