use uuid::Uuid;

use stratus_core::errortypes::Error;
use stratus_core::user::User;

use crate::database::{Database, oid};

pub fn get(db: &Database, user_id: Uuid) -> Result<User, Error> {
    db.users().find_one_key(&oid(user_id))
}

pub fn commit_fields(db: &Database, usr: &User, fields: &[&str]) -> Result<(), Error> {
    db.users().commit_fields(usr, fields)
}
