use uuid::Uuid;

use stratus_core::errortypes::Error;
use stratus_core::session::Session;

use crate::database::{Database, Filter};

/// Sessions for a user; removed sessions are filtered out unless
/// explicitly requested.
pub fn get_all(db: &Database, user_id: Uuid, show_removed: bool) -> Result<Vec<Session>, Error> {
    let mut filter = Filter::new().eq("user", user_id);
    if !show_removed {
        filter = filter.eq("removed", false);
    }
    db.sessions().find(&filter)
}

/// Removing an absent session is a no-op.
pub fn remove(db: &Database, session_id: &str) -> Result<(), Error> {
    match db.sessions().remove_key(session_id) {
        Err(Error::NotFound(_)) => Ok(()),
        other => other,
    }
}
