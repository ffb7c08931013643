use uuid::Uuid;

use stratus_core::disk::Disk;
use stratus_core::errortypes::Error;

use crate::database::{Database, Filter};

/// Desired disk records for one instance, ordered by index.
pub fn get_instance(db: &Database, instance_id: Uuid) -> Result<Vec<Disk>, Error> {
    let mut disks = db
        .disks()
        .find(&Filter::new().eq("instance", instance_id))?;
    disks.sort_by_key(|dsk| dsk.index);
    Ok(disks)
}

/// Desired disk records for a set of instances, for snapshot assembly.
pub fn get_instances(db: &Database, instance_ids: &[Uuid]) -> Result<Vec<Disk>, Error> {
    if instance_ids.is_empty() {
        return Ok(Vec::new());
    }
    db.disks()
        .find(&Filter::new().is_in("instance", instance_ids))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_instance_sorted_by_index() {
        let db = Database::new();
        let instance = Uuid::new_v4();
        for index in [2u32, 0, 1] {
            db.disks()
                .insert(&Disk {
                    id: Uuid::new_v4(),
                    instance,
                    index,
                })
                .unwrap();
        }

        let disks = get_instance(&db, instance).unwrap();
        let indexes: Vec<u32> = disks.iter().map(|dsk| dsk.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }
}
