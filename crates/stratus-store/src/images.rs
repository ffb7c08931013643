use uuid::Uuid;

use stratus_core::datacenter::Datacenter;
use stratus_core::errortypes::Error;
use stratus_core::image::Image;

use crate::database::{Database, Filter, oid};

pub fn get(db: &Database, image_id: Uuid) -> Result<Image, Error> {
    db.images().find_one_key(&oid(image_id))
}

/// Upsert keyed on `(storage, key)`. Administrative fields (`name`,
/// `organization`) on an existing row are preserved; new rows leave them
/// blank for later fill-in.
pub fn upsert(db: &Database, img: &Image) -> Result<(), Error> {
    let existing = db.images().find_one(
        &Filter::new()
            .eq("storage", img.storage)
            .eq("key", img.key.as_str()),
    )?;

    match existing {
        Some(mut stored) => {
            stored.etag = img.etag.clone();
            stored.kind = img.kind.clone();
            db.images().commit(&stored)
        }
        None => db.images().insert(img),
    }
}

/// Distinct object keys currently cataloged for one storage.
pub fn distinct_keys(db: &Database, storage_id: Uuid) -> Result<Vec<String>, Error> {
    db.images()
        .distinct("key", &Filter::new().eq("storage", storage_id))
}

/// Bulk-delete catalog rows whose keys vanished from the bucket.
pub fn remove_keys(db: &Database, storage_id: Uuid, keys: &[String]) -> Result<(), Error> {
    if keys.is_empty() {
        return Ok(());
    }
    db.images().remove_many(
        &Filter::new()
            .eq("storage", storage_id)
            .is_in("key", keys),
    )?;
    Ok(())
}

/// Images visible in a datacenter: rows from the public storages first,
/// then the private storage. An empty public set does not short-circuit
/// the private listing.
pub fn datacenter_images(db: &Database, dc: &Datacenter) -> Result<Vec<Image>, Error> {
    let mut images = if dc.public_storages.is_empty() {
        Vec::new()
    } else {
        db.images()
            .find(&Filter::new().is_in("storage", &dc.public_storages))?
    };

    if let Some(private_id) = dc.private_storage {
        images.extend(
            db.images()
                .find(&Filter::new().eq("storage", private_id))?,
        );
    }

    Ok(images)
}
