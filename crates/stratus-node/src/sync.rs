use std::collections::HashSet;

use chrono::{DateTime, SecondsFormat, Utc};
use md5::{Digest, Md5};
use uuid::Uuid;

use stratus_core::errortypes::Error;
use stratus_core::image::Image;
use stratus_core::storage::Storage;
use stratus_store::database::Database;
use stratus_store::images;
use stratus_store::objectstore::{self, ObjectStoreProvider};

/// Deterministic pseudo-etag for objects the store lists without one, so
/// unchanged listings produce stable upserts.
fn derived_etag(last_modified: &DateTime<Utc>) -> String {
    let stamp = last_modified.to_rfc3339_opts(SecondsFormat::Secs, true);
    let digest = Md5::digest(stamp.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Reconcile the bucket listing of one storage with the image catalog:
/// upsert every listed object, then delete catalog rows whose keys
/// vanished. A connection failure aborts before any upsert; a listing
/// error aborts mid-pass and leaves already-upserted rows in place, so
/// deletion only runs after a clean listing.
pub fn sync(db: &Database, provider: &dyn ObjectStoreProvider, store: &Storage) -> Result<(), Error> {
    let client = objectstore::connect(provider, store)?;

    let mut remote_keys: HashSet<String> = HashSet::new();

    for object in client.list_objects(&store.bucket) {
        let object =
            object.map_err(|_| Error::Request("storage: Failed to list objects".to_string()))?;

        let mut etag = object.etag;
        if etag.is_empty() {
            etag = derived_etag(&object.last_modified);
        }
        etag.retain(|c| c.is_ascii_alphanumeric());

        remote_keys.insert(object.key.clone());

        images::upsert(
            db,
            &Image {
                id: Uuid::new_v4(),
                name: String::new(),
                organization: None,
                kind: store.kind.clone(),
                storage: store.id,
                key: object.key,
                etag,
            },
        )?;
    }

    let local_keys = images::distinct_keys(db, store.id)?;
    let remove_keys: Vec<String> = local_keys
        .into_iter()
        .filter(|key| !remote_keys.contains(key))
        .collect();

    images::remove_keys(db, store.id, &remove_keys)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stratus_store::database::Filter;
    use stratus_store::objectstore::{MemoryObjectStore, RemoteObject};

    fn storage() -> Storage {
        Storage {
            id: Uuid::new_v4(),
            name: "minio".to_string(),
            endpoint: "minio.local:9000".to_string(),
            bucket: "images".to_string(),
            access_key: "ak".to_string(),
            secret_key: "sk".to_string(),
            insecure: false,
            kind: "public".to_string(),
        }
    }

    fn object(key: &str, etag: &str) -> RemoteObject {
        RemoteObject {
            key: key.to_string(),
            etag: etag.to_string(),
            last_modified: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    fn local_keys(db: &Database, store: &Storage) -> Vec<String> {
        let mut keys = images::distinct_keys(db, store.id).unwrap();
        keys.sort();
        keys
    }

    #[test]
    fn test_sync_converges_key_set() {
        let db = Database::new();
        let store = storage();
        let remote = MemoryObjectStore::new();

        // Local {a, b, c}; bucket lists {a, c, d}.
        for key in ["a", "b", "c"] {
            images::upsert(
                &db,
                &Image {
                    id: Uuid::new_v4(),
                    name: String::new(),
                    organization: None,
                    kind: store.kind.clone(),
                    storage: store.id,
                    key: key.to_string(),
                    etag: "e1".to_string(),
                },
            )
            .unwrap();
        }
        for key in ["a", "c", "d"] {
            remote.put_object(&store.bucket, object(key, "e1"));
        }

        sync(&db, &remote, &store).unwrap();
        assert_eq!(local_keys(&db, &store), vec!["a", "c", "d"]);

        let created = db
            .images()
            .find(&Filter::new().eq("key", "d"))
            .unwrap()
            .remove(0);
        assert_eq!(created.kind, "public");
        assert!(created.name.is_empty());
    }

    #[test]
    fn test_sync_idempotent_on_unchanged_listing() {
        let db = Database::new();
        let store = storage();
        let remote = MemoryObjectStore::new();
        remote.put_object(&store.bucket, object("a", "e1"));

        sync(&db, &remote, &store).unwrap();
        let first = db.images().find(&Filter::new()).unwrap();

        sync(&db, &remote, &store).unwrap();
        let second = db.images().find(&Filter::new()).unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(first[0].etag, second[0].etag);
    }

    #[test]
    fn test_sync_derives_stable_etag_for_empty() {
        let db = Database::new();
        let store = storage();
        let remote = MemoryObjectStore::new();
        remote.put_object(&store.bucket, object("a", ""));

        sync(&db, &remote, &store).unwrap();
        let first_etag = db.images().find(&Filter::new()).unwrap()[0].etag.clone();
        assert!(!first_etag.is_empty());
        assert!(first_etag.chars().all(|c| c.is_ascii_alphanumeric()));

        sync(&db, &remote, &store).unwrap();
        let second_etag = db.images().find(&Filter::new()).unwrap()[0].etag.clone();
        assert_eq!(first_etag, second_etag);
    }

    #[test]
    fn test_sync_strips_non_alphanumeric_etag() {
        let db = Database::new();
        let store = storage();
        let remote = MemoryObjectStore::new();
        remote.put_object(&store.bucket, object("a", "\"abc-123\""));

        sync(&db, &remote, &store).unwrap();
        assert_eq!(db.images().find(&Filter::new()).unwrap()[0].etag, "abc123");
    }

    #[test]
    fn test_connection_error_leaves_catalog_untouched() {
        let db = Database::new();
        let store = storage();
        let remote = MemoryObjectStore::new();
        remote.put_object(&store.bucket, object("a", "e1"));
        sync(&db, &remote, &store).unwrap();

        remote.remove_object(&store.bucket, "a");
        remote.refuse_connections(true);
        assert!(matches!(
            sync(&db, &remote, &store),
            Err(Error::Connection(_))
        ));

        // The vanished key is not deleted on a failed pass.
        assert_eq!(local_keys(&db, &store), vec!["a"]);
    }

    #[test]
    fn test_listing_error_skips_deletion_keeps_upserts() {
        let db = Database::new();
        let store = storage();
        let remote = MemoryObjectStore::new();
        remote.put_object(&store.bucket, object("stale", "e1"));
        sync(&db, &remote, &store).unwrap();

        remote.remove_object(&store.bucket, "stale");
        remote.put_object(&store.bucket, object("a", "e1"));
        remote.put_object(&store.bucket, object("b", "e1"));
        remote.fail_after(Some(1));

        assert!(matches!(
            sync(&db, &remote, &store),
            Err(Error::Request(_))
        ));

        // First object upserted before the failure; stale key survives.
        assert_eq!(local_keys(&db, &store), vec!["a", "stale"]);
    }

    #[test]
    fn test_derived_etag_matches_md5_of_rfc3339() {
        let stamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let etag = derived_etag(&stamp);
        assert_eq!(etag.len(), 32);
        assert_eq!(etag, derived_etag(&stamp));
    }
}
