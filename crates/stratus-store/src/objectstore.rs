//! Object-store contract. The S3 wire client is an external
//! collaborator; the core needs per-storage connection and a lazy,
//! recursive, prefix-less listing with `key`, `etag` and `last_modified`
//! per object.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use stratus_core::errortypes::Error;
use stratus_core::storage::Storage;

/// Metadata for one listed object.
#[derive(Debug, Clone)]
pub struct RemoteObject {
    pub key: String,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}

pub trait ObjectClient: Send + Sync {
    /// Recursive listing of the bucket, no prefix. An error mid-stream
    /// surfaces as an `Err` item and ends the listing.
    fn list_objects(
        &self,
        bucket: &str,
    ) -> Box<dyn Iterator<Item = Result<RemoteObject, Error>> + Send>;
}

pub trait ObjectStoreProvider: Send + Sync {
    fn connect(
        &self,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        secure: bool,
    ) -> Result<Box<dyn ObjectClient>, Error>;
}

/// Connect for a storage record; TLS unless the record is marked
/// insecure. Failure classifies as a connection error.
pub fn connect(
    provider: &dyn ObjectStoreProvider,
    store: &Storage,
) -> Result<Box<dyn ObjectClient>, Error> {
    provider
        .connect(
            &store.endpoint,
            &store.access_key,
            &store.secret_key,
            !store.insecure,
        )
        .map_err(|_| Error::Connection("storage: Failed to connect to storage".to_string()))
}

#[derive(Default)]
struct MemoryInner {
    objects: HashMap<String, Vec<RemoteObject>>,
    refuse_connections: bool,
    fail_after: Option<usize>,
}

/// In-process object store used by tests and local development.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_object(&self, bucket: &str, object: RemoteObject) {
        self.inner
            .lock()
            .unwrap()
            .objects
            .entry(bucket.to_string())
            .or_default()
            .push(object);
    }

    pub fn remove_object(&self, bucket: &str, key: &str) {
        if let Some(objects) = self.inner.lock().unwrap().objects.get_mut(bucket) {
            objects.retain(|obj| obj.key != key);
        }
    }

    /// Make subsequent connects fail with a connection error.
    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.lock().unwrap().refuse_connections = refuse;
    }

    /// Inject a listing error after yielding `n` objects.
    pub fn fail_after(&self, n: Option<usize>) {
        self.inner.lock().unwrap().fail_after = n;
    }
}

impl ObjectStoreProvider for MemoryObjectStore {
    fn connect(
        &self,
        _endpoint: &str,
        _access_key: &str,
        _secret_key: &str,
        _secure: bool,
    ) -> Result<Box<dyn ObjectClient>, Error> {
        let inner = self.inner.lock().unwrap();
        if inner.refuse_connections {
            return Err(Error::Connection(
                "storage: Failed to connect to storage".to_string(),
            ));
        }
        Ok(Box::new(MemoryClient {
            objects: inner.objects.clone(),
            fail_after: inner.fail_after,
        }))
    }
}

struct MemoryClient {
    objects: HashMap<String, Vec<RemoteObject>>,
    fail_after: Option<usize>,
}

impl ObjectClient for MemoryClient {
    fn list_objects(
        &self,
        bucket: &str,
    ) -> Box<dyn Iterator<Item = Result<RemoteObject, Error>> + Send> {
        let objects = self.objects.get(bucket).cloned().unwrap_or_default();
        let fail_after = self.fail_after;

        Box::new(objects.into_iter().enumerate().map(move |(i, obj)| {
            if Some(i) == fail_after {
                Err(Error::Request(
                    "storage: Failed to list objects".to_string(),
                ))
            } else {
                Ok(obj)
            }
        }))
    }
}
