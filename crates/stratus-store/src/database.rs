//! Document-collection contract: CRUD by id, equality/`$in` filters,
//! partial-field commits and distinct projections, backed by a
//! process-local engine. The wire driver for a shared deployment is an
//! external collaborator with this same surface.

use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use stratus_core::errortypes::Error;

/// A persistable entity. One collection per kind; `key` is the opaque
/// object identifier in storage form.
pub trait Doc: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;
    fn key(&self) -> String;
}

/// Storage form of an object id.
pub fn oid(id: Uuid) -> String {
    id.simple().to_string()
}

type Docs = BTreeMap<String, Value>;

/// Cloneable handle to the document database.
#[derive(Clone, Default)]
pub struct Database {
    inner: Arc<RwLock<HashMap<&'static str, Docs>>>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a handle for the configured deployment URI. The remote
    /// driver is out of scope; the handle fronts the process-local
    /// engine either way.
    pub fn open(_uri: &str) -> Self {
        Self::new()
    }

    pub fn collection<T: Doc>(&self) -> Collection<T> {
        Collection {
            db: self.clone(),
            _marker: PhantomData,
        }
    }

    pub fn instances(&self) -> Collection<stratus_core::instance::Instance> {
        self.collection()
    }

    pub fn disks(&self) -> Collection<stratus_core::disk::Disk> {
        self.collection()
    }

    pub fn vpcs(&self) -> Collection<stratus_core::vpc::Vpc> {
        self.collection()
    }

    pub fn images(&self) -> Collection<stratus_core::image::Image> {
        self.collection()
    }

    pub fn storages(&self) -> Collection<stratus_core::storage::Storage> {
        self.collection()
    }

    pub fn datacenters(&self) -> Collection<stratus_core::datacenter::Datacenter> {
        self.collection()
    }

    pub fn firewalls(&self) -> Collection<stratus_core::firewall::Firewall> {
        self.collection()
    }

    pub fn policies(&self) -> Collection<stratus_core::policy::Policy> {
        self.collection()
    }

    pub fn devices(&self) -> Collection<stratus_core::device::Device> {
        self.collection()
    }

    pub fn sessions(&self) -> Collection<stratus_core::session::Session> {
        self.collection()
    }

    pub fn users(&self) -> Collection<stratus_core::user::User> {
        self.collection()
    }

    pub fn nodes(&self) -> Collection<stratus_core::node::Node> {
        self.collection()
    }
}

/// Equality and `$in` conditions over document fields. An equality
/// condition also matches array fields containing the value.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    conds: Vec<Cond>,
}

#[derive(Debug, Clone)]
enum Cond {
    Eq(String, Value),
    In(String, Vec<Value>),
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq<V: Serialize>(mut self, field: &str, value: V) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.conds.push(Cond::Eq(field.to_string(), value));
        self
    }

    pub fn is_in<V: Serialize>(mut self, field: &str, values: &[V]) -> Self {
        let values = values
            .iter()
            .map(|v| serde_json::to_value(v).unwrap_or(Value::Null))
            .collect();
        self.conds.push(Cond::In(field.to_string(), values));
        self
    }

    fn matches(&self, doc: &Value) -> bool {
        self.conds.iter().all(|cond| match cond {
            Cond::Eq(field, value) => field_matches(doc, field, value),
            Cond::In(field, values) => values.iter().any(|v| field_matches(doc, field, v)),
        })
    }
}

fn field_matches(doc: &Value, field: &str, value: &Value) -> bool {
    match doc.get(field) {
        Some(Value::Array(items)) => items.contains(value),
        Some(found) => found == value,
        None => false,
    }
}

/// Typed view over one collection.
pub struct Collection<T> {
    db: Database,
    _marker: PhantomData<T>,
}

impl<T: Doc> Collection<T> {
    fn encode(doc: &T) -> Result<Value, Error> {
        serde_json::to_value(doc).map_err(|e| Error::Database(format!("database: Encode: {}", e)))
    }

    fn decode(value: &Value) -> Result<T, Error> {
        serde_json::from_value(value.clone())
            .map_err(|e| Error::Database(format!("database: Decode: {}", e)))
    }

    pub fn insert(&self, doc: &T) -> Result<(), Error> {
        let value = Self::encode(doc)?;
        let mut inner = self.db.inner.write().unwrap();
        let docs = inner.entry(T::COLLECTION).or_default();
        if docs.contains_key(&doc.key()) {
            return Err(Error::Database(format!(
                "database: Duplicate key in {}",
                T::COLLECTION
            )));
        }
        docs.insert(doc.key(), value);
        Ok(())
    }

    pub fn find_one_key(&self, key: &str) -> Result<T, Error> {
        let inner = self.db.inner.read().unwrap();
        let value = inner
            .get(T::COLLECTION)
            .and_then(|docs| docs.get(key))
            .ok_or_else(|| Error::NotFound(format!("database: Missing in {}", T::COLLECTION)))?;
        Self::decode(value)
    }

    /// Full-document upsert by key.
    pub fn commit(&self, doc: &T) -> Result<(), Error> {
        let value = Self::encode(doc)?;
        let mut inner = self.db.inner.write().unwrap();
        inner.entry(T::COLLECTION).or_default().insert(doc.key(), value);
        Ok(())
    }

    /// Partial-field commit: only the listed fields of `doc` reach
    /// storage. This is what keeps handler-owned and reconciler-owned
    /// field sets disjoint on the shared record.
    pub fn commit_fields(&self, doc: &T, fields: &[&str]) -> Result<(), Error> {
        let value = Self::encode(doc)?;
        let mut inner = self.db.inner.write().unwrap();
        let stored = inner
            .entry(T::COLLECTION)
            .or_default()
            .get_mut(&doc.key())
            .ok_or_else(|| Error::NotFound(format!("database: Missing in {}", T::COLLECTION)))?;

        for field in fields {
            if let Some(field_value) = value.get(*field) {
                stored[*field] = field_value.clone();
            }
        }
        Ok(())
    }

    pub fn find(&self, filter: &Filter) -> Result<Vec<T>, Error> {
        let inner = self.db.inner.read().unwrap();
        let mut found = Vec::new();
        if let Some(docs) = inner.get(T::COLLECTION) {
            for value in docs.values() {
                if filter.matches(value) {
                    found.push(Self::decode(value)?);
                }
            }
        }
        Ok(found)
    }

    pub fn find_one(&self, filter: &Filter) -> Result<Option<T>, Error> {
        Ok(self.find(filter)?.into_iter().next())
    }

    pub fn remove_key(&self, key: &str) -> Result<(), Error> {
        let mut inner = self.db.inner.write().unwrap();
        let removed = inner
            .get_mut(T::COLLECTION)
            .and_then(|docs| docs.remove(key));
        if removed.is_none() {
            return Err(Error::NotFound(format!(
                "database: Missing in {}",
                T::COLLECTION
            )));
        }
        Ok(())
    }

    pub fn remove_many(&self, filter: &Filter) -> Result<usize, Error> {
        let mut inner = self.db.inner.write().unwrap();
        let Some(docs) = inner.get_mut(T::COLLECTION) else {
            return Ok(0);
        };
        let keys: Vec<String> = docs
            .iter()
            .filter(|(_, value)| filter.matches(value))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            docs.remove(key);
        }
        Ok(keys.len())
    }

    /// Merge the fields of `update` into every matching document.
    pub fn update_many(&self, filter: &Filter, update: &Value) -> Result<usize, Error> {
        let Value::Object(update_fields) = update else {
            return Err(Error::Database(
                "database: Update document must be an object".to_string(),
            ));
        };

        let mut inner = self.db.inner.write().unwrap();
        let Some(docs) = inner.get_mut(T::COLLECTION) else {
            return Ok(0);
        };

        let mut updated = 0;
        for value in docs.values_mut() {
            if filter.matches(value) {
                for (field, field_value) in update_fields {
                    value[field.as_str()] = field_value.clone();
                }
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Distinct string values of one field across matching documents.
    pub fn distinct(&self, field: &str, filter: &Filter) -> Result<Vec<String>, Error> {
        let inner = self.db.inner.read().unwrap();
        let mut values = Vec::new();
        if let Some(docs) = inner.get(T::COLLECTION) {
            for value in docs.values() {
                if filter.matches(value)
                    && let Some(Value::String(s)) = value.get(field)
                    && !values.contains(s)
                {
                    values.push(s.clone());
                }
            }
        }
        Ok(values)
    }
}

// ── Doc bindings for the entity records ─────────────────────────────────

impl Doc for stratus_core::instance::Instance {
    const COLLECTION: &'static str = "instances";
    fn key(&self) -> String {
        oid(self.id)
    }
}

impl Doc for stratus_core::disk::Disk {
    const COLLECTION: &'static str = "disks";
    fn key(&self) -> String {
        oid(self.id)
    }
}

impl Doc for stratus_core::vpc::Vpc {
    const COLLECTION: &'static str = "vpcs";
    fn key(&self) -> String {
        oid(self.id)
    }
}

impl Doc for stratus_core::image::Image {
    const COLLECTION: &'static str = "images";
    fn key(&self) -> String {
        oid(self.id)
    }
}

impl Doc for stratus_core::storage::Storage {
    const COLLECTION: &'static str = "storages";
    fn key(&self) -> String {
        oid(self.id)
    }
}

impl Doc for stratus_core::datacenter::Datacenter {
    const COLLECTION: &'static str = "datacenters";
    fn key(&self) -> String {
        oid(self.id)
    }
}

impl Doc for stratus_core::firewall::Firewall {
    const COLLECTION: &'static str = "firewalls";
    fn key(&self) -> String {
        oid(self.id)
    }
}

impl Doc for stratus_core::policy::Policy {
    const COLLECTION: &'static str = "policies";
    fn key(&self) -> String {
        oid(self.id)
    }
}

impl Doc for stratus_core::device::Device {
    const COLLECTION: &'static str = "devices";
    fn key(&self) -> String {
        oid(self.id)
    }
}

impl Doc for stratus_core::session::Session {
    const COLLECTION: &'static str = "sessions";
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Doc for stratus_core::user::User {
    const COLLECTION: &'static str = "users";
    fn key(&self) -> String {
        oid(self.id)
    }
}

impl Doc for stratus_core::node::Node {
    const COLLECTION: &'static str = "nodes";
    fn key(&self) -> String {
        oid(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_core::user::User;

    fn test_user(username: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            disabled: false,
        }
    }

    #[test]
    fn test_insert_find_remove() {
        let db = Database::new();
        let usr = test_user("alice");

        db.users().insert(&usr).unwrap();
        let found = db.users().find_one_key(&usr.key()).unwrap();
        assert_eq!(found.username, "alice");

        db.users().remove_key(&usr.key()).unwrap();
        assert!(matches!(
            db.users().find_one_key(&usr.key()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_insert_duplicate_rejected() {
        let db = Database::new();
        let usr = test_user("alice");
        db.users().insert(&usr).unwrap();
        assert!(matches!(
            db.users().insert(&usr),
            Err(Error::Database(_))
        ));
    }

    #[test]
    fn test_commit_fields_touches_only_listed_fields() {
        let db = Database::new();
        let mut usr = test_user("alice");
        db.users().insert(&usr).unwrap();

        usr.username = "renamed".to_string();
        usr.disabled = true;
        db.users().commit_fields(&usr, &["disabled"]).unwrap();

        let stored = db.users().find_one_key(&usr.key()).unwrap();
        assert_eq!(stored.username, "alice");
        assert!(stored.disabled);
    }

    #[test]
    fn test_commit_fields_missing_doc() {
        let db = Database::new();
        let usr = test_user("alice");
        assert!(matches!(
            db.users().commit_fields(&usr, &["disabled"]),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_filter_eq_and_in() {
        let db = Database::new();
        for name in ["a", "b", "c"] {
            db.users().insert(&test_user(name)).unwrap();
        }

        let found = db
            .users()
            .find(&Filter::new().eq("username", "b"))
            .unwrap();
        assert_eq!(found.len(), 1);

        let found = db
            .users()
            .find(&Filter::new().is_in("username", &["a", "c", "z"]))
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_filter_eq_matches_array_membership() {
        use stratus_core::instance::{DesiredState, Instance};

        let db = Database::new();
        let inst = Instance {
            id: Uuid::new_v4(),
            organization: Uuid::new_v4(),
            zone: Uuid::new_v4(),
            node: Uuid::new_v4(),
            vpc: Uuid::new_v4(),
            image: Uuid::new_v4(),
            name: "web-1".to_string(),
            state: DesiredState::Start,
            memory: 1024,
            processors: 1,
            network_roles: vec!["web".to_string(), "ssh".to_string()],
            domain: None,
            init_disk_size: 10,
            restart: false,
        };
        db.instances().insert(&inst).unwrap();

        let found = db
            .instances()
            .find(&Filter::new().eq("network_roles", "ssh"))
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_update_many() {
        let db = Database::new();
        for name in ["a", "b"] {
            db.users().insert(&test_user(name)).unwrap();
        }

        let updated = db
            .users()
            .update_many(&Filter::new(), &serde_json::json!({"disabled": true}))
            .unwrap();
        assert_eq!(updated, 2);

        for usr in db.users().find(&Filter::new()).unwrap() {
            assert!(usr.disabled);
        }
    }

    #[test]
    fn test_distinct() {
        let db = Database::new();
        db.users().insert(&test_user("a")).unwrap();
        db.users().insert(&test_user("a")).unwrap();
        db.users().insert(&test_user("b")).unwrap();

        let mut names = db.users().distinct("username", &Filter::new()).unwrap();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
