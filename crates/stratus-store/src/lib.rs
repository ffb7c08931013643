// stratus-store: narrow-contract adapters around the document database,
// the event bus, the route catalog and the object store, plus typed
// per-entity accessors.

pub mod database;
pub mod datacenters;
pub mod devices;
pub mod disks;
pub mod events;
pub mod firewalls;
pub mod images;
pub mod instances;
pub mod nodes;
pub mod objectstore;
pub mod policies;
pub mod routes_cache;
pub mod sessions;
pub mod storages;
pub mod users;
pub mod vpcs;
