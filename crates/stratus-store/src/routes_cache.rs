use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use stratus_core::vpc::Route;

/// Observed routes for one instance namespace, split by family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedRoutes {
    pub routes: Vec<Route>,
    pub routes6: Vec<Route>,
}

/// Process-local catalog of observed per-instance routes, avoiding
/// repeated namespace introspection. No TTL: the reconciler invalidates
/// an entry after it changes routes.
#[derive(Clone, Default)]
pub struct RouteCache {
    inner: Arc<Mutex<HashMap<Uuid, CachedRoutes>>>,
}

impl RouteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, instance_id: Uuid) -> Option<CachedRoutes> {
        self.inner.lock().unwrap().get(&instance_id).cloned()
    }

    pub fn set(&self, instance_id: Uuid, routes: Vec<Route>, routes6: Vec<Route>) {
        self.inner
            .lock()
            .unwrap()
            .insert(instance_id, CachedRoutes { routes, routes6 });
    }

    pub fn remove(&self, instance_id: Uuid) {
        self.inner.lock().unwrap().remove(&instance_id);
    }
}
