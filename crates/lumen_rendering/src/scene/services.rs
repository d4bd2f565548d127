//! Scoped service resolution.
//!
//! A [`ServiceProvider`] hands out scopes; a scope resolves services by type
//! until it is dropped. Every attached node and every attached functional
//! component holds one scope, released when it detaches.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use lumen_core::{CoreError, CoreResult};

/// A type-erased service instance.
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// Creates resolution scopes.
pub trait ServiceProvider: Send + Sync {
    /// Opens a scope that stays valid until dropped.
    fn create_scope(&self) -> Arc<dyn ServiceScope>;
}

/// Resolves services while alive.
pub trait ServiceScope: Send + Sync {
    /// Looks up the service registered for `type_id`.
    fn resolve_any(&self, type_id: TypeId) -> Option<ServiceInstance>;
}

impl dyn ServiceScope + '_ {
    /// Resolves a service by its concrete type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ServiceNotFound`] if nothing is registered for `T`.
    pub fn resolve<T: Any + Send + Sync>(&self) -> CoreResult<Arc<T>> {
        self.resolve_any(TypeId::of::<T>())
            .and_then(|instance| instance.downcast::<T>().ok())
            .ok_or(CoreError::ServiceNotFound(type_name::<T>()))
    }
}

#[derive(Default)]
struct ServiceTable {
    services: RwLock<HashMap<TypeId, ServiceInstance>>,
    live_scopes: AtomicUsize,
}

/// A provider backed by a type map.
///
/// Clones share the same table.
#[derive(Clone, Default)]
pub struct ServiceMap {
    table: Arc<ServiceTable>,
}

impl ServiceMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service`, replacing any previous instance of the same type.
    pub fn insert<T: Any + Send + Sync>(&self, service: T) {
        self.insert_arc(Arc::new(service));
    }

    /// Registers an already shared instance.
    pub fn insert_arc<T: Any + Send + Sync>(&self, service: Arc<T>) {
        self.table
            .services
            .write()
            .insert(TypeId::of::<T>(), service);
    }

    /// Registers `service` unless an instance of the same type is registered
    /// and `keep` holds for it, in which case that instance is returned.
    ///
    /// # Errors
    ///
    /// Returns the kept instance when nothing was registered.
    pub fn insert_unless<T: Any + Send + Sync>(
        &self,
        service: T,
        keep: impl FnOnce(&T) -> bool,
    ) -> Result<(), Arc<T>> {
        let mut services = self.table.services.write();
        let existing = services
            .get(&TypeId::of::<T>())
            .and_then(|instance| Arc::clone(instance).downcast::<T>().ok());
        if let Some(existing) = existing {
            if keep(&existing) {
                return Err(existing);
            }
        }
        services.insert(TypeId::of::<T>(), Arc::new(service));
        Ok(())
    }

    /// Returns true if a service of type `T` is registered.
    pub fn contains<T: Any>(&self) -> bool {
        self.table.services.read().contains_key(&TypeId::of::<T>())
    }

    /// Number of scopes currently open.
    pub fn live_scopes(&self) -> usize {
        self.table.live_scopes.load(Ordering::Acquire)
    }
}

impl ServiceProvider for ServiceMap {
    fn create_scope(&self) -> Arc<dyn ServiceScope> {
        self.table.live_scopes.fetch_add(1, Ordering::AcqRel);
        Arc::new(MapScope {
            table: Arc::clone(&self.table),
        })
    }
}

impl fmt::Debug for ServiceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceMap")
            .field("services", &self.table.services.read().len())
            .field("live_scopes", &self.live_scopes())
            .finish()
    }
}

struct MapScope {
    table: Arc<ServiceTable>,
}

impl ServiceScope for MapScope {
    fn resolve_any(&self, type_id: TypeId) -> Option<ServiceInstance> {
        self.table.services.read().get(&type_id).cloned()
    }
}

impl Drop for MapScope {
    fn drop(&mut self) {
        self.table.live_scopes.fetch_sub(1, Ordering::AcqRel);
    }
}
