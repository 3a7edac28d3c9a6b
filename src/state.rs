//! Process-lifetime singleton storage keyed by concrete type.
//!
//! This backs the DI container's `Singleton` scope (see [`crate::di`]) and
//! general process-wide state such as cache/task-engine stats handles.
//! Values are stored by `TypeId`, not by name — storing a second value of the
//! same type replaces the first.

use std::{
    any::{Any, TypeId},
    sync::Arc,
};

use dashmap::DashMap;
use once_cell::sync::Lazy;

pub(crate) static GLOBAL_STATE: Lazy<DashMap<TypeId, Arc<dyn Any + Send + Sync>>> =
    Lazy::new(DashMap::new);

/// Stores a value in the global state, keyed by its concrete type.
pub fn set_state<T: Send + Sync + 'static>(value: T) {
    GLOBAL_STATE.insert(TypeId::of::<T>(), Arc::new(value));
}

/// Retrieves a value from the global state by its concrete type.
pub fn get_state<T: Send + Sync + 'static>() -> Option<Arc<T>> {
    GLOBAL_STATE
        .get(&TypeId::of::<T>())
        .map(|v| v.clone())
        .and_then(|v| v.downcast::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Marker(u32);

    #[test]
    fn roundtrips_by_type() {
        set_state(Marker(7));
        let got = get_state::<Marker>().unwrap();
        assert_eq!(*got, Marker(7));
    }
}
