//! Dependency injection container: a scoped service graph with per-request
//! lifetimes (§4.6).
//!
//! A [`Container`] holds service definitions keyed by name. Resolution walks
//! the `deps` DAG and honors each service's [`Scope`]: `Singleton` instances
//! are built once per container (guarded by a single lock so concurrent
//! first-resolves don't double-construct), `Request` instances are cached in
//! the active [`RequestScope`] and dropped with it, and `Transient`
//! instances are freshly built on every resolve. Child containers inherit
//! their parent's definitions and singleton cache; a child registration of
//! the same key shadows the parent only for resolves that go through the
//! child.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::CoreError;
use crate::platform::Mutex;

/// A service's lifetime class (§3 "DI Service").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Singleton,
    Request,
    Transient,
}

pub type Instance = Arc<dyn Any + Send + Sync>;
pub type Factory =
    Arc<dyn Fn(&Container, Option<&RequestScope>) -> Result<Instance, CoreError> + Send + Sync>;

#[derive(Clone)]
struct ServiceDef {
    factory: Factory,
    scope: Scope,
    deps: Vec<String>,
}

/// Per-request cache for `Request`-scoped service instances. Dropped at the
/// end of the request, taking its instances with it.
#[derive(Default)]
pub struct RequestScope {
    instances: Mutex<HashMap<String, Instance>>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_create(
        &self,
        key: &str,
        build: impl FnOnce() -> Result<Instance, CoreError>,
    ) -> Result<Instance, CoreError> {
        if let Some(v) = self.instances.lock().get(key) {
            return Ok(v.clone());
        }
        let v = build()?;
        self.instances.lock().insert(key.to_string(), v.clone());
        Ok(v)
    }
}

/// A tree of service containers; children inherit parent bindings.
pub struct Container {
    parent: Option<Arc<Container>>,
    defs: Mutex<HashMap<String, ServiceDef>>,
    singletons: Mutex<HashMap<String, Instance>>,
    singleton_lock: Mutex<()>,
}

impl Container {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            parent: None,
            defs: Mutex::new(HashMap::new()),
            singletons: Mutex::new(HashMap::new()),
            singleton_lock: Mutex::new(()),
        })
    }

    /// Creates a child container inheriting this container's bindings.
    pub fn child_container(self: &Arc<Self>) -> Arc<Container> {
        Arc::new(Container {
            parent: Some(self.clone()),
            defs: Mutex::new(HashMap::new()),
            singletons: Mutex::new(HashMap::new()),
            singleton_lock: Mutex::new(()),
        })
    }

    fn find_def(&self, key: &str) -> Option<ServiceDef> {
        if let Some(def) = self.defs.lock().get(key) {
            return Some(def.clone());
        }
        self.parent.as_ref().and_then(|p| p.find_def(key))
    }

    /// Registers a service. Fails with `Cycle` if `deps` already reach back
    /// to `key` through previously registered definitions — a cheap,
    /// partial check; the authoritative check happens at first resolution,
    /// since forward references (a dep registered after its dependent) are
    /// legal and can't be validated here.
    pub fn register(
        &self,
        key: impl Into<String>,
        factory: Factory,
        scope: Scope,
        deps: Vec<String>,
    ) -> Result<(), CoreError> {
        let key = key.into();
        let mut path = Vec::new();
        for dep in &deps {
            if self.dep_reaches(dep, &key, &mut path) {
                return Err(CoreError::Cycle(format!("{key} -> {dep} -> ... -> {key}")));
            }
        }
        self.defs.lock().insert(
            key,
            ServiceDef {
                factory,
                scope,
                deps,
            },
        );
        Ok(())
    }

    fn dep_reaches(&self, from: &str, target: &str, visiting: &mut Vec<String>) -> bool {
        if from == target {
            return true;
        }
        if visiting.iter().any(|v| v == from) {
            return false;
        }
        visiting.push(from.to_string());
        let reaches = self
            .find_def(from)
            .map(|def| def.deps.iter().any(|d| self.dep_reaches(d, target, visiting)))
            .unwrap_or(false);
        visiting.pop();
        reaches
    }

    /// Resolves a service by key, recursively resolving its declared
    /// dependencies first. `request` must be supplied when resolving (or
    /// transitively depending on) a `Request`-scoped service.
    pub fn resolve(
        &self,
        key: &str,
        request: Option<&RequestScope>,
    ) -> Result<Instance, CoreError> {
        let mut visiting = Vec::new();
        self.resolve_inner(key, request, &mut visiting)
    }

    /// Typed convenience wrapper over [`Container::resolve`].
    pub fn resolve_typed<T: Send + Sync + 'static>(
        &self,
        key: &str,
        request: Option<&RequestScope>,
    ) -> Result<Arc<T>, CoreError> {
        let instance = self.resolve(key, request)?;
        instance
            .downcast::<T>()
            .map_err(|_| CoreError::Internal(format!("service {key} resolved to wrong type")))
    }

    /// Resolves `key`, preferring a local definition over an inherited one.
    /// A `Singleton` def found only in an ancestor is resolved *on that
    /// ancestor* (delegating the whole call upward) so its instance is
    /// cached once, in the container that owns the definition, and shared
    /// by every descendant that reads through to it — not re-built and
    /// re-cached separately per child.
    fn resolve_inner(
        &self,
        key: &str,
        request: Option<&RequestScope>,
        visiting: &mut Vec<String>,
    ) -> Result<Instance, CoreError> {
        if visiting.iter().any(|v| v == key) {
            visiting.push(key.to_string());
            return Err(CoreError::Cycle(visiting.join(" -> ")));
        }

        let local_def = self.defs.lock().get(key).cloned();
        let Some(def) = local_def else {
            return match &self.parent {
                Some(parent) => parent.resolve_inner(key, request, visiting),
                None => Err(CoreError::Internal(format!(
                    "no service registered for key {key}"
                ))),
            };
        };

        visiting.push(key.to_string());
        for dep in &def.deps {
            self.resolve_inner(dep, request, visiting)?;
        }
        visiting.pop();

        match def.scope {
            Scope::Singleton => self.resolve_singleton(key, &def, request),
            Scope::Request => {
                let scope = request.ok_or_else(|| {
                    CoreError::Internal(format!(
                        "service {key} is request-scoped but no request scope was provided"
                    ))
                })?;
                scope.get_or_create(key, || (def.factory)(self, request))
            }
            Scope::Transient => (def.factory)(self, request),
        }
    }

    fn resolve_singleton(
        &self,
        key: &str,
        def: &ServiceDef,
        request: Option<&RequestScope>,
    ) -> Result<Instance, CoreError> {
        if let Some(v) = self.singletons.lock().get(key) {
            return Ok(v.clone());
        }
        let _guard = self.singleton_lock.lock();
        if let Some(v) = self.singletons.lock().get(key) {
            return Ok(v.clone());
        }
        let instance = (def.factory)(self, request)?;
        self.singletons
            .lock()
            .insert(key.to_string(), instance.clone());
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_factory(counter: Arc<std::sync::atomic::AtomicUsize>) -> Factory {
        Arc::new(move |_container, _request| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Arc::new(42i32) as Instance)
        })
    }

    #[test]
    fn singleton_always_same_instance() {
        let container = Container::new();
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        container
            .register("svc", counting_factory(counter.clone()), Scope::Singleton, vec![])
            .unwrap();

        let a = container.resolve("svc", None).unwrap();
        let b = container.resolve("svc", None).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn transient_always_new_instance() {
        let container = Container::new();
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        container
            .register("svc", counting_factory(counter.clone()), Scope::Transient, vec![])
            .unwrap();

        container.resolve("svc", None).unwrap();
        container.resolve("svc", None).unwrap();
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn request_scope_shares_within_request_but_not_across() {
        let container = Container::new();
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        container
            .register("svc", counting_factory(counter.clone()), Scope::Request, vec![])
            .unwrap();

        let scope_a = RequestScope::new();
        let a1 = container.resolve("svc", Some(&scope_a)).unwrap();
        let a2 = container.resolve("svc", Some(&scope_a)).unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));

        let scope_b = RequestScope::new();
        container.resolve("svc", Some(&scope_b)).unwrap();
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn request_scoped_service_without_scope_errors() {
        let container = Container::new();
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        container
            .register("svc", counting_factory(counter), Scope::Request, vec![])
            .unwrap();
        assert!(container.resolve("svc", None).is_err());
    }

    #[test]
    fn registering_a_reachable_cycle_fails() {
        let container = Container::new();
        let factory: Factory = Arc::new(|_c, _r| Ok(Arc::new(1i32) as Instance));
        container
            .register("a", factory.clone(), Scope::Singleton, vec!["b".into()])
            .unwrap();
        let result = container.register("b", factory, Scope::Singleton, vec!["a".into()]);
        assert!(result.is_err());
    }

    #[test]
    fn child_container_inherits_singleton_binding() {
        let parent = Container::new();
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        parent
            .register("svc", counting_factory(counter), Scope::Singleton, vec![])
            .unwrap();
        let child = parent.child_container();
        let a = parent.resolve("svc", None).unwrap();
        let b = child.resolve("svc", None).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn child_registration_shadows_parent_only_for_child() {
        let parent = Container::new();
        parent
            .register(
                "svc",
                Arc::new(|_c, _r| Ok(Arc::new(1i32) as Instance)),
                Scope::Transient,
                vec![],
            )
            .unwrap();
        let child = parent.child_container();
        child
            .register(
                "svc",
                Arc::new(|_c, _r| Ok(Arc::new(2i32) as Instance)),
                Scope::Transient,
                vec![],
            )
            .unwrap();

        let from_parent = parent.resolve_typed::<i32>("svc", None).unwrap();
        let from_child = child.resolve_typed::<i32>("svc", None).unwrap();
        assert_eq!(*from_parent, 1);
        assert_eq!(*from_child, 2);
    }
}
