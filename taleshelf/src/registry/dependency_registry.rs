use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use shared::{Error, Result};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Typed name of a registry slot. The type parameter ties the name to the
/// instance type it resolves to, so a lookup can never hand back the wrong type.
pub struct Dependency<T: ?Sized + 'static> {
    name: &'static str,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + 'static> Dependency<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: ?Sized + 'static> Clone for Dependency<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized + 'static> Copy for Dependency<T> {}

impl<T: ?Sized + 'static> fmt::Debug for Dependency<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Dependency").field(&self.name).finish()
    }
}

type Instance = Box<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&DependencyRegistry) -> Result<Instance> + Send + Sync>;

/// Name -> factory table. The registry only provides indirection; a factory
/// decides whether it builds a fresh instance or hands out a memoized one
/// (see [`singleton`]).
#[derive(Default)]
pub struct DependencyRegistry {
    factories: RwLock<HashMap<&'static str, Factory>>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `factory` to `dependency`, replacing any earlier binding.
    pub fn register<T, F>(&self, dependency: Dependency<T>, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&DependencyRegistry) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        let erased: Factory = Arc::new(move |registry: &DependencyRegistry| {
            factory(registry).map(|instance| Box::new(instance) as Instance)
        });

        if self
            .factories
            .write()
            .insert(dependency.name, erased)
            .is_some()
        {
            tracing::debug!(dependency = dependency.name, "replaced dependency binding");
        }
    }

    pub fn resolve<T>(&self, dependency: Dependency<T>) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        // Clone the factory out so nested resolves inside it don't hold the lock.
        let factory = self
            .factories
            .read()
            .get(dependency.name)
            .cloned()
            .ok_or_else(|| Error::DependencyNotFound(dependency.name.to_string()))?;

        let instance = factory(self)?;
        instance
            .downcast::<Arc<T>>()
            .map(|boxed| *boxed)
            .map_err(|_| {
                Error::Internal(format!(
                    "dependency '{}' is bound to a different type",
                    dependency.name
                ))
            })
    }

    pub fn has<T: ?Sized + 'static>(&self, dependency: Dependency<T>) -> bool {
        self.factories.read().contains_key(dependency.name)
    }

    pub fn clear(&self) {
        self.factories.write().clear();
    }

    pub fn len(&self) -> usize {
        self.factories.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for DependencyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.read().keys().copied().collect();
        names.sort_unstable();
        f.debug_struct("DependencyRegistry")
            .field("dependencies", &names)
            .finish()
    }
}

/// Wrap `build` so that it runs once and every later call returns the
/// same instance. A failed build is not memoized.
pub fn singleton<T, F>(build: F) -> impl Fn(&DependencyRegistry) -> Result<Arc<T>> + Send + Sync + 'static
where
    T: ?Sized + Send + Sync + 'static,
    F: Fn(&DependencyRegistry) -> Result<Arc<T>> + Send + Sync + 'static,
{
    let cell: OnceCell<Arc<T>> = OnceCell::new();
    move |registry: &DependencyRegistry| cell.get_or_try_init(|| build(registry)).cloned()
}
