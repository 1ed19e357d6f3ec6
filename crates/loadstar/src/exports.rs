//! The value a module exposes once it has been executed.
//!
//! [`Exports`] wraps an arbitrary value together with an optional
//! initialization hook. A hook may declare the ids it depends on; the loader
//! requires those modules first and hands their exports to the hook in the
//! declared order.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::any::{Any, type_name};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::loader::Loader;

/// Initialization hook invoked by the loader after a module's exports are stored
pub type InitHook =
    Arc<dyn Fn(Loader, Vec<Exports>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct ExportsInner {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    dependencies: Vec<String>,
    init: Option<InitHook>,
}

/// Shared handle to a module's exported value
#[derive(Clone)]
pub struct Exports {
    inner: Arc<ExportsInner>,
}

impl Exports {
    /// Wrap a value with no init hook and no declared dependencies
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(ExportsInner {
                value: Arc::new(value),
                type_name: type_name::<T>(),
                dependencies: Vec::new(),
                init: None,
            }),
        }
    }

    /// Declare the ids this module requires before its init hook runs.
    ///
    /// Declaring dependencies makes the exports init-capable even without an
    /// explicit hook.
    #[must_use]
    pub fn with_dependencies<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut inner = self.into_inner();
        inner.dependencies = ids.into_iter().map(Into::into).collect();
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Attach an asynchronous init hook.
    ///
    /// The hook receives the loader and the exports of the declared
    /// dependencies, in declaration order.
    #[must_use]
    pub fn with_init<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(Loader, Vec<Exports>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut inner = self.into_inner();
        inner.init = Some(Arc::new(move |loader: Loader, deps: Vec<Self>| {
            hook(loader, deps).boxed()
        }));
        Self {
            inner: Arc::new(inner),
        }
    }

    fn into_inner(self) -> ExportsInner {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => inner,
            Err(shared) => ExportsInner {
                value: Arc::clone(&shared.value),
                type_name: shared.type_name,
                dependencies: shared.dependencies.clone(),
                init: shared.init.clone(),
            },
        }
    }

    /// Borrow the exported value as `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.value.downcast_ref::<T>()
    }

    /// Whether the exported value is a `T`
    pub fn is<T: Any>(&self) -> bool {
        self.inner.value.is::<T>()
    }

    /// Type name of the wrapped value, for diagnostics
    pub fn type_name(&self) -> &'static str {
        self.inner.type_name
    }

    /// Ids required before the init hook runs
    pub fn dependencies(&self) -> &[String] {
        &self.inner.dependencies
    }

    /// Whether the loader has initialization work to do for these exports
    pub fn has_init(&self) -> bool {
        self.inner.init.is_some() || !self.inner.dependencies.is_empty()
    }

    pub(crate) fn init_hook(&self) -> Option<&InitHook> {
        self.inner.init.as_ref()
    }

    /// Identity comparison: true when both handles point at the same export
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner.value, &b.inner.value)
    }
}

impl fmt::Debug for Exports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exports")
            .field("type", &self.inner.type_name)
            .field("dependencies", &self.inner.dependencies)
            .field("init", &self.inner.init.is_some())
            .finish()
    }
}
