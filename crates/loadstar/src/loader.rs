//! The asynchronous resolution engine.
//!
//! A [`Loader`] owns one module registry, one resolution context and the
//! override chain. Loads are single-flight: every caller resolving an id
//! while its load is running awaits the same shared future and observes the
//! same result.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use log::{debug, info, trace};
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::context::ResolutionContext;
use crate::error::{LoaderError, Result};
use crate::exports::Exports;
use crate::graph::{Module, Registry};
use crate::layer::{Chain, Layer};
use crate::platform::Platform;

type SharedLoad = Shared<BoxFuture<'static, Result<Exports>>>;

tokio::task_local! {
    /// Ids of the loads enclosing the code being polled, outermost first
    static ENCLOSING: Arc<[String]>;
}

fn enclosing_loads() -> Arc<[String]> {
    ENCLOSING
        .try_with(Arc::clone)
        .unwrap_or_else(|_| Arc::from(Vec::new()))
}

/// Interned token for a module id.
///
/// Equal ids always produce equal symbols; a symbol dereferences to its id,
/// so it can be passed anywhere an id is expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol(Arc<str>);

impl Symbol {
    /// The id this symbol stands for
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl Deref for Symbol {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Default)]
struct State {
    registry: Registry,
    context: ResolutionContext,
    in_flight: FxHashMap<String, SharedLoad>,
    /// Exports stored by a running load whose init has not finished yet
    provisional: FxHashSet<String>,
    symbols: FxHashMap<String, Symbol>,
}

impl State {
    /// Exports of `id` as seen by a caller. Provisional exports are only
    /// visible from inside the load that stored them.
    fn visible_exports(&self, id: &str, reentrant: bool) -> Option<Exports> {
        if !reentrant && self.provisional.contains(id) {
            return None;
        }
        self.registry.get(id).and_then(|module| module.exports.clone())
    }
}

struct Inner {
    state: Mutex<State>,
    chain: RwLock<Arc<Chain>>,
    preload_gate: tokio::sync::Mutex<()>,
}

/// What `resolve` or `load` has to wait for
enum Resolution {
    Ready(Exports),
    Pending(SharedLoad),
}

/// Handle to a module loader.
///
/// Cloning is cheap and every clone drives the same registry.
#[derive(Clone)]
pub struct Loader {
    inner: Arc<Inner>,
}

impl Loader {
    /// Create a loader fetching modules through `platform`
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                chain: RwLock::new(Arc::new(Chain::new(platform))),
                preload_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Install an override layer on top of the existing ones
    pub fn use_layer<L: Layer + 'static>(&self, layer: L) -> &Self {
        let mut chain = self.inner.chain.write();
        *chain = Arc::new(chain.with_layer(Arc::new(layer)));
        debug!("Installed layer #{}", chain.len());
        self
    }

    fn chain(&self) -> Arc<Chain> {
        Arc::clone(&self.inner.chain.read())
    }

    /// Declare an optional dependency of the current module on `id`
    pub fn symbol(&self, id: &str) -> Symbol {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        state.registry.ensure(id);
        if let Some(current) = state.context.current() {
            state.registry.add_dependency(current, id, false);
        }
        state
            .symbols
            .entry(id.to_owned())
            .or_insert_with(|| Symbol(Arc::from(id)))
            .clone()
    }

    /// Declare a required dependency of the current module on `id` and
    /// resolve it
    pub async fn require(&self, id: &str) -> Result<Exports> {
        {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            state.registry.ensure(id).is_required = true;
            if let Some(current) = state.context.current() {
                state.registry.add_dependency(current, id, true);
            }
        }
        self.resolve(id).await
    }

    /// Exports of `id`, loading the module if needed.
    ///
    /// Joins a running load instead of starting another one. A module whose
    /// last load failed is loaded again.
    pub async fn resolve(&self, id: &str) -> Result<Exports> {
        self.wait(self.begin(id, false)).await
    }

    /// Fetch and initialize `id`, even when it is already resolved.
    ///
    /// A load already running for `id` is joined. Exports that are already
    /// set are kept: the fetched value is discarded and its init hook does
    /// not run.
    pub async fn load(&self, id: &str) -> Result<Exports> {
        self.wait(self.begin(id, true)).await
    }

    async fn wait(&self, resolution: Resolution) -> Result<Exports> {
        match resolution {
            Resolution::Ready(exports) => Ok(exports),
            Resolution::Pending(load) => load.await,
        }
    }

    fn begin(&self, id: &str, retry: bool) -> Resolution {
        let enclosing = enclosing_loads();
        let reentrant = enclosing.iter().any(|load| load == id);
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        state.registry.ensure(id);

        // A load resolving its own id, directly or through a cycle, sees the
        // exports it stored before running its init hook
        if !retry || reentrant {
            if let Some(exports) = state.visible_exports(id, reentrant) {
                return Resolution::Ready(exports);
            }
        }
        if let Some(load) = state.in_flight.get(id) {
            trace!("Joining in-flight load of {}", id);
            return Resolution::Pending(load.clone());
        }

        let module = state.registry.ensure(id);
        module.is_pending = true;
        module.failure = None;
        let mut chain = enclosing.to_vec();
        chain.push(id.to_owned());
        let load = self
            .clone()
            .run_load(id.to_owned(), Arc::from(chain))
            .boxed()
            .shared();
        state.in_flight.insert(id.to_owned(), load.clone());
        Resolution::Pending(load)
    }

    async fn run_load(self, id: String, chain: Arc<[String]>) -> Result<Exports> {
        debug!("Loading module: {}", id);
        self.inner.state.lock().context.enter(&id);

        let mut stored = false;
        let outcome = ENCLOSING
            .scope(chain, self.fetch_and_init(&id, &mut stored))
            .await;
        let exit = self.inner.state.lock().context.exit(&id);
        let outcome = outcome.and_then(|exports| exit.map(|()| exports));

        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        state.in_flight.remove(&id);
        state.provisional.remove(&id);
        match outcome {
            Ok(exports) => {
                drop(guard);
                info!("Loaded module: {}", id);
                Ok(exports)
            }
            Err(error) => {
                let module = state.registry.ensure(&id);
                if stored {
                    module.exports = None;
                }
                module.is_pending = false;
                module.failure = Some(error.clone());
                drop(guard);
                self.report(&error);
                Err(error)
            }
        }
    }

    async fn fetch_and_init(&self, id: &str, stored: &mut bool) -> Result<Exports> {
        let path = self.path(id);
        let fetched = self.fetch(id, &path).await;

        if let Some(module) = self.inner.state.lock().registry.get_mut(id) {
            module.is_pending = false;
        }

        let fetched = fetched
            .map_err(|cause| LoaderError::fetch(id, &path, cause))?
            .ok_or_else(|| LoaderError::MissingExports { id: id.to_owned() })?;

        let exports = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let module = state.registry.ensure(id);
            *stored = module.exports.is_none();
            let exports = module.exports.get_or_insert(fetched).clone();
            if *stored {
                state.provisional.insert(id.to_owned());
            }
            exports
        };

        if *stored && exports.has_init() {
            self.initialize(id, &exports).await?;
        }
        Ok(exports)
    }

    async fn initialize(&self, id: &str, exports: &Exports) -> Result<()> {
        let mut dependencies = Vec::with_capacity(exports.dependencies().len());
        for dependency in exports.dependencies() {
            let value = self
                .require(dependency)
                .await
                .map_err(|error| LoaderError::init(id, anyhow::Error::new(error)))?;
            dependencies.push(value);
        }

        if let Some(hook) = exports.init_hook() {
            trace!("Running init hook of {}", id);
            hook(self.clone(), dependencies)
                .await
                .map_err(|cause| LoaderError::init(id, cause))?;
        }
        Ok(())
    }

    /// Resolve `id`, then every module reachable from it, until the whole
    /// closure has exports.
    ///
    /// Preloads are serialized: a second preload waits for the first one to
    /// finish its walk. An init hook must therefore never call `preload`.
    pub async fn preload(&self, id: &str) -> Result<Exports> {
        let _gate = self.inner.preload_gate.lock().await;
        debug!("Preloading module: {}", id);

        let exports = self.resolve(id).await?;
        loop {
            let unresolved: Vec<String> = self
                .inner
                .state
                .lock()
                .registry
                .deep_dependencies(id)
                .into_iter()
                .filter(|module| !module.is_resolved())
                .map(|module| module.id.clone())
                .collect();
            if unresolved.is_empty() {
                break;
            }
            for dependency in unresolved {
                self.resolve(&dependency).await?;
            }
        }
        Ok(exports)
    }

    /// Exports of `id` if it is resolved. Never loads and never registers.
    ///
    /// Exports whose init is still running are hidden, except from inside
    /// that load.
    pub fn get(&self, id: &str) -> Option<Exports> {
        let reentrant = enclosing_loads().iter().any(|load| load == id);
        self.inner.state.lock().visible_exports(id, reentrant)
    }

    /// Seed the exports of `id`. The first value wins; the effective exports
    /// are returned.
    pub fn define(&self, id: &str, exports: Exports) -> Exports {
        let mut state = self.inner.state.lock();
        let module = state.registry.ensure(id);
        module.failure = None;
        module.exports.get_or_insert(exports).clone()
    }

    /// Location of `id` according to the full override chain
    pub fn path(&self, id: &str) -> String {
        let chain = self.chain();
        chain.top(self).path(id)
    }

    /// Fetch `id` from `path` through the full override chain
    pub async fn fetch(&self, id: &str, path: &str) -> anyhow::Result<Option<Exports>> {
        let chain = self.chain();
        chain.top(self).fetch(id, path).await
    }

    /// Report a failure through the full override chain
    pub fn report(&self, error: &LoaderError) {
        let chain = self.chain();
        chain.top(self).report(error);
    }

    /// Forget every module, running load and symbol. Layers and the platform
    /// stay installed.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.registry.clear();
        state.context.clear();
        state.in_flight.clear();
        state.provisional.clear();
        state.symbols.clear();
        debug!("Loader reset");
    }

    /// Snapshot of the module registered for `id`
    pub fn module(&self, id: &str) -> Option<Module> {
        self.inner.state.lock().registry.get(id).cloned()
    }

    /// Snapshot of every registered module, in registration order
    pub fn modules(&self) -> Vec<Module> {
        self.inner.state.lock().registry.modules().cloned().collect()
    }

    /// Number of registered modules
    pub fn len(&self) -> usize {
        self.inner.state.lock().registry.len()
    }

    /// Whether no module was registered yet
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().registry.is_empty()
    }

    /// Ids transitively reachable from `id`, depth-first
    pub fn deep_dependencies(&self, id: &str) -> Vec<String> {
        self.inner
            .state
            .lock()
            .registry
            .deep_dependencies(id)
            .into_iter()
            .map(|module| module.id.clone())
            .collect()
    }

    /// Whether `id` and its whole dependency closure have exports
    pub fn is_preloaded(&self, id: &str) -> bool {
        self.inner.state.lock().registry.is_preloaded(id)
    }

    /// Module whose execution is currently running
    pub fn current_module(&self) -> Option<String> {
        self.inner.state.lock().context.current().map(str::to_owned)
    }

    /// Groups of modules that depend on each other in a cycle
    pub fn circular_groups(&self) -> Vec<Vec<String>> {
        self.inner.state.lock().registry.circular_groups()
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Loader")
            .field("modules", &state.registry.len())
            .field("in_flight", &state.in_flight.len())
            .field("layers", &self.inner.chain.read().len())
            .finish()
    }
}
