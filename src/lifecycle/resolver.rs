//! External module resolution
//!
//! Engine classes are loaded lazily through an import thunk. The outcome lands in
//! a [`ModuleCell`] owned by the requesting node: empty until resolution
//! succeeds, then fixed for the node's lifetime. Failures are logged and parked
//! in the cell's error slot; they never reach the caller.

use futures::future::BoxFuture;
use fxhash::FxHashMap;
use instant::Instant;
use std::sync::{Arc, Mutex, RwLock};

use crate::{core::guard::MountGuard, traits::EngineConstructor, BindError};

/// A resolved engine constructor
pub type ModuleHandle = Arc<dyn EngineConstructor>;

/// Pending resolution of an engine constructor
pub type ImportFuture = BoxFuture<'static, anyhow::Result<ModuleHandle>>;

/// Starts a resolution each time it is called
pub type ImportThunk = Arc<dyn Fn() -> ImportFuture + Send + Sync>;

enum CellState {
    Pending,
    Ready(ModuleHandle),
    Failed(Arc<BindError>),
}

/// Per-node slot holding the resolved constructor
#[derive(Clone)]
pub struct ModuleCell {
    name: Arc<str>,
    state: Arc<Mutex<CellState>>,
}

impl ModuleCell {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(CellState::Pending)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The constructor, once resolved
    pub fn get(&self) -> Option<ModuleHandle> {
        match &*self.state.lock().ok()? {
            CellState::Ready(module) => Some(module.clone()),
            _ => None,
        }
    }

    /// The resolution failure, if any
    pub fn error(&self) -> Option<Arc<BindError>> {
        match &*self.state.lock().ok()? {
            CellState::Failed(error) => Some(error.clone()),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state
            .lock()
            .map(|state| matches!(*state, CellState::Pending))
            .unwrap_or(false)
    }

    fn set(&self, next: CellState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }
}

impl std::fmt::Debug for ModuleCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state.lock().as_deref() {
            Ok(CellState::Pending) => "pending",
            Ok(CellState::Ready(_)) => "ready",
            Ok(CellState::Failed(_)) => "failed",
            Err(_) => "poisoned",
        };
        f.debug_struct("ModuleCell")
            .field("name", &self.name)
            .field("state", &state)
            .finish()
    }
}

/// Runs `thunk` once and stores the outcome in `cell`.
///
/// A result arriving after `guard` was released is dropped without touching the
/// cell. An already resolved cell short-circuits without calling the thunk.
pub async fn resolve(thunk: ImportThunk, cell: ModuleCell, guard: MountGuard) -> Option<ModuleHandle> {
    if let Some(module) = cell.get() {
        return Some(module);
    }
    if cell.error().is_some() {
        return None;
    }

    let started = Instant::now();
    let outcome = thunk().await;

    if !guard.is_mounted() {
        log::debug!("module '{}' resolved after unmount, discarded", cell.name());
        return None;
    }

    match outcome {
        Ok(module) => {
            log::debug!(
                "module '{}' resolved to '{}' in {:?}",
                cell.name(),
                module.name(),
                started.elapsed()
            );
            cell.set(CellState::Ready(module.clone()));
            Some(module)
        }
        Err(error) => {
            let error = match error.downcast::<BindError>() {
                Ok(bind_error) => bind_error,
                Err(other) => BindError::Resolution {
                    module: cell.name().to_string(),
                    reason: format!("{:#}", other),
                },
            };
            log::error!("{}", error);
            cell.set(CellState::Failed(Arc::new(error)));
            None
        }
    }
}

/// Logical module name to import thunk
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: Arc<RwLock<FxHashMap<String, ImportThunk>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, name: impl Into<String>, thunk: F)
    where
        F: Fn() -> ImportFuture + Send + Sync + 'static,
    {
        if let Ok(mut modules) = self.modules.write() {
            modules.insert(name.into(), Arc::new(thunk));
        }
    }

    /// Registers a constructor that is available immediately
    pub fn register_constructor(&self, name: impl Into<String>, constructor: ModuleHandle) {
        self.register(name, move || {
            let constructor = constructor.clone();
            Box::pin(async move { Ok::<_, anyhow::Error>(constructor) })
        });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules
            .read()
            .map(|m| m.contains_key(name))
            .unwrap_or(false)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .modules
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Thunk that looks `name` up when called, so late registration still resolves
    pub fn thunk(&self, name: &str) -> ImportThunk {
        let modules = self.modules.clone();
        let name = name.to_string();
        Arc::new(move || -> ImportFuture {
            let found = modules.read().ok().and_then(|m| m.get(&name).cloned());
            match found {
                Some(thunk) => thunk(),
                None => {
                    let name = name.clone();
                    Box::pin(async move {
                        Err::<ModuleHandle, _>(anyhow::Error::from(BindError::UnknownModule(name)))
                    })
                }
            }
        })
    }
}
