//! In-memory engine for tests
//!
//! [`FakeEngine`] hands out constructors, maps, views, collections and surfaces
//! that implement the capability traits and record every call they receive in a
//! shared [`Journal`]. Async work runs on a [`ManualSpawner`], so a test decides
//! exactly when resolution, construction and ready signals complete.

use async_trait::async_trait;
use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::lifecycle::manager::{AttachTarget, EntitySpec};
use crate::lifecycle::resolver::{ImportFuture, ImportThunk, ModuleHandle};
use crate::lifecycle::view::ViewSpec;
use crate::runtime::{AsyncSpawner, ManualSpawner};
use crate::traits::{
    same_object, Collection, ConstructArgs, Destroyable, EngineConstructor, EngineEvent,
    EngineMap, EngineObject, EngineView, EventEmitting, EventHandler, Instance, ListenerHandle,
    MapHandle, Observable, PropertyTarget, Surface, UiOverlay, UiPosition, ViewHandle,
    WatchCallback,
};

/// One observable interaction with the engine
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Resolve { module: String },
    Construct { module: String, id: u64 },
    Attach { id: u64, target: String },
    Detach { id: u64, target: String },
    Destroy { id: u64 },
    Set { id: u64, field: String, value: Value },
    On { id: u64, event: String },
    Off { id: u64, event: String },
    Watch { id: u64, property: String },
    Unwatch { id: u64, property: String },
    /// Recorded by tests from their `on_create` callbacks
    Created { id: u64 },
}

impl Call {
    /// Object the call was made on, if any
    pub fn id(&self) -> Option<u64> {
        match self {
            Call::Resolve { .. } => None,
            Call::Construct { id, .. }
            | Call::Attach { id, .. }
            | Call::Detach { id, .. }
            | Call::Destroy { id }
            | Call::Set { id, .. }
            | Call::On { id, .. }
            | Call::Off { id, .. }
            | Call::Watch { id, .. }
            | Call::Unwatch { id, .. }
            | Call::Created { id } => Some(*id),
        }
    }
}

/// Shared, ordered call log
#[derive(Debug, Clone, Default)]
pub struct Journal {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: Call) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(c)).count()
    }

    /// Index of the first matching call
    pub fn position(&self, predicate: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls().iter().position(|c| predicate(c))
    }

    /// Calls made on one object, in order
    pub fn for_object(&self, id: u64) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.id() == Some(id))
            .collect()
    }

    pub fn resolves(&self) -> usize {
        self.count(|c| matches!(c, Call::Resolve { .. }))
    }

    pub fn constructs(&self) -> usize {
        self.count(|c| matches!(c, Call::Construct { .. }))
    }

    pub fn attaches(&self) -> usize {
        self.count(|c| matches!(c, Call::Attach { .. }))
    }

    pub fn detaches(&self) -> usize {
        self.count(|c| matches!(c, Call::Detach { .. }))
    }

    pub fn destroys(&self) -> usize {
        self.count(|c| matches!(c, Call::Destroy { .. }))
    }

    pub fn created(&self) -> usize {
        self.count(|c| matches!(c, Call::Created { .. }))
    }

    /// `(field, value)` of every successful assignment
    pub fn sets(&self) -> Vec<(String, Value)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Set { field, value, .. } => Some((field, value)),
                _ => None,
            })
            .collect()
    }
}

/// Id the fake engine assigned to an object, 0 for foreign objects
pub fn object_id<T: PropertyTarget + ?Sized>(object: &T) -> u64 {
    object
        .property("id")
        .and_then(|v| v.as_u64())
        .unwrap_or(0)
}

/// One-shot latch a fake waits on
#[derive(Clone)]
pub struct Gate {
    tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    rx: Shared<oneshot::Receiver<()>>,
}

impl Gate {
    pub fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
            rx: rx.shared(),
        }
    }

    pub fn open(&self) {
        if let Some(tx) = self.tx.lock().ok().and_then(|mut tx| tx.take()) {
            let _ = tx.send(());
        }
    }

    pub fn is_open(&self) -> bool {
        self.tx.lock().map(|tx| tx.is_none()).unwrap_or(true)
    }

    async fn wait(&self) {
        let _ = self.rx.clone().await;
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

struct Registration<C: ?Sized> {
    key: u64,
    name: String,
    callback: Arc<C>,
}

/// State shared by every fake engine object
pub struct FakeCore {
    id: u64,
    class: String,
    journal: Journal,
    destroyed: AtomicBool,
    fields: Mutex<BTreeMap<String, Value>>,
    listeners: Arc<Mutex<Vec<Registration<dyn Fn(&EngineEvent) + Send + Sync>>>>,
    watchers: Arc<Mutex<Vec<Registration<dyn Fn(&Value) + Send + Sync>>>>,
    next_key: AtomicU64,
}

impl FakeCore {
    fn new(id: u64, class: &str, journal: Journal, config: BTreeMap<String, Value>) -> Self {
        Self {
            id,
            class: class.to_string(),
            journal,
            destroyed: AtomicBool::new(false),
            fields: Mutex::new(config),
            listeners: Arc::new(Mutex::new(Vec::new())),
            watchers: Arc::new(Mutex::new(Vec::new())),
            next_key: AtomicU64::new(1),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Calls every listener registered for `name`
    pub fn emit(&self, name: &str, payload: Value) -> usize {
        let event = EngineEvent::new(name, payload);
        let handlers: Vec<EventHandler> = self
            .listeners
            .lock()
            .map(|l| {
                l.iter()
                    .filter(|r| r.name == name)
                    .map(|r| r.callback.clone())
                    .collect()
            })
            .unwrap_or_default();
        for handler in &handlers {
            handler(&event);
        }
        handlers.len()
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners
            .lock()
            .map(|l| l.iter().filter(|r| r.name == name).count())
            .unwrap_or(0)
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().map(|w| w.len()).unwrap_or(0)
    }
}

impl Destroyable for FakeCore {
    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.journal.record(Call::Destroy { id: self.id });
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl PropertyTarget for FakeCore {
    fn set_property(&self, name: &str, value: Value) -> anyhow::Result<()> {
        if self.is_destroyed() {
            anyhow::bail!("{} #{} is destroyed", self.class, self.id);
        }
        if name == "readonly" || name == "id" {
            anyhow::bail!("'{}' cannot be assigned", name);
        }
        self.journal.record(Call::Set {
            id: self.id,
            field: name.to_string(),
            value: value.clone(),
        });
        if let Ok(mut fields) = self.fields.lock() {
            fields.insert(name.to_string(), value.clone());
        }
        let watchers: Vec<WatchCallback> = self
            .watchers
            .lock()
            .map(|w| {
                w.iter()
                    .filter(|r| r.name == name)
                    .map(|r| r.callback.clone())
                    .collect()
            })
            .unwrap_or_default();
        for watcher in watchers {
            watcher(&value);
        }
        Ok(())
    }

    fn property(&self, name: &str) -> Option<Value> {
        if name == "id" {
            return Some(json!(self.id));
        }
        self.fields.lock().ok().and_then(|f| f.get(name).cloned())
    }
}

impl EventEmitting for FakeCore {
    fn on(&self, event: &str, handler: EventHandler) -> Box<dyn ListenerHandle> {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        self.journal.record(Call::On {
            id: self.id,
            event: event.to_string(),
        });
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(Registration {
                key,
                name: event.to_string(),
                callback: handler,
            });
        }
        let listeners = self.listeners.clone();
        let journal = self.journal.clone();
        let id = self.id;
        let event = event.to_string();
        Box::new(move || {
            journal.record(Call::Off { id, event });
            if let Ok(mut listeners) = listeners.lock() {
                listeners.retain(|r| r.key != key);
            }
        })
    }
}

impl Observable for FakeCore {
    fn watch(&self, property: &str, callback: WatchCallback) -> Box<dyn ListenerHandle> {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        self.journal.record(Call::Watch {
            id: self.id,
            property: property.to_string(),
        });
        if let Ok(mut watchers) = self.watchers.lock() {
            watchers.push(Registration {
                key,
                name: property.to_string(),
                callback,
            });
        }
        let watchers = self.watchers.clone();
        let journal = self.journal.clone();
        let id = self.id;
        let property = property.to_string();
        Box::new(move || {
            journal.record(Call::Unwatch { id, property });
            if let Ok(mut watchers) = watchers.lock() {
                watchers.retain(|r| r.key != key);
            }
        })
    }
}

/// Forwards the capability traits to the wrapped [`FakeCore`]
macro_rules! delegate_to_core {
    ($($fake:ty),* $(,)?) => {
        $(
            impl Destroyable for $fake {
                fn destroy(&self) {
                    self.core.destroy()
                }

                fn is_destroyed(&self) -> bool {
                    self.core.is_destroyed()
                }
            }

            impl PropertyTarget for $fake {
                fn set_property(&self, name: &str, value: Value) -> anyhow::Result<()> {
                    self.core.set_property(name, value)
                }

                fn property(&self, name: &str) -> Option<Value> {
                    self.core.property(name)
                }
            }

            impl EventEmitting for $fake {
                fn on(&self, event: &str, handler: EventHandler) -> Box<dyn ListenerHandle> {
                    self.core.on(event, handler)
                }
            }

            impl Observable for $fake {
                fn watch(&self, property: &str, callback: WatchCallback) -> Box<dyn ListenerHandle> {
                    self.core.watch(property, callback)
                }
            }

            impl $fake {
                pub fn core(&self) -> &Arc<FakeCore> {
                    &self.core
                }
            }
        )*
    };
}

/// Plain layer or widget
pub struct FakeObject {
    core: Arc<FakeCore>,
}

/// Map with a recording layer list
pub struct FakeMap {
    core: Arc<FakeCore>,
    layers: Arc<FakeCollection>,
}

/// View with a recording UI overlay and a ready signal opened by the test
pub struct FakeView {
    core: Arc<FakeCore>,
    map: Option<MapHandle>,
    ui: Arc<FakeUi>,
    ready_tx: Mutex<Option<oneshot::Sender<Result<(), String>>>>,
    ready_rx: Shared<oneshot::Receiver<Result<(), String>>>,
}

delegate_to_core!(FakeObject, FakeMap, FakeView);

impl EngineObject for FakeObject {
    fn declared_class(&self) -> &str {
        &self.core.class
    }
}

impl FakeMap {
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer_list(&self) -> Arc<FakeCollection> {
        self.layers.clone()
    }
}

impl EngineObject for FakeMap {
    fn declared_class(&self) -> &str {
        &self.core.class
    }

    fn as_map(self: Arc<Self>) -> Option<MapHandle> {
        Some(self)
    }
}

impl EngineMap for FakeMap {
    fn layers(&self) -> Arc<dyn Collection> {
        self.layers.clone()
    }
}

impl FakeView {
    pub fn open_ready(&self) {
        self.settle(Ok(()));
    }

    pub fn fail_ready(&self, reason: &str) {
        self.settle(Err(reason.to_string()));
    }

    fn settle(&self, outcome: Result<(), String>) {
        if let Some(tx) = self.ready_tx.lock().ok().and_then(|mut tx| tx.take()) {
            let _ = tx.send(outcome);
        }
    }

    /// Positions currently occupied on the UI overlay
    pub fn ui_items(&self) -> Vec<UiPosition> {
        self.ui.positions()
    }
}

impl EngineObject for FakeView {
    fn declared_class(&self) -> &str {
        &self.core.class
    }

    fn as_view(self: Arc<Self>) -> Option<ViewHandle> {
        Some(self)
    }
}

#[async_trait]
impl EngineView for FakeView {
    fn ui(&self) -> Arc<dyn UiOverlay> {
        self.ui.clone()
    }

    fn map(&self) -> Option<MapHandle> {
        self.map.clone()
    }

    async fn when(&self) -> anyhow::Result<()> {
        match self.ready_rx.clone().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(anyhow::anyhow!(reason)),
            Err(_) => Err(anyhow::anyhow!("view dropped before it became ready")),
        }
    }
}

/// Recording parent collection
pub struct FakeCollection {
    name: String,
    journal: Journal,
    items: Mutex<Vec<Instance>>,
    reject: AtomicBool,
}

impl FakeCollection {
    fn new(name: &str, journal: Journal) -> Self {
        Self {
            name: name.to_string(),
            journal,
            items: Mutex::new(Vec::new()),
            reject: AtomicBool::new(false),
        }
    }

    /// Makes every following `add` fail
    pub fn reject_adds(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|i| i.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Collection for FakeCollection {
    fn add(&self, item: Instance) -> anyhow::Result<()> {
        if self.reject.load(Ordering::SeqCst) {
            anyhow::bail!("{} rejects new items", self.name);
        }
        self.journal.record(Call::Attach {
            id: object_id(item.as_ref()),
            target: self.name.clone(),
        });
        if let Ok(mut items) = self.items.lock() {
            items.push(item);
        }
        Ok(())
    }

    fn remove(&self, item: &Instance) -> anyhow::Result<()> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| anyhow::anyhow!("{} is poisoned", self.name))?;
        let Some(index) = items.iter().position(|i| same_object(i, item)) else {
            anyhow::bail!("item is not in {}", self.name);
        };
        items.remove(index);
        self.journal.record(Call::Detach {
            id: object_id(item.as_ref()),
            target: self.name.clone(),
        });
        Ok(())
    }

    fn contains(&self, item: &Instance) -> bool {
        self.items
            .lock()
            .map(|items| items.iter().any(|i| same_object(i, item)))
            .unwrap_or(false)
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Recording UI overlay of a [`FakeView`]
pub struct FakeUi {
    journal: Journal,
    items: Mutex<Vec<(Instance, UiPosition)>>,
}

impl FakeUi {
    fn positions(&self) -> Vec<UiPosition> {
        self.items
            .lock()
            .map(|items| items.iter().map(|(_, p)| *p).collect())
            .unwrap_or_default()
    }
}

impl UiOverlay for FakeUi {
    fn add(&self, item: Instance, position: UiPosition) -> anyhow::Result<()> {
        self.journal.record(Call::Attach {
            id: object_id(item.as_ref()),
            target: format!("ui:{}", position),
        });
        if let Ok(mut items) = self.items.lock() {
            items.push((item, position));
        }
        Ok(())
    }

    fn remove(&self, item: &Instance) -> anyhow::Result<()> {
        let position = {
            let mut items = self
                .items
                .lock()
                .map_err(|_| anyhow::anyhow!("ui is poisoned"))?;
            let Some(index) = items.iter().position(|(i, _)| same_object(i, item)) else {
                anyhow::bail!("item is not on the ui");
            };
            items.remove(index).1
        };
        self.journal.record(Call::Detach {
            id: object_id(item.as_ref()),
            target: format!("ui:{}", position),
        });
        Ok(())
    }
}

/// Recording host surface
pub struct FakeSurface {
    journal: Journal,
    views: Mutex<Vec<ViewHandle>>,
}

impl FakeSurface {
    /// Views currently drawn on the surface
    pub fn attached(&self) -> usize {
        self.views.lock().map(|v| v.len()).unwrap_or(0)
    }
}

impl Surface for FakeSurface {
    fn attach(&self, view: &ViewHandle) -> anyhow::Result<()> {
        self.journal.record(Call::Attach {
            id: object_id(view.as_ref()),
            target: "surface".to_string(),
        });
        if let Ok(mut views) = self.views.lock() {
            views.push(view.clone());
        }
        Ok(())
    }

    fn detach(&self, view: &ViewHandle) -> anyhow::Result<()> {
        if let Ok(mut views) = self.views.lock() {
            views.retain(|v| !same_object(v, view));
        }
        self.journal.record(Call::Detach {
            id: object_id(view.as_ref()),
            target: "surface".to_string(),
        });
        Ok(())
    }

    fn describe(&self) -> String {
        "surface".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Object,
    Map,
    View,
}

impl Kind {
    fn for_module(module: &str) -> Kind {
        let class = class_name(module);
        if class.ends_with("View") {
            Kind::View
        } else if class.ends_with("Map") {
            Kind::Map
        } else {
            Kind::Object
        }
    }
}

fn class_name(module: &str) -> &str {
    module.rsplit('/').next().unwrap_or(module)
}

/// How a fake constructor misbehaves
#[derive(Clone, Default)]
struct Behaviour {
    construct_gate: Option<Gate>,
    fail_with: Option<String>,
}

/// Constructor producing fakes for one module
pub struct FakeConstructor {
    module: String,
    engine: FakeEngine,
    behaviour: Behaviour,
}

#[async_trait]
impl EngineConstructor for FakeConstructor {
    fn name(&self) -> &str {
        class_name(&self.module)
    }

    async fn construct(&self, args: ConstructArgs) -> anyhow::Result<Instance> {
        if let Some(gate) = &self.behaviour.construct_gate {
            gate.wait().await;
        }
        if let Some(reason) = &self.behaviour.fail_with {
            anyhow::bail!("{} constructor threw: {}", self.name(), reason);
        }
        Ok(self.engine.build(&self.module, args))
    }
}

struct EngineInner {
    journal: Journal,
    spawner: Arc<ManualSpawner>,
    next_id: AtomicU64,
    objects: Mutex<Vec<Arc<FakeCore>>>,
    views: Mutex<Vec<Arc<FakeView>>>,
    auto_ready: AtomicBool,
}

/// Factory for every fake, sharing one journal and one manual spawner
#[derive(Clone)]
pub struct FakeEngine {
    inner: Arc<EngineInner>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EngineInner {
                journal: Journal::new(),
                spawner: ManualSpawner::shared(),
                next_id: AtomicU64::new(1),
                objects: Mutex::new(Vec::new()),
                views: Mutex::new(Vec::new()),
                auto_ready: AtomicBool::new(false),
            }),
        }
    }

    pub fn journal(&self) -> Journal {
        self.inner.journal.clone()
    }

    pub fn spawner(&self) -> Arc<dyn AsyncSpawner> {
        self.inner.spawner.clone()
    }

    /// Runs queued async work until nothing can progress
    pub fn run(&self) -> usize {
        self.inner.spawner.run_until_stalled()
    }

    pub fn pending_tasks(&self) -> usize {
        self.inner.spawner.pending_tasks()
    }

    /// Views constructed from now on are ready immediately
    pub fn set_auto_ready(&self, enabled: bool) {
        self.inner.auto_ready.store(enabled, Ordering::SeqCst);
    }

    /// Spec whose module resolves on the first run
    pub fn spec(&self, module: &str, target: AttachTarget) -> EntitySpec {
        EntitySpec::new(module, self.thunk(module, None, Behaviour::default()), target)
    }

    pub fn view_spec(&self, module: &str, surface: Arc<FakeSurface>) -> ViewSpec {
        ViewSpec::from_entity(self.spec(module, AttachTarget::Detached), surface)
    }

    /// Spec whose module resolves only after the gate opens
    pub fn gated_spec(&self, module: &str, target: AttachTarget) -> (EntitySpec, Gate) {
        let gate = Gate::new();
        let thunk = self.thunk(module, Some(gate.clone()), Behaviour::default());
        (EntitySpec::new(module, thunk, target), gate)
    }

    /// Spec whose constructor finishes only after the gate opens
    pub fn slow_spec(&self, module: &str, target: AttachTarget) -> (EntitySpec, Gate) {
        let gate = Gate::new();
        let behaviour = Behaviour {
            construct_gate: Some(gate.clone()),
            ..Default::default()
        };
        (EntitySpec::new(module, self.thunk(module, None, behaviour), target), gate)
    }

    /// Spec gated twice: once on import, once inside the constructor
    pub fn staged_spec(&self, module: &str, target: AttachTarget) -> (EntitySpec, Gate, Gate) {
        let import_gate = Gate::new();
        let construct_gate = Gate::new();
        let behaviour = Behaviour {
            construct_gate: Some(construct_gate.clone()),
            ..Default::default()
        };
        let thunk = self.thunk(module, Some(import_gate.clone()), behaviour);
        (EntitySpec::new(module, thunk, target), import_gate, construct_gate)
    }

    /// Spec whose module import rejects
    pub fn failing_spec(&self, module: &str, target: AttachTarget, reason: &str) -> EntitySpec {
        let journal = self.journal();
        let name = module.to_string();
        let reason = reason.to_string();
        let thunk: ImportThunk = Arc::new(move || -> ImportFuture {
            journal.record(Call::Resolve { module: name.clone() });
            let reason = reason.clone();
            Box::pin(async move { Err::<ModuleHandle, _>(anyhow::anyhow!(reason)) })
        });
        EntitySpec::new(module, thunk, target)
    }

    /// Spec whose constructor throws
    pub fn throwing_spec(&self, module: &str, target: AttachTarget, reason: &str) -> EntitySpec {
        let behaviour = Behaviour {
            fail_with: Some(reason.to_string()),
            ..Default::default()
        };
        EntitySpec::new(module, self.thunk(module, None, behaviour), target)
    }

    /// Constructor to put into a [`ModuleRegistry`](crate::lifecycle::resolver::ModuleRegistry)
    pub fn constructor(&self, module: &str) -> ModuleHandle {
        Arc::new(FakeConstructor {
            module: module.to_string(),
            engine: self.clone(),
            behaviour: Behaviour::default(),
        })
    }

    fn thunk(&self, module: &str, gate: Option<Gate>, behaviour: Behaviour) -> ImportThunk {
        let engine = self.clone();
        let module = module.to_string();
        Arc::new(move || -> ImportFuture {
            engine.inner.journal.record(Call::Resolve {
                module: module.clone(),
            });
            let constructor: ModuleHandle = Arc::new(FakeConstructor {
                module: module.clone(),
                engine: engine.clone(),
                behaviour: behaviour.clone(),
            });
            let gate = gate.clone();
            Box::pin(async move {
                if let Some(gate) = gate {
                    gate.wait().await;
                }
                Ok::<_, anyhow::Error>(constructor)
            })
        })
    }

    fn core(&self, class: &str, config: BTreeMap<String, Value>) -> Arc<FakeCore> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let core = Arc::new(FakeCore::new(id, class, self.journal(), config));
        if let Ok(mut objects) = self.inner.objects.lock() {
            objects.push(core.clone());
        }
        core
    }

    fn build(&self, module: &str, args: ConstructArgs) -> Instance {
        let config: BTreeMap<String, Value> = args
            .config
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        let core = self.core(class_name(module), config);
        self.inner.journal.record(Call::Construct {
            module: module.to_string(),
            id: core.id,
        });
        match Kind::for_module(module) {
            Kind::Object => Arc::new(FakeObject { core }),
            Kind::Map => Arc::new(self.map_from(core)),
            Kind::View => {
                let view = Arc::new(self.view_from(core, args.map));
                if self.inner.auto_ready.load(Ordering::SeqCst) {
                    view.open_ready();
                }
                if let Ok(mut views) = self.inner.views.lock() {
                    views.push(view.clone());
                }
                view
            }
        }
    }

    fn map_from(&self, core: Arc<FakeCore>) -> FakeMap {
        let layers = Arc::new(FakeCollection::new(
            &format!("{} #{} layers", core.class, core.id),
            self.journal(),
        ));
        FakeMap { core, layers }
    }

    fn view_from(&self, core: Arc<FakeCore>, map: Option<MapHandle>) -> FakeView {
        let (ready_tx, ready_rx) = oneshot::channel();
        FakeView {
            core,
            map,
            ui: Arc::new(FakeUi {
                journal: self.journal(),
                items: Mutex::new(Vec::new()),
            }),
            ready_tx: Mutex::new(Some(ready_tx)),
            ready_rx: ready_rx.shared(),
        }
    }

    /// A map that exists outside any node
    pub fn map(&self) -> Arc<FakeMap> {
        Arc::new(self.map_from(self.core("Map", BTreeMap::new())))
    }

    /// A view that exists outside any node, not ready yet
    pub fn view(&self) -> Arc<FakeView> {
        Arc::new(self.view_from(self.core("MapView", BTreeMap::new()), None))
    }

    pub fn collection(&self, name: &str) -> Arc<FakeCollection> {
        Arc::new(FakeCollection::new(name, self.journal()))
    }

    pub fn surface(&self) -> Arc<FakeSurface> {
        Arc::new(FakeSurface {
            journal: self.journal(),
            views: Mutex::new(Vec::new()),
        })
    }

    /// Most recently constructed view
    pub fn last_view(&self) -> Option<Arc<FakeView>> {
        self.inner.views.lock().ok().and_then(|v| v.last().cloned())
    }

    /// Fake object by id, including standalone maps and views
    pub fn object(&self, id: u64) -> Option<Arc<FakeCore>> {
        self.inner
            .objects
            .lock()
            .ok()
            .and_then(|o| o.iter().find(|c| c.id == id).cloned())
    }

    /// Objects built by constructors that have not been destroyed
    pub fn live_instances(&self) -> usize {
        let constructed: Vec<u64> = self
            .journal()
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Construct { id, .. } => Some(id),
                _ => None,
            })
            .collect();
        constructed
            .into_iter()
            .filter_map(|id| self.object(id))
            .filter(|core| !core.is_destroyed())
            .count()
    }
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}
