//! Entity lifecycle state machine
//!
//! Every declarative node that owns an engine object runs the same sequence:
//! resolve the constructor, wait for a parent, construct with a config snapshot,
//! attach, announce through `on_create`, then keep fields and listeners in step
//! with props until unmount detaches and destroys the object.
//!
//! ```text
//! Unresolved -> Constructing -> (AttachedNotReady) -> Live -> Destroyed
//! ```
//!
//! The three node kinds ([`ChildEntity`](super::entity::ChildEntity),
//! [`RootView`](super::view::RootView) and [`MapProvider`](super::map::MapProvider))
//! only differ in their [`Role`]: what they need from the ambient context, where
//! the object is attached, and what they provide to their subtree.
//!
//! Asynchronous steps capture the node's [`MountGuard`] and a construction epoch.
//! A result arriving after unmount, or after a newer construction started, is
//! discarded, and a live object it produced is destroyed without ever being
//! attached.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::config::{EntityConfig, IdentityChangePolicy, LifecycleOptions};
use crate::core::context::{AmbientContext, ParentOverride, Provision, Scope, Subscription};
use crate::core::guard::MountGuard;
use crate::lifecycle::events::{EventBinder, EventBinding, WatchBinder, WatchBinding};
use crate::lifecycle::resolver::{self, ImportThunk, ModuleCell, ModuleHandle, ModuleRegistry};
use crate::lifecycle::sync::{PropertyBindings, PropertySynchronizer};
use crate::runtime::{self, AsyncSpawner};
use crate::traits::{
    same_object, Collection, ConstructArgs, EngineEvent, EventHandler, Instance, MapHandle,
    Surface, UiOverlay, UiPosition, ViewHandle, WatchCallback,
};
use crate::BindError;

/// Where a node is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for the constructor or a required parent
    Unresolved,
    /// Constructor running, or frozen after a construction/attach failure
    Constructing,
    /// Root views only: on the surface, waiting for the ready signal
    AttachedNotReady,
    Live,
    /// Terminal
    Destroyed,
}

impl Phase {
    pub fn is_live(self) -> bool {
        self == Phase::Live
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::Destroyed
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Unresolved => "unresolved",
            Phase::Constructing => "constructing",
            Phase::AttachedNotReady => "attached-not-ready",
            Phase::Live => "live",
            Phase::Destroyed => "destroyed",
        };
        write!(f, "{}", name)
    }
}

/// Parent a child entity attaches into
#[derive(Clone, Default)]
pub enum AttachTarget {
    /// The layer list of the nearest map (or the nearest view's map)
    #[default]
    Layers,
    /// A slot of the nearest view's UI overlay
    Ui { position: UiPosition },
    /// An explicit collection, such as a group layer's sublayers
    Collection(Arc<dyn Collection>),
    /// Constructed but never attached
    Detached,
}

impl AttachTarget {
    pub fn ui(position: UiPosition) -> Self {
        AttachTarget::Ui { position }
    }
}

impl std::fmt::Debug for AttachTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttachTarget::Layers => write!(f, "Layers"),
            AttachTarget::Ui { position } => write!(f, "Ui({})", position),
            AttachTarget::Collection(collection) => write!(f, "Collection({})", collection.describe()),
            AttachTarget::Detached => write!(f, "Detached"),
        }
    }
}

/// Static description of one kind of entity
#[derive(Clone)]
pub struct EntitySpec {
    pub module: String,
    pub import: ImportThunk,
    pub target: AttachTarget,
    /// Fields the engine only reads at construction time
    pub constructor_fields: Vec<String>,
    pub options: LifecycleOptions,
}

impl EntitySpec {
    pub fn new(module: impl Into<String>, import: ImportThunk, target: AttachTarget) -> Self {
        Self {
            module: module.into(),
            import,
            target,
            constructor_fields: Vec::new(),
            options: LifecycleOptions::default(),
        }
    }

    /// Spec whose constructor is looked up in `registry` under `module`
    pub fn from_registry(registry: &ModuleRegistry, module: &str, target: AttachTarget) -> Self {
        Self::new(module, registry.thunk(module), target)
    }

    pub fn with_constructor_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constructor_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_target(mut self, target: AttachTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_options(mut self, options: LifecycleOptions) -> Self {
        self.options = options;
        self
    }
}

impl std::fmt::Debug for EntitySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitySpec")
            .field("module", &self.module)
            .field("target", &self.target)
            .field("constructor_fields", &self.constructor_fields)
            .field("options", &self.options)
            .finish()
    }
}

/// Called once per constructed instance, after it is attached
pub type CreateCallback = Arc<dyn Fn(&Instance) + Send + Sync>;

/// Everything a render hands to an entity node
#[derive(Clone, Default)]
pub struct EntityProps {
    pub bindings: PropertyBindings,
    pub events: Vec<EventBinding>,
    pub watches: Vec<WatchBinding>,
    pub on_create: Option<CreateCallback>,
    pub parent: ParentOverride,
}

impl EntityProps {
    pub fn new(bindings: PropertyBindings) -> Self {
        Self {
            bindings,
            ..Default::default()
        }
    }

    pub fn with_bindings(mut self, bindings: PropertyBindings) -> Self {
        self.bindings = bindings;
        self
    }

    /// Adds a listener; a fresh closure counts as a new handler
    pub fn on<F>(self, event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        self.on_handler(event, Some(Arc::new(handler)))
    }

    /// Adds a listener whose identity the caller controls
    pub fn on_handler(mut self, event: impl Into<String>, handler: Option<EventHandler>) -> Self {
        self.events.push(EventBinding::new(event, handler));
        self
    }

    pub fn watch(mut self, property: impl Into<String>, callback: Option<WatchCallback>) -> Self {
        self.watches.push(WatchBinding::new(property, callback));
        self
    }

    pub fn on_create<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Instance) + Send + Sync + 'static,
    {
        self.on_create = Some(Arc::new(callback));
        self
    }

    pub fn with_create_callback(mut self, callback: Option<CreateCallback>) -> Self {
        self.on_create = callback;
        self
    }

    /// Explicit view, preferred over the ambient one
    pub fn with_view(mut self, view: ViewHandle) -> Self {
        self.parent.view = Some(view);
        self
    }

    /// Explicit map, preferred over the ambient one
    pub fn with_map(mut self, map: MapHandle) -> Self {
        self.parent.map = Some(map);
        self
    }

    pub fn with_parent(mut self, parent: ParentOverride) -> Self {
        self.parent = parent;
        self
    }
}

impl std::fmt::Debug for EntityProps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityProps")
            .field("bindings", &self.bindings)
            .field("events", &self.events)
            .field("watches", &self.watches)
            .field("on_create", &self.on_create.is_some())
            .finish()
    }
}

/// What a node needs from, and gives to, the tree around it
#[derive(Clone)]
pub(crate) enum Role {
    /// Layer or widget attached into a parent collection
    Child,
    /// Top-level view drawn on a host surface; provides `{view, map}`
    RootView { surface: Arc<dyn Surface> },
    /// Map without attachment; provides `{map}`
    MapProvider,
}

/// Parent resolved from context at construction time
#[derive(Clone)]
enum ParentRef {
    Unbound,
    Map(MapHandle),
    View(ViewHandle),
}

impl ParentRef {
    fn same(&self, other: &ParentRef) -> bool {
        match (self, other) {
            (ParentRef::Unbound, ParentRef::Unbound) => true,
            (ParentRef::Map(a), ParentRef::Map(b)) => same_object(a, b),
            (ParentRef::View(a), ParentRef::View(b)) => same_object(a, b),
            _ => false,
        }
    }

    fn map(&self) -> Option<&MapHandle> {
        match self {
            ParentRef::Map(map) => Some(map),
            _ => None,
        }
    }

    fn view(&self) -> Option<&ViewHandle> {
        match self {
            ParentRef::View(view) => Some(view),
            _ => None,
        }
    }
}

/// Edge from an instance to its parent; removed before destroy
enum Attachment {
    Collection(Arc<dyn Collection>),
    Ui(Arc<dyn UiOverlay>),
    Surface(Arc<dyn Surface>, ViewHandle),
}

impl Attachment {
    fn detach(&self, instance: &Instance) -> anyhow::Result<()> {
        match self {
            Attachment::Collection(collection) => collection.remove(instance),
            Attachment::Ui(ui) => ui.remove(instance),
            Attachment::Surface(surface, view) => surface.detach(view),
        }
    }
}

struct State {
    phase: Phase,
    /// Bumped by every construction and teardown
    epoch: u64,
    props: EntityProps,
    parent: Option<ParentRef>,
    /// Constructor-only fields the current instance was built with
    identity: EntityConfig,
    instance: Option<Instance>,
    view: Option<ViewHandle>,
    map: Option<MapHandle>,
    attachment: Option<Attachment>,
    sync: PropertySynchronizer,
    events: EventBinder,
    watches: WatchBinder,
    last_error: Option<Arc<BindError>>,
    constructions: u64,
}

impl State {
    fn new(props: EntityProps) -> Self {
        Self {
            phase: Phase::Unresolved,
            epoch: 0,
            props,
            parent: None,
            identity: EntityConfig::new(),
            instance: None,
            view: None,
            map: None,
            attachment: None,
            sync: PropertySynchronizer::new(),
            events: EventBinder::new(),
            watches: WatchBinder::new(),
            last_error: None,
            constructions: 0,
        }
    }
}

/// Shared between the owning node, its scope subscription and its async tasks
struct Core {
    spec: EntitySpec,
    role: Role,
    cell: ModuleCell,
    guard: MountGuard,
    spawner: Arc<dyn AsyncSpawner>,
    scope: Scope,
    child_scope: Option<Scope>,
    state: Mutex<State>,
}

impl Core {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn start_resolution(self: &Arc<Self>) {
        let thunk = self.spec.import.clone();
        let cell = self.cell.clone();
        let guard = self.guard.clone();
        let core = self.clone();
        self.spawner.spawn_boxed(Box::pin(async move {
            resolver::resolve(thunk, cell, guard).await;
            core.advance();
        }));
    }

    /// Moves the node forward as far as the current props and context allow.
    ///
    /// Called on mount, on every update, on ambient context changes and when an
    /// asynchronous step completes.
    fn advance(self: &Arc<Self>) {
        if !self.guard.is_mounted() {
            return;
        }
        let mut guard = self.state();
        let state = &mut *guard;
        let ambient = state.props.parent.apply(self.scope.current());

        match state.phase {
            Phase::Destroyed | Phase::Constructing => {}
            Phase::Unresolved => {
                if let Some(error) = self.cell.error() {
                    state.last_error.get_or_insert(error);
                    return;
                }
                let Some(module) = self.cell.get() else {
                    return;
                };
                match self.required_parent(&ambient) {
                    Some(parent) => self.begin_construction(state, module, parent, &ambient),
                    None => log::debug!("'{}' waiting for its parent", self.spec.module),
                }
            }
            Phase::AttachedNotReady | Phase::Live => {
                if let Some(next) = self.parent_change(state, &ambient) {
                    drop(guard);
                    if next.is_terminal() {
                        self.guard.release();
                    }
                    self.teardown(next);
                    self.advance();
                    return;
                }
                if state.phase.is_live() {
                    if self.identity_changed(state) {
                        drop(guard);
                        self.teardown(Phase::Unresolved);
                        self.advance();
                        return;
                    }
                    self.apply_props(state);
                }
            }
        }
    }

    /// `None` while a required parent is missing from the context
    fn required_parent(&self, ambient: &AmbientContext) -> Option<ParentRef> {
        match (&self.role, &self.spec.target) {
            (Role::MapProvider, _) => Some(ParentRef::Unbound),
            (Role::RootView { .. }, _) => ambient.map.clone().map(ParentRef::Map),
            (Role::Child, AttachTarget::Layers) => ambient.effective_map().map(ParentRef::Map),
            (Role::Child, AttachTarget::Ui { .. }) => ambient.view.clone().map(ParentRef::View),
            (Role::Child, _) => Some(ParentRef::Unbound),
        }
    }

    /// Phase to tear down to when the resolved parent no longer matches
    fn parent_change(&self, state: &State, ambient: &AmbientContext) -> Option<Phase> {
        let current = self.required_parent(ambient);
        let unchanged = matches!(
            (&current, &state.parent),
            (Some(now), Some(before)) if now.same(before)
        );
        if unchanged {
            return None;
        }
        if !self.spec.options.rebind_on_parent_change {
            log::debug!("parent of '{}' changed, keeping the attachment", self.spec.module);
            return None;
        }
        match (&self.role, current) {
            (Role::RootView { .. }, None) => {
                log::debug!("map of view '{}' went away", self.spec.module);
                Some(Phase::Destroyed)
            }
            _ => {
                log::debug!("parent of '{}' changed, rebuilding", self.spec.module);
                Some(Phase::Unresolved)
            }
        }
    }

    fn identity_changed(&self, state: &mut State) -> bool {
        if self.spec.constructor_fields.is_empty() {
            return false;
        }
        let current = state
            .props
            .bindings
            .snapshot()
            .restricted_to(&self.spec.constructor_fields);
        if current == state.identity {
            return false;
        }
        match self.spec.options.identity_change {
            IdentityChangePolicy::Recreate => {
                log::debug!("constructor fields of '{}' changed, recreating", self.spec.module);
                true
            }
            IdentityChangePolicy::Ignore => {
                log::warn!(
                    "constructor fields of '{}' changed, keeping the existing instance",
                    self.spec.module
                );
                state.identity = current;
                false
            }
        }
    }

    fn apply_props(&self, state: &mut State) {
        let bindings = state.props.bindings.without(&self.spec.constructor_fields);
        let outcome = state.sync.sync(state.instance.as_deref(), &bindings);
        if let Some(error) = outcome.rejected.into_iter().last() {
            state.last_error = Some(Arc::new(error));
        }
        state.events.bind(state.instance.as_deref(), &state.props.events);
        state.watches.bind(state.instance.as_deref(), &state.props.watches);
    }

    fn begin_construction(
        self: &Arc<Self>,
        state: &mut State,
        module: ModuleHandle,
        parent: ParentRef,
        ambient: &AmbientContext,
    ) {
        let config = state.props.bindings.snapshot();
        state.phase = Phase::Constructing;
        state.epoch += 1;
        state.constructions += 1;
        state.identity = config.restricted_to(&self.spec.constructor_fields);
        state.sync.seed(&config);

        let mut args = ConstructArgs::new(self.spec.module.clone(), config);
        args.view = parent.view().cloned().or_else(|| ambient.view.clone());
        args.map = parent.map().cloned().or_else(|| ambient.effective_map());
        if let Role::RootView { surface } = &self.role {
            args.surface = Some(surface.clone());
        }
        state.parent = Some(parent);

        log::debug!("constructing '{}' with {:?}", self.spec.module, module.name());
        let epoch = state.epoch;
        let core = self.clone();
        self.spawner.spawn_boxed(Box::pin(async move {
            let result = module.construct(args).await;
            core.finish_construction(epoch, result);
        }));
    }

    fn finish_construction(self: &Arc<Self>, epoch: u64, result: anyhow::Result<Instance>) {
        let mut guard = self.state();
        let state = &mut *guard;
        let current =
            self.guard.is_mounted() && state.epoch == epoch && state.phase == Phase::Constructing;

        let instance = match result {
            Ok(instance) => instance,
            Err(error) if current => {
                let error = BindError::Construction {
                    module: self.spec.module.clone(),
                    reason: format!("{:#}", error),
                };
                log::error!("{}", error);
                state.last_error = Some(Arc::new(error));
                return;
            }
            Err(_) => {
                self.log_discard("failed construction");
                return;
            }
        };

        if !current {
            self.log_discard("constructed instance");
            instance.destroy();
            return;
        }

        let ambient = state.props.parent.apply(self.scope.current());
        let parent_ok = matches!(
            (self.required_parent(&ambient), &state.parent),
            (Some(now), Some(before)) if now.same(before)
        );
        if !parent_ok {
            log::debug!("parent of '{}' changed while constructing", self.spec.module);
            instance.destroy();
            state.phase = Phase::Unresolved;
            state.parent = None;
            state.sync.reset();
            drop(guard);
            self.advance();
            return;
        }

        if let Err(error) = self.attach(state, &instance) {
            log::error!("{}", error);
            state.last_error = Some(Arc::new(error));
            state.view = None;
            state.map = None;
            instance.destroy();
            return;
        }
        state.instance = Some(instance.clone());

        match (&self.role, state.view.clone()) {
            (Role::RootView { .. }, Some(view)) => {
                state.phase = Phase::AttachedNotReady;
                log::debug!("view '{}' attached, waiting for ready", self.spec.module);
                let core = self.clone();
                self.spawner.spawn_boxed(Box::pin(async move {
                    let result = view.when().await;
                    core.finish_ready(epoch, result);
                }));
            }
            _ => {
                drop(guard);
                self.go_live(epoch, instance);
            }
        }
    }

    fn attach(&self, state: &mut State, instance: &Instance) -> Result<(), BindError> {
        let module = &self.spec.module;
        let attachment = match &self.role {
            Role::Child => match &self.spec.target {
                AttachTarget::Layers => {
                    let layers = state
                        .parent
                        .as_ref()
                        .and_then(ParentRef::map)
                        .map(|map| map.layers())
                        .ok_or_else(|| self.attach_error("map layers", anyhow::anyhow!("no map")))?;
                    layers
                        .add(instance.clone())
                        .map_err(|e| self.attach_error(&layers.describe(), e))?;
                    Some(Attachment::Collection(layers))
                }
                AttachTarget::Ui { position } => {
                    let ui = state
                        .parent
                        .as_ref()
                        .and_then(ParentRef::view)
                        .map(|view| view.ui())
                        .ok_or_else(|| self.attach_error("view ui", anyhow::anyhow!("no view")))?;
                    ui.add(instance.clone(), *position)
                        .map_err(|e| self.attach_error(&format!("view ui ({})", position), e))?;
                    Some(Attachment::Ui(ui))
                }
                AttachTarget::Collection(collection) => {
                    collection
                        .add(instance.clone())
                        .map_err(|e| self.attach_error(&collection.describe(), e))?;
                    Some(Attachment::Collection(collection.clone()))
                }
                AttachTarget::Detached => None,
            },
            Role::RootView { surface } => {
                let view = instance.clone().as_view().ok_or_else(|| BindError::Construction {
                    module: module.clone(),
                    reason: format!("'{}' is not a view", instance.declared_class()),
                })?;
                surface
                    .attach(&view)
                    .map_err(|e| self.attach_error(&surface.describe(), e))?;
                state.view = Some(view.clone());
                Some(Attachment::Surface(surface.clone(), view))
            }
            Role::MapProvider => {
                let map = instance.clone().as_map().ok_or_else(|| BindError::Construction {
                    module: module.clone(),
                    reason: format!("'{}' is not a map", instance.declared_class()),
                })?;
                state.map = Some(map);
                None
            }
        };
        state.attachment = attachment;
        Ok(())
    }

    fn attach_error(&self, target: &str, error: anyhow::Error) -> BindError {
        BindError::Attachment {
            module: self.spec.module.clone(),
            target: target.to_string(),
            reason: format!("{:#}", error),
        }
    }

    fn finish_ready(self: &Arc<Self>, epoch: u64, result: anyhow::Result<()>) {
        let instance = {
            let mut state = self.state();
            if !self.guard.is_mounted()
                || state.epoch != epoch
                || state.phase != Phase::AttachedNotReady
            {
                self.log_discard("ready signal");
                return;
            }
            if let Err(error) = result {
                let error = BindError::Ready {
                    module: self.spec.module.clone(),
                    reason: format!("{:#}", error),
                };
                log::error!("{}", error);
                state.last_error = Some(Arc::new(error));
                return;
            }
            state.instance.clone()
        };
        if let Some(instance) = instance {
            self.go_live(epoch, instance);
        }
    }

    /// Announces the instance, goes live and publishes to the subtree.
    ///
    /// The creation callback runs under the state lock, after the mount and
    /// epoch checks, so an unmount either skips it or waits for it to return.
    /// It must not call back into its own node.
    fn go_live(self: &Arc<Self>, epoch: u64, instance: Instance) {
        let provision = {
            let mut guard = self.state();
            let state = &mut *guard;
            if !self.guard.is_mounted() || state.epoch != epoch {
                self.log_discard("attached instance");
                return;
            }
            if let Some(on_create) = state.props.on_create.clone() {
                on_create(&instance);
            }
            state.phase = Phase::Live;
            log::debug!("'{}' is live as {}", self.spec.module, instance.declared_class());
            self.apply_props(state);
            self.provision(state)
        };

        if let (Some(scope), Some(provision)) = (&self.child_scope, provision) {
            scope.provide(provision);
        }
        // constructor fields may have changed while the instance was attaching
        self.advance();
    }

    fn provision(&self, state: &State) -> Option<Provision> {
        match &self.role {
            Role::Child => None,
            Role::RootView { .. } => state.view.clone().map(|view| {
                let map = view
                    .map()
                    .or_else(|| state.parent.as_ref().and_then(ParentRef::map).cloned());
                Provision::view(view, map)
            }),
            Role::MapProvider => state.map.clone().map(Provision::map),
        }
    }

    /// Unbinds, detaches and destroys the current instance, if any.
    ///
    /// The subtree's provision is withdrawn first so children detach from this
    /// instance before it goes away.
    fn teardown(&self, next: Phase) {
        if let Some(scope) = &self.child_scope {
            scope.withdraw();
        }

        let (instance, attachment) = {
            let mut guard = self.state();
            let state = &mut *guard;
            state.epoch += 1;
            state.events.clear();
            state.watches.clear();
            state.sync.reset();
            state.phase = next;
            state.parent = None;
            state.view = None;
            state.map = None;
            (state.instance.take(), state.attachment.take())
        };

        if let Some(instance) = instance {
            if let Some(attachment) = attachment {
                if let Err(error) = attachment.detach(&instance) {
                    log::warn!("failed to detach '{}': {:#}", self.spec.module, error);
                }
            }
            instance.destroy();
            log::debug!("'{}' destroyed", self.spec.module);
        }
    }

    fn log_discard(&self, what: &str) {
        if self.spec.options.log_discarded_results {
            log::info!("discarding {} of '{}'", what, self.spec.module);
        } else {
            log::debug!("discarding {} of '{}'", what, self.spec.module);
        }
    }
}

/// Lifecycle shared by every node kind
pub(crate) struct Lifecycle {
    spec: EntitySpec,
    role: Role,
    spawner: Option<Arc<dyn AsyncSpawner>>,
    core: Option<Arc<Core>>,
    subscription: Option<Subscription>,
}

impl Lifecycle {
    pub(crate) fn new(spec: EntitySpec, role: Role) -> Self {
        Self {
            spec,
            role,
            spawner: None,
            core: None,
            subscription: None,
        }
    }

    /// Spawner for this node's async work; the global runtime otherwise
    pub(crate) fn set_spawner(&mut self, spawner: Arc<dyn AsyncSpawner>) {
        self.spawner = Some(spawner);
    }

    pub(crate) fn spec(&self) -> &EntitySpec {
        &self.spec
    }

    pub(crate) fn mount(&mut self, scope: &Scope, props: EntityProps) {
        if self.core.is_some() {
            log::warn!("'{}' mounted twice, treating as update", self.spec.module);
            self.update(props);
            return;
        }

        let child_scope = match self.role {
            Role::Child => None,
            Role::RootView { .. } | Role::MapProvider => Some(scope.child()),
        };
        let core = Arc::new(Core {
            spec: self.spec.clone(),
            role: self.role.clone(),
            cell: ModuleCell::new(self.spec.module.as_str()),
            guard: MountGuard::new(),
            spawner: self.spawner.clone().unwrap_or_else(runtime::runtime),
            scope: scope.clone(),
            child_scope,
            state: Mutex::new(State::new(props)),
        });

        let weak = Arc::downgrade(&core);
        self.subscription = Some(scope.subscribe(move || {
            if let Some(core) = weak.upgrade() {
                core.advance();
            }
        }));
        log::debug!("mounting '{}'", self.spec.module);
        self.core = Some(core.clone());
        core.start_resolution();
        core.advance();
    }

    pub(crate) fn update(&mut self, props: EntityProps) {
        let Some(core) = &self.core else {
            log::debug!("'{}' updated before mount, ignored", self.spec.module);
            return;
        };
        core.state().props = props;
        core.advance();
    }

    pub(crate) fn unmount(&mut self) {
        let Some(core) = &self.core else {
            return;
        };
        self.subscription = None;
        if !core.guard.is_mounted() && core.state().phase.is_terminal() {
            return;
        }
        // released before taking the state lock; in-flight steps check it under that lock
        core.guard.release();
        core.teardown(Phase::Destroyed);
        log::debug!("unmounted '{}'", self.spec.module);
    }

    pub(crate) fn phase(&self) -> Phase {
        self.core
            .as_ref()
            .map(|core| core.state().phase)
            .unwrap_or(Phase::Unresolved)
    }

    pub(crate) fn instance(&self) -> Option<Instance> {
        self.core.as_ref().and_then(|core| core.state().instance.clone())
    }

    pub(crate) fn view(&self) -> Option<ViewHandle> {
        self.core.as_ref().and_then(|core| core.state().view.clone())
    }

    pub(crate) fn map(&self) -> Option<MapHandle> {
        self.core.as_ref().and_then(|core| core.state().map.clone())
    }

    pub(crate) fn last_error(&self) -> Option<Arc<BindError>> {
        self.core
            .as_ref()
            .and_then(|core| core.state().last_error.clone())
    }

    pub(crate) fn module_cell(&self) -> Option<&ModuleCell> {
        self.core.as_ref().map(|core| &core.cell)
    }

    pub(crate) fn child_scope(&self) -> Option<&Scope> {
        self.core.as_ref().and_then(|core| core.child_scope.as_ref())
    }

    /// Construction attempts so far, recreations included
    pub(crate) fn constructions(&self) -> u64 {
        self.core
            .as_ref()
            .map(|core| core.state().constructions)
            .unwrap_or(0)
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.unmount();
    }
}
