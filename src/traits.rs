//! Capability interfaces every wrapped engine object must satisfy
//!
//! The map engine itself is opaque. Instead of assuming that an object happens to
//! have `on`, `watch` or `destroy`, each capability is a trait and an engine
//! object is anything implementing all of them. Parents (layer collections, UI
//! overlays, drawing surfaces) are traits too, so attach/detach stays symmetric
//! and testable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::config::EntityConfig;

/// A live engine object (view, map, layer or widget)
pub type Instance = Arc<dyn EngineObject>;

/// A live engine map
pub type MapHandle = Arc<dyn EngineMap>;

/// A live engine view
pub type ViewHandle = Arc<dyn EngineView>;

/// Listener registered through [`EventEmitting::on`]
pub type EventHandler = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

/// Callback registered through [`Observable::watch`]
pub type WatchCallback = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Event emitted by an engine object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub name: String,
    pub payload: serde_json::Value,
}

impl EngineEvent {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// Returns true when both handles point at the same engine object.
///
/// Only the data pointer is compared; vtables may differ between codegen units.
pub fn same_object<T: ?Sized, U: ?Sized>(a: &Arc<T>, b: &Arc<U>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Handle returned by a subscription; consuming it unsubscribes.
pub trait ListenerHandle: Send + Sync {
    fn remove(self: Box<Self>);
}

impl<F> ListenerHandle for F
where
    F: FnOnce() + Send + Sync + 'static,
{
    fn remove(self: Box<Self>) {
        (*self)()
    }
}

/// Explicit teardown
pub trait Destroyable {
    /// Releases every engine-side resource. Called at most once by this crate.
    fn destroy(&self);

    fn is_destroyed(&self) -> bool;
}

/// Mutable, named fields
pub trait PropertyTarget {
    fn set_property(&self, name: &str, value: serde_json::Value) -> anyhow::Result<()>;

    fn property(&self, name: &str) -> Option<serde_json::Value>;
}

/// `on(eventName, handler) -> {remove()}`
pub trait EventEmitting {
    fn on(&self, event: &str, handler: EventHandler) -> Box<dyn ListenerHandle>;
}

/// `watch(propertyName, callback) -> {remove()}`
pub trait Observable {
    fn watch(&self, property: &str, callback: WatchCallback) -> Box<dyn ListenerHandle>;
}

/// Everything a wrapped engine object has to offer
pub trait EngineObject:
    Destroyable + PropertyTarget + EventEmitting + Observable + Send + Sync
{
    /// Engine-side class name, used in logs
    fn declared_class(&self) -> &str;

    /// Narrows to a view when the object is one
    fn as_view(self: Arc<Self>) -> Option<ViewHandle> {
        None
    }

    /// Narrows to a map when the object is one
    fn as_map(self: Arc<Self>) -> Option<MapHandle> {
        None
    }
}

/// A map owns the layer list children attach into
pub trait EngineMap: EngineObject {
    fn layers(&self) -> Arc<dyn Collection>;
}

/// A view owns a UI overlay and exposes a one-time ready signal
#[async_trait]
pub trait EngineView: EngineObject {
    fn ui(&self) -> Arc<dyn UiOverlay>;

    fn map(&self) -> Option<MapHandle>;

    /// Resolves once the view is ready to host children
    async fn when(&self) -> anyhow::Result<()>;
}

/// Ordered parent collection (a map's layer list, a group layer, ...)
pub trait Collection: Send + Sync {
    fn add(&self, item: Instance) -> anyhow::Result<()>;

    fn remove(&self, item: &Instance) -> anyhow::Result<()>;

    fn contains(&self, item: &Instance) -> bool;

    fn add_many(&self, items: Vec<Instance>) -> anyhow::Result<()> {
        for item in items {
            self.add(item)?;
        }
        Ok(())
    }

    fn remove_many(&self, items: &[Instance]) -> anyhow::Result<()> {
        for item in items {
            self.remove(item)?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "collection".to_string()
    }
}

/// Overlay slots of a view
pub trait UiOverlay: Send + Sync {
    fn add(&self, item: Instance, position: UiPosition) -> anyhow::Result<()>;

    fn remove(&self, item: &Instance) -> anyhow::Result<()>;
}

/// Host drawing surface a root view renders into
pub trait Surface: Send + Sync {
    fn attach(&self, view: &ViewHandle) -> anyhow::Result<()>;

    fn detach(&self, view: &ViewHandle) -> anyhow::Result<()>;

    fn describe(&self) -> String {
        "surface".to_string()
    }
}

/// Everything a constructor receives besides its own config
#[derive(Clone)]
pub struct ConstructArgs {
    pub module: String,
    pub config: EntityConfig,
    pub view: Option<ViewHandle>,
    pub map: Option<MapHandle>,
    pub surface: Option<Arc<dyn Surface>>,
}

impl ConstructArgs {
    pub fn new(module: impl Into<String>, config: EntityConfig) -> Self {
        Self {
            module: module.into(),
            config,
            view: None,
            map: None,
            surface: None,
        }
    }
}

/// A resolved engine class
#[async_trait]
pub trait EngineConstructor: Send + Sync {
    fn name(&self) -> &str;

    async fn construct(&self, args: ConstructArgs) -> anyhow::Result<Instance>;
}

/// Named slot of a view's UI overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UiPosition {
    #[default]
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Manual,
}

impl std::fmt::Display for UiPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UiPosition::TopLeft => write!(f, "top-left"),
            UiPosition::TopRight => write!(f, "top-right"),
            UiPosition::BottomLeft => write!(f, "bottom-left"),
            UiPosition::BottomRight => write!(f, "bottom-right"),
            UiPosition::Manual => write!(f, "manual"),
        }
    }
}
