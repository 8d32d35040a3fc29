//! # mapbind
//!
//! Declarative lifecycle bindings for imperative, stateful map engines.
//!
//! A map engine hands out long-lived objects (maps, views, layers, widgets) that
//! are constructed once, mutated in place and destroyed explicitly. A component
//! tree, on the other hand, re-describes its children on every render. This crate
//! sits between the two: each declarative node owns exactly one engine object,
//! resolves its constructor lazily, projects changed props onto the object's
//! fields, keeps event listeners in step with callback props, and tears the
//! object down deterministically when the node unmounts.
//!
//! The engine is reached only through the capability traits in [`traits`]; the
//! host UI framework drives nodes through [`lifecycle::DeclarativeNode`] and
//! shares the current view/map through the [`core::context::Scope`] tree.

pub mod adapters;
pub mod core;
pub mod lifecycle;
pub mod prelude;
pub mod runtime;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod traits;

// Re-export public API
pub use crate::core::{
    config::{EntityConfig, IdentityChangePolicy, LifecycleOptions},
    context::{AmbientContext, ParentOverride, Provision, Scope},
    guard::MountGuard,
    theme::{Theme, ThemeProvider},
};

pub use lifecycle::{
    entity::ChildEntity,
    events::{EventBinding, WatchBinding},
    manager::{AttachTarget, EntityProps, EntitySpec, Phase},
    map::MapProvider,
    resolver::{ModuleCell, ModuleRegistry},
    sync::{PropertyBinding, PropertyBindings},
    view::RootView,
    DeclarativeNode,
};

pub use traits::{
    EngineConstructor, EngineMap, EngineObject, EngineView, Instance, MapHandle, UiPosition,
    ViewHandle,
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, BindError>;

/// Failures surfaced by the binding layer.
///
/// None of these are returned from mount/update/unmount; they are logged and
/// kept as the node's last error so the rest of the tree keeps rendering.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("failed to resolve module '{module}': {reason}")]
    Resolution { module: String, reason: String },

    #[error("no module registered under '{0}'")]
    UnknownModule(String),

    #[error("failed to construct '{module}': {reason}")]
    Construction { module: String, reason: String },

    #[error("failed to attach '{module}' to {target}: {reason}")]
    Attachment {
        module: String,
        target: String,
        reason: String,
    },

    #[error("view '{module}' never became ready: {reason}")]
    Ready { module: String, reason: String },

    #[error("property '{field}' rejected: {reason}")]
    Property { field: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error type alias for convenience
pub type Error = BindError;

/// Installs `env_logger` as the `log` backend, honouring `RUST_LOG`.
#[cfg(feature = "debug")]
pub fn init_logging() {
    let _ = env_logger::try_init();
}
