//! Declarative nodes wrapping engine objects

pub mod entity;
pub mod events;
pub mod manager;
pub mod map;
pub mod resolver;
pub mod sync;
pub mod view;

pub use entity::ChildEntity;
pub use events::{EventBinder, EventBinding, WatchBinder, WatchBinding};
pub use manager::{AttachTarget, CreateCallback, EntityProps, EntitySpec, Phase};
pub use map::MapProvider;
pub use resolver::{ImportThunk, ModuleCell, ModuleRegistry};
pub use sync::{PropertyBinding, PropertyBindings, PropertySynchronizer};
pub use view::{RootView, ViewProps, ViewSpec};

use crate::core::context::Scope;

/// A node the host UI framework mounts, re-renders and unmounts.
///
/// None of the methods report errors; failures are logged and leave the node in
/// a non-progressing phase.
pub trait DeclarativeNode {
    type Props;

    /// Attaches the node under `scope` with its first props
    fn mount(&mut self, scope: &Scope, props: Self::Props);

    /// Called on every re-render with the latest props
    fn update(&mut self, props: Self::Props);

    /// Releases everything the node owns. Idempotent.
    fn unmount(&mut self);

    fn phase(&self) -> Phase;
}
