//! Prelude module for common mapbind types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use mapbind::prelude::*;`

pub use crate::core::{
    config::{EntityConfig, EntityConfigBuilder, IdentityChangePolicy, LifecycleOptions},
    context::{AmbientContext, ParentOverride, Provision, Scope, Subscription},
    guard::MountGuard,
    theme::{Theme, ThemeProvider},
};

pub use crate::lifecycle::{
    entity::ChildEntity,
    events::{EventBinding, EventHandler, WatchBinding, WatchCallback},
    manager::{AttachTarget, CreateCallback, EntityProps, EntitySpec, Phase},
    map::MapProvider,
    resolver::{ImportThunk, ModuleCell, ModuleRegistry},
    sync::{PropertyBinding, PropertyBindings},
    view::{RootView, ViewProps, ViewSpec},
    DeclarativeNode,
};

pub use crate::traits::{
    same_object, Collection, ConstructArgs, Destroyable, EngineConstructor, EngineEvent,
    EngineMap, EngineObject, EngineView, EventEmitting, Instance, ListenerHandle, MapHandle,
    Observable, PropertyTarget, Surface, UiOverlay, UiPosition, ViewHandle,
};

pub use crate::runtime::{runtime, spawn, AsyncHandle, AsyncSpawner, ManualSpawner};

pub use crate::{BindError, Result};

pub use std::sync::Arc;

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};

pub use futures::future::BoxFuture;
pub use futures::Future;
pub use std::pin::Pin;
