//! Thin per-entity adapters
//!
//! Each adapter only lists its fields; the behaviour lives in
//! [`lifecycle`](crate::lifecycle). Build a node with [`child`], [`root_view`]
//! or [`map_provider`] and feed it `adapter.into_props()` on every render.

#[macro_use]
pub mod macros;

pub mod layers;
pub mod maps;
pub mod views;
pub mod widgets;

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::lifecycle::{
    entity::ChildEntity,
    manager::{AttachTarget, EntityProps, EntitySpec},
    map::MapProvider,
    resolver::ModuleRegistry,
    sync::PropertyBindings,
    view::{RootView, ViewSpec},
};
use crate::traits::Surface;

pub use layers::{FeatureLayer, GeoJsonLayer, GraphicsLayer, TileLayer, VectorTileLayer};
pub use maps::{Map, WebMap};
pub use views::{MapView, SceneView};
pub use widgets::{BasemapToggle, LayerList, Legend, ScaleBar, Search, Zoom};

/// Props of one kind of engine entity
pub trait EntityAdapter: Clone + Default {
    /// Module name the constructor is registered under
    const MODULE: &'static str;

    /// Fields the engine only reads when constructing
    const CONSTRUCTOR_FIELDS: &'static [&'static str];

    fn target() -> AttachTarget;

    fn bindings(&self) -> PropertyBindings;

    fn spec(registry: &ModuleRegistry) -> EntitySpec {
        EntitySpec::from_registry(registry, Self::MODULE, Self::target())
            .with_constructor_fields(Self::CONSTRUCTOR_FIELDS.iter().copied())
    }

    fn into_props(self) -> EntityProps {
        EntityProps::new(self.bindings())
    }
}

/// Layer or widget node for `A`
pub fn child<A: EntityAdapter>(registry: &ModuleRegistry) -> ChildEntity {
    ChildEntity::new(A::spec(registry))
}

/// View node for `A` drawing on `surface`
pub fn root_view<A: EntityAdapter>(registry: &ModuleRegistry, surface: Arc<dyn Surface>) -> RootView {
    RootView::new(ViewSpec::from_entity(A::spec(registry), surface))
}

pub fn map_provider<A: EntityAdapter>(registry: &ModuleRegistry) -> MapProvider {
    MapProvider::new(A::spec(registry))
}

#[doc(hidden)]
pub fn field_value<T: Serialize>(name: &str, value: &Option<T>) -> Option<Value> {
    let value = value.as_ref()?;
    match serde_json::to_value(value) {
        Ok(value) => Some(value),
        Err(error) => {
            log::warn!("field '{}' is not serializable: {}", name, error);
            None
        }
    }
}
