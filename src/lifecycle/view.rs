//! Top-level views
//!
//! A [`RootView`] draws on a host [`Surface`] and is the usual source of the
//! ambient `{view, map}` pair. It needs a map (explicit or ambient) before it is
//! constructed, and it publishes into its child scope only once the engine view
//! reports ready, so nothing below it starts constructing against a view that is
//! not usable yet.

use std::sync::Arc;

use crate::core::context::Scope;
use crate::lifecycle::manager::{AttachTarget, EntityProps, EntitySpec, Lifecycle, Phase, Role};
use crate::lifecycle::resolver::ImportThunk;
use crate::lifecycle::DeclarativeNode;
use crate::runtime::AsyncSpawner;
use crate::traits::{Instance, MapHandle, Surface, ViewHandle};
use crate::BindError;

/// Views take the same props as any other entity; `parent.map` is the map shown.
pub type ViewProps = EntityProps;

/// Engine class plus the surface a view renders into
#[derive(Clone)]
pub struct ViewSpec {
    pub entity: EntitySpec,
    pub surface: Arc<dyn Surface>,
}

impl ViewSpec {
    pub fn new(module: impl Into<String>, import: ImportThunk, surface: Arc<dyn Surface>) -> Self {
        Self {
            entity: EntitySpec::new(module, import, AttachTarget::Detached),
            surface,
        }
    }

    pub fn from_entity(entity: EntitySpec, surface: Arc<dyn Surface>) -> Self {
        Self { entity, surface }
    }
}

pub struct RootView {
    lifecycle: Lifecycle,
}

impl RootView {
    pub fn new(spec: ViewSpec) -> Self {
        Self {
            lifecycle: Lifecycle::new(spec.entity, Role::RootView { surface: spec.surface }),
        }
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn AsyncSpawner>) -> Self {
        self.lifecycle.set_spawner(spawner);
        self
    }

    /// Scope to mount the view's children into; `None` before mount
    pub fn child_scope(&self) -> Option<&Scope> {
        self.lifecycle.child_scope()
    }

    /// The engine view, from attachment on
    pub fn view(&self) -> Option<ViewHandle> {
        self.lifecycle.view()
    }

    /// The map the view shows, once live
    pub fn map(&self) -> Option<MapHandle> {
        self.child_scope().and_then(|scope| scope.current().map)
    }

    pub fn instance(&self) -> Option<Instance> {
        self.lifecycle.instance()
    }

    pub fn last_error(&self) -> Option<Arc<BindError>> {
        self.lifecycle.last_error()
    }

    /// True once children may be mounted against the view
    pub fn is_ready(&self) -> bool {
        self.phase().is_live()
    }
}

impl DeclarativeNode for RootView {
    type Props = ViewProps;

    fn mount(&mut self, scope: &Scope, props: ViewProps) {
        self.lifecycle.mount(scope, props);
    }

    fn update(&mut self, props: ViewProps) {
        self.lifecycle.update(props);
    }

    fn unmount(&mut self) {
        self.lifecycle.unmount();
    }

    fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }
}
