//! Layers and widgets
//!
//! A [`ChildEntity`] renders nothing itself. It reads its parent (map or view)
//! from the ambient context unless one is passed explicitly, attaches its engine
//! object there once constructed, and leaves it again on unmount.

use std::sync::Arc;

use crate::core::context::Scope;
use crate::lifecycle::manager::{EntityProps, EntitySpec, Lifecycle, Phase, Role};
use crate::lifecycle::resolver::ModuleCell;
use crate::lifecycle::DeclarativeNode;
use crate::runtime::AsyncSpawner;
use crate::traits::Instance;
use crate::BindError;

pub struct ChildEntity {
    lifecycle: Lifecycle,
}

impl ChildEntity {
    pub fn new(spec: EntitySpec) -> Self {
        Self {
            lifecycle: Lifecycle::new(spec, Role::Child),
        }
    }

    /// Runs this node's async work on `spawner` instead of the global runtime
    pub fn with_spawner(mut self, spawner: Arc<dyn AsyncSpawner>) -> Self {
        self.lifecycle.set_spawner(spawner);
        self
    }

    pub fn spec(&self) -> &EntitySpec {
        self.lifecycle.spec()
    }

    /// The live engine object, once attached
    pub fn instance(&self) -> Option<Instance> {
        self.lifecycle.instance()
    }

    pub fn last_error(&self) -> Option<Arc<BindError>> {
        self.lifecycle.last_error()
    }

    pub fn module(&self) -> Option<&ModuleCell> {
        self.lifecycle.module_cell()
    }

    pub fn constructions(&self) -> u64 {
        self.lifecycle.constructions()
    }
}

impl DeclarativeNode for ChildEntity {
    type Props = EntityProps;

    fn mount(&mut self, scope: &Scope, props: EntityProps) {
        self.lifecycle.mount(scope, props);
    }

    fn update(&mut self, props: EntityProps) {
        self.lifecycle.update(props);
    }

    fn unmount(&mut self) {
        self.lifecycle.unmount();
    }

    fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }
}

impl std::fmt::Debug for ChildEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildEntity")
            .field("module", &self.spec().module)
            .field("phase", &self.phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::Provision;
    use crate::lifecycle::manager::AttachTarget;
    use crate::lifecycle::sync::PropertyBindings;
    use crate::testing::{Call, FakeEngine};
    use crate::traits::UiPosition;
    use serde_json::json;

    #[test]
    fn test_layer_waits_for_map() {
        let engine = FakeEngine::new();
        let scope = Scope::root();
        let mut layer = ChildEntity::new(engine.spec("layers/FeatureLayer", AttachTarget::Layers))
            .with_spawner(engine.spawner());

        layer.mount(&scope, EntityProps::default());
        engine.run();
        assert_eq!(layer.phase(), Phase::Unresolved);
        assert!(layer.module().unwrap().get().is_some());
        assert_eq!(engine.journal().constructs(), 0);

        let map = engine.map();
        scope.provide(Provision::map(map.clone()));
        engine.run();

        assert_eq!(layer.phase(), Phase::Live);
        assert_eq!(map.layer_count(), 1);
    }

    #[test]
    fn test_widget_uses_explicit_view_over_ambient() {
        let engine = FakeEngine::new();
        let ambient = engine.view();
        let explicit = engine.view();
        ambient.open_ready();
        explicit.open_ready();
        let scope = Scope::root();
        scope.provide(Provision::view(ambient.clone(), None));

        let mut legend = ChildEntity::new(
            engine.spec("widgets/Legend", AttachTarget::ui(UiPosition::BottomLeft)),
        )
        .with_spawner(engine.spawner());
        legend.mount(&scope, EntityProps::default().with_view(explicit.clone()));
        engine.run();

        assert_eq!(legend.phase(), Phase::Live);
        assert_eq!(explicit.ui_items(), vec![UiPosition::BottomLeft]);
        assert!(ambient.ui_items().is_empty());
    }

    #[test]
    fn test_rejected_property_is_recorded_not_raised() {
        let engine = FakeEngine::new();
        let mut layer = ChildEntity::new(engine.spec("layers/TileLayer", AttachTarget::Detached))
            .with_spawner(engine.spawner());
        layer.mount(&Scope::root(), EntityProps::default());
        engine.run();

        layer.update(EntityProps::new(PropertyBindings::new().set("readonly", json!(1))));

        assert_eq!(layer.phase(), Phase::Live);
        assert!(matches!(
            layer.last_error().as_deref(),
            Some(BindError::Property { .. })
        ));
        assert_eq!(engine.journal().count(|c| matches!(c, Call::Set { .. })), 0);
    }

    #[test]
    fn test_drop_unmounts() {
        let engine = FakeEngine::new();
        {
            let mut layer = ChildEntity::new(engine.spec("layers/GeoJSONLayer", AttachTarget::Detached))
                .with_spawner(engine.spawner());
            layer.mount(&Scope::root(), EntityProps::default());
            engine.run();
            assert!(layer.instance().is_some());
        }
        assert_eq!(engine.journal().destroys(), 1);
        assert_eq!(engine.live_instances(), 0);
    }
}
