//! Map-level provider
//!
//! Constructs an engine map that is not attached anywhere and offers it as the
//! ambient `{map}` to its subtree. Views and layers mounted below pick it up.

use std::sync::Arc;

use crate::core::context::Scope;
use crate::lifecycle::manager::{AttachTarget, EntityProps, EntitySpec, Lifecycle, Phase, Role};
use crate::lifecycle::DeclarativeNode;
use crate::runtime::AsyncSpawner;
use crate::traits::MapHandle;
use crate::BindError;

pub struct MapProvider {
    lifecycle: Lifecycle,
}

impl MapProvider {
    pub fn new(spec: EntitySpec) -> Self {
        Self {
            lifecycle: Lifecycle::new(spec.with_target(AttachTarget::Detached), Role::MapProvider),
        }
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn AsyncSpawner>) -> Self {
        self.lifecycle.set_spawner(spawner);
        self
    }

    pub fn child_scope(&self) -> Option<&Scope> {
        self.lifecycle.child_scope()
    }

    pub fn map(&self) -> Option<MapHandle> {
        self.lifecycle.map()
    }

    pub fn last_error(&self) -> Option<Arc<BindError>> {
        self.lifecycle.last_error()
    }
}

impl DeclarativeNode for MapProvider {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::entity::ChildEntity;
    use crate::testing::FakeEngine;

    #[test]
    fn test_provides_map_to_layers() {
        let engine = FakeEngine::new();
        let mut map = MapProvider::new(engine.spec("Map", AttachTarget::Detached))
            .with_spawner(engine.spawner());
        map.mount(&Scope::root(), EntityProps::default());
        engine.run();
        assert_eq!(map.phase(), Phase::Live);

        let scope = map.child_scope().unwrap().clone();
        let mut layer = ChildEntity::new(engine.spec("layers/TileLayer", AttachTarget::Layers))
            .with_spawner(engine.spawner());
        layer.mount(&scope, EntityProps::default());
        engine.run();
        assert_eq!(layer.phase(), Phase::Live);

        // children leave before the map goes away
        map.unmount();
        assert_eq!(layer.phase(), Phase::Unresolved);
        assert_eq!(engine.journal().destroys(), 2);
        assert_eq!(engine.live_instances(), 0);
    }

    #[test]
    fn test_non_map_instance_is_rejected() {
        let engine = FakeEngine::new();
        let mut map = MapProvider::new(engine.spec("layers/FeatureLayer", AttachTarget::Detached))
            .with_spawner(engine.spawner());
        map.mount(&Scope::root(), EntityProps::default());
        engine.run();

        assert_eq!(map.phase(), Phase::Constructing);
        assert!(map.map().is_none());
        assert!(matches!(
            map.last_error().as_deref(),
            Some(BindError::Construction { .. })
        ));
    }
}
