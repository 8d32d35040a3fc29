use mapbind::adapters::{self, EntityAdapter, FeatureLayer, Legend, TileLayer};
use mapbind::prelude::*;
use mapbind::testing::{object_id, Call, FakeEngine};
use serde_json::json;

/// Identity changes, parent changes, failures and ambient values
#[cfg(test)]
mod context_and_config_tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn registry_for(engine: &FakeEngine, modules: &[&str]) -> ModuleRegistry {
        let registry = ModuleRegistry::new();
        for module in modules {
            registry.register_constructor(*module, engine.constructor(module));
        }
        registry
    }

    /// Changing a constructor-only field builds a fresh instance
    #[test]
    fn test_identity_change_recreates() {
        init();
        let engine = FakeEngine::new();
        let registry = registry_for(&engine, &[TileLayer::MODULE]);
        let map = engine.map();
        let scope = Scope::root();
        scope.provide(Provision::map(map.clone()));

        let mut layer = adapters::child::<TileLayer>(&registry).with_spawner(engine.spawner());
        layer.mount(
            &scope,
            TileLayer::new().url("https://tiles/a").opacity(0.5).into_props(),
        );
        engine.run();
        let first = layer.instance().unwrap();

        layer.update(TileLayer::new().url("https://tiles/b").opacity(0.5).into_props());
        engine.run();

        let second = layer.instance().unwrap();
        assert!(!same_object(&first, &second));
        assert!(first.is_destroyed());
        assert_eq!(second.property("url"), Some(json!("https://tiles/b")));
        assert_eq!(second.property("opacity"), Some(json!(0.5)));
        assert_eq!(layer.constructions(), 2);
        assert_eq!(map.layer_count(), 1);
        // the constructor field is never assigned
        assert!(engine.journal().sets().iter().all(|(field, _)| field != "url"));
    }

    /// With `Ignore` the instance survives and later field changes still sync
    #[test]
    fn test_identity_change_ignored() {
        let engine = FakeEngine::new();
        let registry = registry_for(&engine, &[TileLayer::MODULE]);
        let scope = Scope::root();
        scope.provide(Provision::map(engine.map()));

        let spec = TileLayer::spec(&registry)
            .with_options(LifecycleOptions::default().with_identity_change(IdentityChangePolicy::Ignore));
        let mut layer = ChildEntity::new(spec).with_spawner(engine.spawner());
        layer.mount(&scope, TileLayer::new().url("https://tiles/a").into_props());
        engine.run();
        let first = layer.instance().unwrap();

        layer.update(TileLayer::new().url("https://tiles/b").visible(false).into_props());
        engine.run();

        assert!(same_object(&first, &layer.instance().unwrap()));
        assert_eq!(layer.constructions(), 1);
        assert_eq!(engine.journal().sets(), vec![("visible".to_string(), json!(false))]);
    }

    /// A layer follows its map when the ambient map is replaced
    #[test]
    fn test_layer_moves_to_replacement_map() {
        let engine = FakeEngine::new();
        let scope = Scope::root();
        let first = engine.map();
        let second = engine.map();
        scope.provide(Provision::map(first.clone()));

        let mut layer = ChildEntity::new(engine.spec("layers/FeatureLayer", AttachTarget::Layers))
            .with_spawner(engine.spawner());
        layer.mount(&scope, EntityProps::new(PropertyBindings::new().set("title", "Roads")));
        engine.run();
        assert_eq!(first.layer_count(), 1);

        scope.provide(Provision::map(second.clone()));
        engine.run();

        assert_eq!(layer.phase(), Phase::Live);
        assert_eq!(first.layer_count(), 0);
        assert_eq!(second.layer_count(), 1);
        assert_eq!(engine.journal().constructs(), 2);
        assert_eq!(engine.live_instances(), 1);
        let rebuilt = layer.instance().unwrap();
        assert_eq!(rebuilt.property("title"), Some(json!("Roads")));
    }

    /// Opting out of rebinding keeps the original attachment
    #[test]
    fn test_parent_change_without_rebind() {
        let engine = FakeEngine::new();
        let scope = Scope::root();
        let first = engine.map();
        scope.provide(Provision::map(first.clone()));

        let spec = engine
            .spec("layers/GraphicsLayer", AttachTarget::Layers)
            .with_options(LifecycleOptions::default().with_rebind_on_parent_change(false));
        let mut layer = ChildEntity::new(spec).with_spawner(engine.spawner());
        layer.mount(&scope, EntityProps::default());
        engine.run();

        let second = engine.map();
        scope.provide(Provision::map(second.clone()));
        engine.run();

        assert_eq!(first.layer_count(), 1);
        assert_eq!(second.layer_count(), 0);
        assert_eq!(engine.journal().constructs(), 1);

        layer.unmount();
        assert_eq!(first.layer_count(), 0);
    }

    /// Import failures leave the node unresolved with the error recorded
    #[test]
    fn test_resolution_failure() {
        init();
        let engine = FakeEngine::new();
        let scope = Scope::root();
        scope.provide(Provision::map(engine.map()));
        let spec = engine.failing_spec("layers/FeatureLayer", AttachTarget::Layers, "network down");
        let mut layer = ChildEntity::new(spec).with_spawner(engine.spawner());
        layer.mount(&scope, EntityProps::default());
        engine.run();

        assert_eq!(layer.phase(), Phase::Unresolved);
        assert!(matches!(
            layer.last_error().as_deref(),
            Some(BindError::Resolution { reason, .. }) if reason.contains("network down")
        ));
        assert_eq!(engine.journal().constructs(), 0);

        // re-rendering does not retry the import
        layer.update(EntityProps::default());
        engine.run();
        assert_eq!(engine.journal().resolves(), 1);
    }

    /// Unregistered modules fail with their own error
    #[test]
    fn test_unknown_module() {
        let engine = FakeEngine::new();
        let registry = ModuleRegistry::new();
        let mut legend = adapters::child::<Legend>(&registry).with_spawner(engine.spawner());
        legend.mount(&Scope::root(), Legend::new().into_props());
        engine.run();

        assert_eq!(legend.phase(), Phase::Unresolved);
        assert!(matches!(
            legend.last_error().as_deref(),
            Some(BindError::UnknownModule(name)) if name == "widgets/Legend"
        ));
    }

    /// Constructor failures freeze the node in `Constructing`
    #[test]
    fn test_construction_failure() {
        let engine = FakeEngine::new();
        let spec = engine.throwing_spec("layers/TileLayer", AttachTarget::Detached, "bad url");
        let mut layer = ChildEntity::new(spec).with_spawner(engine.spawner());
        layer.mount(&Scope::root(), EntityProps::default());
        engine.run();

        assert_eq!(layer.phase(), Phase::Constructing);
        assert!(layer.instance().is_none());
        assert!(matches!(
            layer.last_error().as_deref(),
            Some(BindError::Construction { reason, .. }) if reason.contains("bad url")
        ));

        layer.update(EntityProps::new(PropertyBindings::new().set("opacity", 1.0)));
        engine.run();
        assert_eq!(layer.phase(), Phase::Constructing);
        assert_eq!(layer.constructions(), 1);

        layer.unmount();
        assert_eq!(layer.phase(), Phase::Destroyed);
    }

    /// Property watches fire on changes and are removed before destroy
    #[test]
    fn test_watch_binding() {
        let engine = FakeEngine::new();
        let journal = engine.journal();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let callback: WatchCallback = {
            let seen = seen.clone();
            Arc::new(move |value: &serde_json::Value| seen.lock().unwrap().push(value.clone()))
        };
        let props = |visible: bool| {
            EntityProps::new(PropertyBindings::new().set("visible", visible))
                .watch("visible", Some(callback.clone()))
        };

        let mut layer = ChildEntity::new(engine.spec("layers/FeatureLayer", AttachTarget::Detached))
            .with_spawner(engine.spawner());
        layer.mount(&Scope::root(), props(true));
        engine.run();
        let id = object_id(layer.instance().unwrap().as_ref());
        assert_eq!(engine.object(id).unwrap().watcher_count(), 1);

        layer.update(props(false));
        assert_eq!(*seen.lock().unwrap(), vec![json!(false)]);

        layer.unmount();
        let calls = journal.for_object(id);
        let unwatch = calls.iter().position(|c| matches!(c, Call::Unwatch { .. }));
        let destroy = calls.iter().position(|c| matches!(c, Call::Destroy { .. }));
        assert!(unwatch.is_some());
        assert!(unwatch < destroy);
    }

    /// Adapter props go through the registry like any other module
    #[test]
    fn test_adapter_through_registry() {
        let engine = FakeEngine::new();
        let registry = registry_for(&engine, &[FeatureLayer::MODULE]);
        let map = engine.map();
        let scope = Scope::root();
        scope.provide(Provision::map(map.clone()));

        let mut layer = adapters::child::<FeatureLayer>(&registry).with_spawner(engine.spawner());
        let props = FeatureLayer::new()
            .url("https://services/parcels/0")
            .definition_expression("acres > 10")
            .popup_enabled(true);
        layer.mount(&scope, props.clone().into_props());
        engine.run();

        let instance = layer.instance().unwrap();
        assert_eq!(instance.property("definitionExpression"), Some(json!("acres > 10")));
        assert_eq!(map.layer_count(), 1);

        layer.update(props.opacity(0.25).into_props());
        assert_eq!(engine.journal().sets(), vec![("opacity".to_string(), json!(0.25))]);
    }

    /// A theme toggle is only visible inside the provider's subtree
    #[test]
    fn test_theme_scoping() {
        let root = Scope::root();
        let outside = root.child();
        let mut provider = ThemeProvider::new();
        provider.mount(&root, Theme::Light);
        let inside = provider.child_scope().unwrap().child();

        assert_eq!(inside.current().theme, Some(Theme::Light));
        assert_eq!(provider.toggle(), Theme::Dark);
        assert_eq!(inside.current().theme, Some(Theme::Dark));
        assert_eq!(outside.current().theme, None);

        provider.unmount();
        assert_eq!(inside.current().theme, None);
        assert_eq!(provider.phase(), Phase::Destroyed);
    }

    /// Options read from JSON fall back to defaults for missing keys
    #[test]
    fn test_lifecycle_options_from_json() {
        let options = LifecycleOptions::from_json(r#"{"identity_change": "ignore"}"#).unwrap();
        assert_eq!(options.identity_change, IdentityChangePolicy::Ignore);
        assert!(options.rebind_on_parent_change);
        assert!(!options.log_discarded_results);

        assert!(LifecycleOptions::from_json(r#"{"identity_change": "sometimes"}"#).is_err());
    }
}
