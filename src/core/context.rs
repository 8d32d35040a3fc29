//! Tree-scoped ambient context
//!
//! Provider nodes (views, maps, theme providers) publish a [`Provision`] into a
//! child [`Scope`]; every node mounted below reads the nearest provided value for
//! each field through [`Scope::current`]. Scopes are never global: a value is
//! only visible inside the subtree of the scope that provides it.
//!
//! Changes are pushed to subscribers of the providing scope and of every scope
//! below it, so leaf nodes can wait for a view to appear without polling.

use fxhash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use crate::core::theme::Theme;
use crate::traits::{MapHandle, ViewHandle};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

type Listener = Arc<dyn Fn() + Send + Sync>;

/// Values a provider publishes; `None` fields fall through to ancestors
#[derive(Clone, Default)]
pub struct Provision {
    pub view: Option<ViewHandle>,
    pub map: Option<MapHandle>,
    pub theme: Option<Theme>,
}

impl Provision {
    pub fn view(view: ViewHandle, map: Option<MapHandle>) -> Self {
        Self {
            view: Some(view),
            map,
            theme: None,
        }
    }

    pub fn map(map: MapHandle) -> Self {
        Self {
            map: Some(map),
            ..Default::default()
        }
    }

    pub fn theme(theme: Theme) -> Self {
        Self {
            theme: Some(theme),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for Provision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provision")
            .field("view", &self.view.as_ref().map(|v| v.declared_class().to_string()))
            .field("map", &self.map.as_ref().map(|m| m.declared_class().to_string()))
            .field("theme", &self.theme)
            .finish()
    }
}

/// Resolved view/map/theme seen by a consumer
#[derive(Clone, Default)]
pub struct AmbientContext {
    pub view: Option<ViewHandle>,
    pub map: Option<MapHandle>,
    pub theme: Option<Theme>,
}

impl AmbientContext {
    /// The map to attach layers to: the provided map, else the view's map
    pub fn effective_map(&self) -> Option<MapHandle> {
        self.map
            .clone()
            .or_else(|| self.view.as_ref().and_then(|view| view.map()))
    }

    pub fn is_empty(&self) -> bool {
        self.view.is_none() && self.map.is_none() && self.theme.is_none()
    }
}

impl std::fmt::Debug for AmbientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmbientContext")
            .field("view", &self.view.is_some())
            .field("map", &self.map.is_some())
            .field("theme", &self.theme)
            .finish()
    }
}

/// Explicit view/map props that take precedence over ambient ones
#[derive(Clone, Default)]
pub struct ParentOverride {
    pub view: Option<ViewHandle>,
    pub map: Option<MapHandle>,
}

impl ParentOverride {
    pub fn apply(&self, ambient: AmbientContext) -> AmbientContext {
        AmbientContext {
            view: self.view.clone().or(ambient.view),
            map: self.map.clone().or(ambient.map),
            theme: ambient.theme,
        }
    }
}

struct ScopeInner {
    id: u64,
    parent: Option<Scope>,
    provision: RwLock<Option<Provision>>,
    listeners: Mutex<FxHashMap<u64, Listener>>,
    children: Mutex<Vec<Weak<ScopeInner>>>,
    version: AtomicU64,
}

/// A position in the declarative tree that can provide and read context
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// A scope with no ancestors; reads yield the empty context
    pub fn root() -> Self {
        Self::with_parent(None)
    }

    /// A new scope nested below this one
    pub fn child(&self) -> Scope {
        let child = Self::with_parent(Some(self.clone()));
        if let Ok(mut children) = self.inner.children.lock() {
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        child
    }

    fn with_parent(parent: Option<Scope>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
                parent,
                provision: RwLock::new(None),
                listeners: Mutex::new(FxHashMap::default()),
                children: Mutex::new(Vec::new()),
                version: AtomicU64::new(0),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn parent(&self) -> Option<&Scope> {
        self.inner.parent.as_ref()
    }

    /// Number of provide/withdraw updates made on this scope
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::SeqCst)
    }

    /// Publishes values to this scope and its descendants
    pub fn provide(&self, provision: Provision) {
        log::debug!("scope {} provides {:?}", self.inner.id, provision);
        if let Ok(mut slot) = self.inner.provision.write() {
            *slot = Some(provision);
        }
        self.inner.version.fetch_add(1, Ordering::SeqCst);
        self.notify();
    }

    /// Removes this scope's provision; descendants fall back to ancestors
    pub fn withdraw(&self) {
        let had_value = match self.inner.provision.write() {
            Ok(mut slot) => slot.take().is_some(),
            Err(_) => false,
        };
        if had_value {
            log::debug!("scope {} withdraws its provision", self.inner.id);
            self.inner.version.fetch_add(1, Ordering::SeqCst);
            self.notify();
        }
    }

    /// This scope's own provision, ignoring ancestors
    pub fn provision(&self) -> Option<Provision> {
        self.inner.provision.read().ok().and_then(|p| p.clone())
    }

    /// Nearest provided value per field, walking up from this scope
    pub fn current(&self) -> AmbientContext {
        let mut context = AmbientContext::default();
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(provision) = current.provision() {
                if context.view.is_none() {
                    context.view = provision.view;
                }
                if context.map.is_none() {
                    context.map = provision.map;
                }
                if context.theme.is_none() {
                    context.theme = provision.theme;
                }
            }
            scope = current.parent();
        }
        context
    }

    /// Calls `listener` whenever this scope or an ancestor changes its provision.
    ///
    /// The listener stays registered until the returned [`Subscription`] drops.
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        let key = NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.insert(key, Arc::new(listener));
        }
        Subscription {
            scope: Arc::downgrade(&self.inner),
            key,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }

    fn notify(&self) {
        let mut listeners = Vec::new();
        collect_listeners(&self.inner, &mut listeners);
        // listeners run without any scope lock held
        for listener in listeners {
            listener();
        }
    }
}

fn collect_listeners(scope: &Arc<ScopeInner>, out: &mut Vec<Listener>) {
    if let Ok(listeners) = scope.listeners.lock() {
        out.extend(listeners.values().cloned());
    }
    let children: Vec<Arc<ScopeInner>> = scope
        .children
        .lock()
        .map(|c| c.iter().filter_map(Weak::upgrade).collect())
        .unwrap_or_default();
    for child in &children {
        collect_listeners(child, out);
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("parent", &self.parent().map(|p| p.id()))
            .field("version", &self.version())
            .finish()
    }
}

/// Keeps a scope listener registered; dropping it unsubscribes
pub struct Subscription {
    scope: Weak<ScopeInner>,
    key: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(scope) = self.scope.upgrade() {
            if let Ok(mut listeners) = scope.listeners.lock() {
                listeners.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_root_reads_empty_context() {
        let root = Scope::root();
        let context = root.current();
        assert!(context.is_empty());
        assert!(context.effective_map().is_none());
    }

    #[test]
    fn test_nearest_provider_wins_per_field() {
        let root = Scope::root();
        root.provide(Provision::theme(Theme::Dark));
        let middle = root.child();
        middle.provide(Provision::theme(Theme::Light));
        let leaf = middle.child().child();

        assert_eq!(leaf.current().theme, Some(Theme::Light));

        middle.withdraw();
        assert_eq!(leaf.current().theme, Some(Theme::Dark));
    }

    #[test]
    fn test_descendant_listeners_fire_on_ancestor_change() {
        let root = Scope::root();
        let leaf = root.child().child();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let subscription = leaf.subscribe(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        root.provide(Provision::theme(Theme::Dark));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(root.version(), 1);

        drop(subscription);
        assert_eq!(leaf.listener_count(), 0);
        root.provide(Provision::theme(Theme::Light));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_withdraw_without_value_is_silent() {
        let root = Scope::root();
        root.withdraw();
        assert_eq!(root.version(), 0);
    }

    #[test]
    fn test_sibling_scopes_are_isolated() {
        let root = Scope::root();
        let left = root.child();
        let right = root.child();
        left.provide(Provision::theme(Theme::Dark));

        assert_eq!(left.current().theme, Some(Theme::Dark));
        assert_eq!(right.current().theme, None);
    }
}
