//! Event and property-watch binding
//!
//! Callback props are compared by identity. Whenever any of them changes
//! (including becoming absent) every registration made from the previous list
//! is removed before the new list is registered, so an event name never has more
//! than one live listener on an instance.

use std::sync::Arc;

use crate::traits::{same_object, EngineEvent, EventEmitting, ListenerHandle, Observable};

pub use crate::traits::{EventHandler, WatchCallback};

/// `{eventName, handler|absent}`
#[derive(Clone)]
pub struct EventBinding {
    pub event: String,
    pub handler: Option<EventHandler>,
}

impl EventBinding {
    pub fn new(event: impl Into<String>, handler: Option<EventHandler>) -> Self {
        Self {
            event: event.into(),
            handler,
        }
    }

    pub fn handler<F>(event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        Self::new(event, Some(Arc::new(handler)))
    }

    pub fn unset(event: impl Into<String>) -> Self {
        Self::new(event, None)
    }
}

impl std::fmt::Debug for EventBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBinding")
            .field("event", &self.event)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// `{propertyName, callback|absent}`
#[derive(Clone)]
pub struct WatchBinding {
    pub property: String,
    pub callback: Option<WatchCallback>,
}

impl WatchBinding {
    pub fn new(property: impl Into<String>, callback: Option<WatchCallback>) -> Self {
        Self {
            property: property.into(),
            callback,
        }
    }

    pub fn callback<F>(property: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        Self::new(property, Some(Arc::new(callback)))
    }
}

impl std::fmt::Debug for WatchBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchBinding")
            .field("property", &self.property)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

struct Registration {
    key: String,
    handle: Box<dyn ListenerHandle>,
}

/// Registrations made from one callback list on one target
struct ListenerSet<H: ?Sized> {
    target: Option<usize>,
    signature: Vec<(String, Option<Arc<H>>)>,
    active: Vec<Registration>,
}

impl<H: ?Sized> ListenerSet<H> {
    fn new() -> Self {
        Self {
            target: None,
            signature: Vec::new(),
            active: Vec::new(),
        }
    }

    fn unchanged(&self, target: Option<usize>, desired: &[(String, Option<Arc<H>>)]) -> bool {
        self.target == target
            && self.signature.len() == desired.len()
            && self
                .signature
                .iter()
                .zip(desired)
                .all(|((a_key, a), (b_key, b))| {
                    a_key == b_key
                        && match (a, b) {
                            (Some(a), Some(b)) => same_object(a, b),
                            (None, None) => true,
                            _ => false,
                        }
                })
    }

    /// Returns true when registrations were replaced
    fn rebind(
        &mut self,
        target: Option<usize>,
        desired: Vec<(String, Option<Arc<H>>)>,
        mut subscribe: impl FnMut(&str, Arc<H>) -> Box<dyn ListenerHandle>,
    ) -> bool {
        if self.unchanged(target, &desired) {
            return false;
        }
        self.clear();
        if target.is_some() {
            for (key, callback) in &desired {
                if let Some(callback) = callback {
                    let handle = subscribe(key, callback.clone());
                    self.active.push(Registration {
                        key: key.clone(),
                        handle,
                    });
                }
            }
            self.signature = desired;
        }
        self.target = target;
        true
    }

    fn clear(&mut self) {
        for registration in self.active.drain(..) {
            registration.handle.remove();
        }
        self.signature.clear();
        self.target = None;
    }

    fn is_bound(&self, key: &str) -> bool {
        self.active.iter().any(|r| r.key == key)
    }
}

/// Last entry per key wins, first-seen order is kept
fn dedup<H: ?Sized>(pairs: impl Iterator<Item = (String, Option<Arc<H>>)>) -> Vec<(String, Option<Arc<H>>)> {
    let mut out: Vec<(String, Option<Arc<H>>)> = Vec::new();
    for (key, callback) in pairs {
        match out.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = callback,
            None => out.push((key, callback)),
        }
    }
    out
}

fn target_key<T: ?Sized>(target: Option<&T>) -> Option<usize> {
    target.map(|t| t as *const T as *const () as usize)
}

/// Keeps `on(...)` registrations in step with handler props
pub struct EventBinder {
    listeners: ListenerSet<dyn Fn(&EngineEvent) + Send + Sync>,
}

impl EventBinder {
    pub fn new() -> Self {
        Self {
            listeners: ListenerSet::new(),
        }
    }

    /// (Re)registers handlers; a no-op when neither target nor handlers changed.
    pub fn bind<T>(&mut self, target: Option<&T>, bindings: &[EventBinding]) -> bool
    where
        T: EventEmitting + ?Sized,
    {
        let desired = dedup(bindings.iter().map(|b| (b.event.clone(), b.handler.clone())));
        let rebound = self.listeners.rebind(target_key(target), desired, |event, handler| {
            match target {
                Some(target) => target.on(event, handler),
                None => Box::new(|| {}),
            }
        });
        if rebound {
            log::debug!("event listeners rebound: {} active", self.active());
        }
        rebound
    }

    /// Removes every registration
    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    pub fn active(&self) -> usize {
        self.listeners.active.len()
    }

    pub fn is_bound(&self, event: &str) -> bool {
        self.listeners.is_bound(event)
    }
}

impl Default for EventBinder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventBinder {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Keeps `watch(...)` registrations in step with callback props
pub struct WatchBinder {
    listeners: ListenerSet<dyn Fn(&serde_json::Value) + Send + Sync>,
}

impl WatchBinder {
    pub fn new() -> Self {
        Self {
            listeners: ListenerSet::new(),
        }
    }

    pub fn bind<T>(&mut self, target: Option<&T>, bindings: &[WatchBinding]) -> bool
    where
        T: Observable + ?Sized,
    {
        let desired = dedup(bindings.iter().map(|b| (b.property.clone(), b.callback.clone())));
        self.listeners
            .rebind(target_key(target), desired, |property, callback| match target {
                Some(target) => target.watch(property, callback),
                None => Box::new(|| {}),
            })
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    pub fn active(&self) -> usize {
        self.listeners.active.len()
    }
}

impl Default for WatchBinder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WatchBinder {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records on/off calls and the number of live listeners per event
    #[derive(Default)]
    struct Emitter {
        log: Arc<Mutex<Vec<String>>>,
        live: Arc<Mutex<Vec<String>>>,
    }

    impl Emitter {
        fn live_for(&self, event: &str) -> usize {
            self.live.lock().unwrap().iter().filter(|e| *e == event).count()
        }
    }

    impl EventEmitting for Emitter {
        fn on(&self, event: &str, _handler: EventHandler) -> Box<dyn ListenerHandle> {
            self.log.lock().unwrap().push(format!("on:{}", event));
            self.live.lock().unwrap().push(event.to_string());
            let log = self.log.clone();
            let live = self.live.clone();
            let event = event.to_string();
            Box::new(move || {
                log.lock().unwrap().push(format!("off:{}", event));
                let mut live = live.lock().unwrap();
                if let Some(pos) = live.iter().position(|e| *e == event) {
                    live.remove(pos);
                }
            })
        }
    }

    fn handler() -> EventHandler {
        Arc::new(|_event: &EngineEvent| {})
    }

    #[test]
    fn test_no_target_registers_nothing() {
        let mut binder = EventBinder::new();
        binder.bind::<Emitter>(None, &[EventBinding::new("click", Some(handler()))]);
        assert_eq!(binder.active(), 0);
    }

    #[test]
    fn test_same_handlers_do_not_rebind() {
        let emitter = Emitter::default();
        let mut binder = EventBinder::new();
        let h = handler();

        assert!(binder.bind(Some(&emitter), &[EventBinding::new("click", Some(h.clone()))]));
        assert!(!binder.bind(Some(&emitter), &[EventBinding::new("click", Some(h))]));
        assert_eq!(emitter.log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_handler_sequence_keeps_at_most_one_listener() {
        let emitter = Emitter::default();
        let mut binder = EventBinder::new();

        for step in [Some(handler()), Some(handler()), None, Some(handler())] {
            binder.bind(Some(&emitter), &[EventBinding::new("click", step)]);
            assert!(emitter.live_for("click") <= 1);
        }

        assert_eq!(
            *emitter.log.lock().unwrap(),
            vec!["on:click", "off:click", "on:click", "off:click", "on:click"]
        );
        assert!(binder.is_bound("click"));

        binder.clear();
        assert_eq!(emitter.live_for("click"), 0);
    }

    #[test]
    fn test_duplicate_event_names_collapse() {
        let emitter = Emitter::default();
        let mut binder = EventBinder::new();
        binder.bind(
            Some(&emitter),
            &[
                EventBinding::new("click", Some(handler())),
                EventBinding::new("click", Some(handler())),
            ],
        );
        assert_eq!(binder.active(), 1);
    }

    #[test]
    fn test_drop_unregisters() {
        let emitter = Emitter::default();
        {
            let mut binder = EventBinder::new();
            binder.bind(Some(&emitter), &[EventBinding::handler("pointer-move", |_| {})]);
            assert_eq!(emitter.live_for("pointer-move"), 1);
        }
        assert_eq!(emitter.live_for("pointer-move"), 0);
    }
}
