//! Property synchronisation
//!
//! Turns "this prop changed" into "set this field" on a long-lived engine object.
//! Each binding is `{name, value, condition}`; a binding is pushed when its
//! condition holds, its value is present, and the value differs from the last one
//! pushed (or the one the instance was constructed with). Fields are independent,
//! so the order of assignments does not matter.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::{core::config::EntityConfig, traits::PropertyTarget, BindError};

/// One declared field
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyBinding {
    pub name: String,
    pub value: Option<Value>,
    pub condition: bool,
}

impl PropertyBinding {
    fn is_applicable(&self) -> bool {
        self.condition && self.value.is_some()
    }
}

/// Snapshot of every declared field, recomputed on each render
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyBindings {
    entries: Vec<PropertyBinding>,
}

impl PropertyBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a field whose value may be absent
    pub fn bind<V: Into<Value>>(self, name: impl Into<String>, value: Option<V>) -> Self {
        self.bind_when(name, value, true)
    }

    /// Declares a field that is only pushed while `condition` holds
    pub fn bind_when<V: Into<Value>>(
        mut self,
        name: impl Into<String>,
        value: Option<V>,
        condition: bool,
    ) -> Self {
        let binding = PropertyBinding {
            name: name.into(),
            value: value.map(Into::into),
            condition,
        };
        match self.entries.iter_mut().find(|b| b.name == binding.name) {
            Some(existing) => *existing = binding,
            None => self.entries.push(binding),
        }
        self
    }

    /// Declares a field with a present value
    pub fn set(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bind(name, Some(value))
    }

    pub fn get(&self, name: &str) -> Option<&PropertyBinding> {
        self.entries.iter().find(|b| b.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyBinding> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Present values, used as the constructor config
    pub fn snapshot(&self) -> EntityConfig {
        let mut config = EntityConfig::new();
        for binding in &self.entries {
            if let Some(value) = &binding.value {
                config.insert(binding.name.clone(), value.clone());
            }
        }
        config
    }

    /// Bindings minus the named fields
    pub fn without<S: AsRef<str>>(&self, names: &[S]) -> PropertyBindings {
        PropertyBindings {
            entries: self
                .entries
                .iter()
                .filter(|b| !names.iter().any(|n| n.as_ref() == b.name))
                .cloned()
                .collect(),
        }
    }
}

/// Result of one synchronisation pass
#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub assigned: Vec<String>,
    pub rejected: Vec<BindError>,
}

impl SyncOutcome {
    pub fn is_noop(&self) -> bool {
        self.assigned.is_empty() && self.rejected.is_empty()
    }
}

/// Remembers what was last pushed to one instance
#[derive(Debug, Default)]
pub struct PropertySynchronizer {
    applied: BTreeMap<String, Value>,
}

impl PropertySynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the values an instance was constructed with
    pub fn seed(&mut self, config: &EntityConfig) {
        self.applied = config
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
    }

    /// Forgets everything; call when the instance goes away
    pub fn reset(&mut self) {
        self.applied.clear();
    }

    /// Pushes every changed, applicable binding onto `target`.
    ///
    /// No target means the instance does not exist yet and nothing happens.
    /// A rejected assignment is logged and not retried until the value changes.
    pub fn sync<T>(&mut self, target: Option<&T>, bindings: &PropertyBindings) -> SyncOutcome
    where
        T: PropertyTarget + ?Sized,
    {
        let mut outcome = SyncOutcome::default();
        let Some(target) = target else {
            return outcome;
        };

        for binding in bindings.iter().filter(|b| b.is_applicable()) {
            let Some(value) = &binding.value else {
                continue;
            };
            if self.applied.get(&binding.name) == Some(value) {
                continue;
            }
            match target.set_property(&binding.name, value.clone()) {
                Ok(()) => outcome.assigned.push(binding.name.clone()),
                Err(error) => {
                    let error = BindError::Property {
                        field: binding.name.clone(),
                        reason: format!("{:#}", error),
                    };
                    log::warn!("{}", error);
                    outcome.rejected.push(error);
                }
            }
            self.applied.insert(binding.name.clone(), value.clone());
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Fields {
        writes: Mutex<Vec<(String, Value)>>,
    }

    impl PropertyTarget for Fields {
        fn set_property(&self, name: &str, value: Value) -> anyhow::Result<()> {
            if name == "readonly" {
                anyhow::bail!("field is read-only");
            }
            self.writes.lock().unwrap().push((name.to_string(), value));
            Ok(())
        }

        fn property(&self, name: &str) -> Option<Value> {
            self.writes
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
        }
    }

    #[test]
    fn test_no_target_is_noop() {
        let mut sync = PropertySynchronizer::new();
        let bindings = PropertyBindings::new().set("opacity", 0.5);
        let outcome = sync.sync::<Fields>(None, &bindings);
        assert!(outcome.is_noop());
    }

    #[test]
    fn test_second_pass_with_same_bindings_is_noop() {
        let target = Fields::default();
        let mut sync = PropertySynchronizer::new();
        let bindings = PropertyBindings::new()
            .set("opacity", 0.5)
            .set("visible", true);

        let first = sync.sync(Some(&target), &bindings);
        let second = sync.sync(Some(&target), &bindings);

        assert_eq!(first.assigned.len(), 2);
        assert!(second.is_noop());
        assert_eq!(target.writes.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_seeded_values_are_not_reassigned() {
        let target = Fields::default();
        let mut sync = PropertySynchronizer::new();
        let initial = PropertyBindings::new().set("visible", true).set("opacity", 1.0);
        sync.seed(&initial.snapshot());

        let changed = PropertyBindings::new().set("visible", true).set("opacity", 0.5);
        let outcome = sync.sync(Some(&target), &changed);

        assert_eq!(outcome.assigned, vec!["opacity".to_string()]);
        assert_eq!(
            *target.writes.lock().unwrap(),
            vec![("opacity".to_string(), json!(0.5))]
        );
    }

    #[test]
    fn test_condition_and_absent_values_are_skipped() {
        let target = Fields::default();
        let mut sync = PropertySynchronizer::new();
        let absent: Option<f64> = None;
        let bindings = PropertyBindings::new()
            .bind("scale", absent)
            .bind_when("zoom", Some(4), false);

        assert!(sync.sync(Some(&target), &bindings).is_noop());

        // condition flips with the same value: now pushed
        let bindings = PropertyBindings::new().bind_when("zoom", Some(4), true);
        assert_eq!(sync.sync(Some(&target), &bindings).assigned, vec!["zoom".to_string()]);
        assert_eq!(target.property("zoom"), Some(json!(4)));
    }

    #[test]
    fn test_rejected_assignment_is_reported_once() {
        let target = Fields::default();
        let mut sync = PropertySynchronizer::new();
        let bindings = PropertyBindings::new().set("readonly", 1);

        let first = sync.sync(Some(&target), &bindings);
        assert_eq!(first.rejected.len(), 1);
        assert!(sync.sync(Some(&target), &bindings).is_noop());
    }

    #[test]
    fn test_rebinding_a_name_replaces_it() {
        let bindings = PropertyBindings::new().set("title", "a").set("title", "b");
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings.get("title").unwrap().value, Some(json!("b")));
        assert_eq!(bindings.without(&["title"]).len(), 0);
        assert_eq!(bindings.snapshot().get("title"), Some(&json!("b")));
    }
}
