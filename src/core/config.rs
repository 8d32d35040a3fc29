//! Configuration values for entities and their lifecycle
//!
//! [`EntityConfig`] is the snapshot handed to an engine constructor. It only ever
//! contains fields that were actually given a value: absent props are skipped by
//! the builder instead of being inserted and cleaned up afterwards.
//!
//! [`LifecycleOptions`] tunes how a node reacts to reconfiguration and can be
//! loaded from JSON alongside the rest of an application's settings.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::Result;

/// Present-only field map passed to constructors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityConfig {
    fields: BTreeMap<String, Value>,
}

impl EntityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> EntityConfigBuilder {
        EntityConfigBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Copy containing only the named fields that are present
    pub fn restricted_to<S: AsRef<str>>(&self, names: &[S]) -> EntityConfig {
        let fields = names
            .iter()
            .filter_map(|name| {
                let name = name.as_ref();
                self.fields.get(name).map(|v| (name.to_string(), v.clone()))
            })
            .collect();
        EntityConfig { fields }
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }
}

/// Builder that never records an absent field
#[derive(Debug, Default)]
pub struct EntityConfigBuilder {
    fields: BTreeMap<String, Value>,
}

impl EntityConfigBuilder {
    /// Sets a field
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Sets a field only when a value is given
    pub fn field_opt<V: Into<Value>>(mut self, name: impl Into<String>, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.fields.insert(name.into(), value.into());
        }
        self
    }

    /// Sets a field from any serializable value
    pub fn serialized<T: Serialize>(mut self, name: impl Into<String>, value: &T) -> Result<Self> {
        self.fields.insert(name.into(), serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn build(self) -> EntityConfig {
        EntityConfig {
            fields: self.fields,
        }
    }
}

/// What to do when a constructor-only field changes after construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityChangePolicy {
    /// Tear the instance down and build a new one from the new config
    #[default]
    Recreate,
    /// Keep the existing instance and log the skipped change
    Ignore,
}

/// Per-node lifecycle tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleOptions {
    pub identity_change: IdentityChangePolicy,
    /// Child entities follow their parent when the ambient view/map is replaced
    pub rebind_on_parent_change: bool,
    /// Log results discarded after unmount at info level instead of debug
    pub log_discarded_results: bool,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            identity_change: IdentityChangePolicy::Recreate,
            rebind_on_parent_change: true,
            log_discarded_results: false,
        }
    }
}

impl LifecycleOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_identity_change(mut self, policy: IdentityChangePolicy) -> Self {
        self.identity_change = policy;
        self
    }

    pub fn with_rebind_on_parent_change(mut self, enabled: bool) -> Self {
        self.rebind_on_parent_change = enabled;
        self
    }

    pub fn with_logged_discards(mut self, enabled: bool) -> Self {
        self.log_discarded_results = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_skips_absent_fields() {
        let title: Option<&str> = None;
        let config = EntityConfig::builder()
            .field("opacity", 0.5)
            .field_opt("title", title)
            .field_opt("visible", Some(true))
            .build();

        assert_eq!(config.len(), 2);
        assert_eq!(config.get("opacity"), Some(&json!(0.5)));
        assert_eq!(config.get("visible"), Some(&json!(true)));
        assert!(!config.contains("title"));
    }

    #[test]
    fn test_serialized_field() {
        #[derive(Serialize)]
        struct Extent {
            xmin: f64,
            ymin: f64,
        }

        let config = EntityConfig::builder()
            .serialized("extent", &Extent { xmin: 1.0, ymin: 2.0 })
            .unwrap()
            .build();
        assert_eq!(config.get("extent"), Some(&json!({"xmin": 1.0, "ymin": 2.0})));
    }

    #[test]
    fn test_restricted_to() {
        let config = EntityConfig::builder()
            .field("url", "https://example.com/layer")
            .field("opacity", 1.0)
            .build();
        let ctor_only = config.restricted_to(&["url", "portal_item"]);

        assert_eq!(ctor_only.len(), 1);
        assert!(ctor_only.contains("url"));
    }

    #[test]
    fn test_lifecycle_options_from_json() {
        let options = LifecycleOptions::from_json(r#"{"identity_change": "ignore"}"#).unwrap();
        assert_eq!(options.identity_change, IdentityChangePolicy::Ignore);
        assert!(options.rebind_on_parent_change);
        assert!(!options.log_discarded_results);

        assert!(LifecycleOptions::from_json("{not json").is_err());
    }
}
