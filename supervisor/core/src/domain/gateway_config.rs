// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GatewayConfigError {
    #[error("gateway configuration for '{0}' is not a JSON array")]
    NotAnArray(String),
}

/// Append-only mapping from gateway id to an ordered list of opaque JSON
/// configuration fragments.
///
/// Fragments accumulate during a container's configuration phase and are
/// frozen once activation starts. Appending is transactional per id: a failed
/// append leaves the destination bucket exactly as it was before the call.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfiguration {
    buckets: HashMap<String, Vec<Value>>,
}

impl GatewayConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a single fragment to the given gateway's bucket.
    pub fn append_fragment(&mut self, id: &str, fragment: Value) {
        self.buckets.entry(id.to_string()).or_default().push(fragment);
    }

    /// Append every element of a JSON array to the given gateway's bucket.
    ///
    /// Rejects non-array values before any mutation takes place.
    pub fn append_array(&mut self, id: &str, array: &Value) -> Result<(), GatewayConfigError> {
        let elements = array
            .as_array()
            .ok_or_else(|| GatewayConfigError::NotAnArray(id.to_string()))?;

        let bucket = self.buckets.entry(id.to_string()).or_default();
        bucket.extend(elements.iter().cloned());
        Ok(())
    }

    /// Merge another configuration into this one, bucket by bucket.
    ///
    /// Element order within each bucket is preserved: the other
    /// configuration's fragments follow this one's.
    pub fn append(&mut self, other: &GatewayConfiguration) {
        for (id, fragments) in &other.buckets {
            self.buckets
                .entry(id.clone())
                .or_default()
                .extend(fragments.iter().cloned());
        }
    }

    /// Deep copy of the fragments for a gateway id. Callers may mutate the
    /// returned values freely.
    pub fn get(&self, id: &str) -> Option<Vec<Value>> {
        self.buckets.get(id).cloned()
    }

    /// All gateway ids with at least one fragment, sorted for deterministic
    /// iteration.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.buckets.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn append_fragment_accumulates_in_order() {
        let mut config = GatewayConfiguration::new();
        config.append_fragment("dbus", json!({"a": 1}));
        config.append_fragment("dbus", json!({"b": 2}));

        let fragments = config.get("dbus").unwrap();
        assert_eq!(fragments, vec![json!({"a": 1}), json!({"b": 2})]);
    }

    #[test]
    fn append_array_extends_bucket() {
        let mut config = GatewayConfiguration::new();
        config.append_fragment("file", json!({"first": true}));
        config
            .append_array("file", &json!([{"second": true}, {"third": true}]))
            .unwrap();

        let fragments = config.get("file").unwrap();
        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0], json!({"first": true}));
        assert_eq!(fragments[2], json!({"third": true}));
    }

    #[test]
    fn append_array_rejects_non_array_without_mutation() {
        let mut config = GatewayConfiguration::new();
        config.append_fragment("file", json!({"first": true}));

        let err = config.append_array("file", &json!({"not": "array"})).unwrap_err();
        assert_eq!(err, GatewayConfigError::NotAnArray("file".to_string()));
        assert_eq!(config.get("file").unwrap().len(), 1);
    }

    #[test]
    fn merge_preserves_per_bucket_order() {
        let mut a = GatewayConfiguration::new();
        a.append_fragment("dbus", json!(1));
        a.append_fragment("file", json!("x"));

        let mut b = GatewayConfiguration::new();
        b.append_fragment("dbus", json!(2));
        b.append_fragment("network", json!(true));

        let expected_dbus: Vec<Value> = a
            .get("dbus")
            .unwrap()
            .into_iter()
            .chain(b.get("dbus").unwrap())
            .collect();

        a.append(&b);

        assert_eq!(a.get("dbus").unwrap(), expected_dbus);
        assert_eq!(a.get("file").unwrap(), vec![json!("x")]);
        assert_eq!(a.get("network").unwrap(), vec![json!(true)]);
        assert_eq!(a.ids(), vec!["dbus", "file", "network"]);
    }

    #[test]
    fn get_returns_deep_copy() {
        let mut config = GatewayConfiguration::new();
        config.append_fragment("env", json!({"name": "A"}));

        let mut copy = config.get("env").unwrap();
        copy[0] = json!({"name": "B"});

        assert_eq!(config.get("env").unwrap()[0], json!({"name": "A"}));
    }

    #[test]
    fn empty_reports_correctly() {
        let mut config = GatewayConfiguration::new();
        assert!(config.is_empty());
        config.append_fragment("dbus", json!({}));
        assert!(!config.is_empty());
    }
}
