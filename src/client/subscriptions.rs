//! Subscription registry
//!
//! Holds the desired state for every group. The wire protocol is a projection
//! of this registry: replaying it after a reconnect rebuilds server state.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::websocket::{ClientMessage, Resolution};

/// Desired subscription for one group of series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Caller-chosen identifier for the chart/widget
    pub group_id: String,
    /// Start of the backfill window
    pub since: String,
    /// Sample density
    pub res: Resolution,
    /// Series keys in insertion order
    pub series: IndexSet<String>,
}

impl SubscriptionConfig {
    /// Create an empty subscription for a group
    pub fn new(group_id: impl Into<String>, res: Resolution, since: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            since: since.into(),
            res,
            series: IndexSet::new(),
        }
    }

    /// Builder method: add one series key
    pub fn series_key(mut self, key: impl Into<String>) -> Self {
        self.series.insert(key.into());
        self
    }

    /// Builder method: add several series keys
    pub fn series<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.series.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Series keys as an owned list, in insertion order
    pub fn series_list(&self) -> Vec<String> {
        self.series.iter().cloned().collect()
    }

    /// Wire `subscribe` message carrying the full series list
    pub fn to_subscribe(&self) -> ClientMessage {
        ClientMessage::Subscribe {
            group_id: self.group_id.clone(),
            res: self.res,
            since: self.since.clone(),
            series: self.series_list(),
        }
    }
}

/// What a partial or full unsubscribe removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    /// Keys actually removed from the group
    pub removed: Vec<String>,
    /// Whether the whole group entry is gone
    pub group_dropped: bool,
}

/// Desired state for all groups, in registration order
#[derive(Debug, Default, Clone)]
pub struct SubscriptionRegistry {
    groups: IndexMap<String, SubscriptionConfig>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `config` into the stored state for its group
    ///
    /// Returns the resulting full subscription when anything changed
    /// (resolution, `since`, or at least one new series key) and `None` for
    /// a no-op.
    pub fn upsert(&mut self, config: SubscriptionConfig) -> Option<SubscriptionConfig> {
        match self.groups.get_mut(&config.group_id) {
            Some(existing) => {
                let added: Vec<String> = config
                    .series
                    .iter()
                    .filter(|key| !existing.series.contains(*key))
                    .cloned()
                    .collect();

                let changed =
                    existing.res != config.res || existing.since != config.since || !added.is_empty();
                if !changed {
                    return None;
                }

                existing.res = config.res;
                existing.since = config.since;
                existing.series.extend(added);
                Some(existing.clone())
            }
            None => {
                if config.series.is_empty() {
                    return None;
                }
                self.groups.insert(config.group_id.clone(), config.clone());
                Some(config)
            }
        }
    }

    /// Remove a whole group, returning its last state
    pub fn remove_group(&mut self, group_id: &str) -> Option<SubscriptionConfig> {
        self.groups.shift_remove(group_id)
    }

    /// Remove the listed keys from a group
    ///
    /// The group entry is deleted once its series set is empty. Returns `None`
    /// when the group is unknown.
    pub fn remove_series<S: AsRef<str>>(&mut self, group_id: &str, keys: &[S]) -> Option<Removal> {
        let entry = self.groups.get_mut(group_id)?;

        let removed: Vec<String> = keys
            .iter()
            .filter_map(|key| entry.series.shift_take(key.as_ref()))
            .collect();

        let group_dropped = entry.series.is_empty();
        if group_dropped {
            self.groups.shift_remove(group_id);
        }

        Some(Removal {
            removed,
            group_dropped,
        })
    }

    pub fn get(&self, group_id: &str) -> Option<&SubscriptionConfig> {
        self.groups.get(group_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubscriptionConfig> {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(group: &str, series: &[&str]) -> SubscriptionConfig {
        SubscriptionConfig::new(group, Resolution::Hi, "0").series(series.iter().copied())
    }

    #[test]
    fn test_first_subscribe_is_a_change() {
        let mut registry = SubscriptionRegistry::new();
        let result = registry.upsert(config("g", &["cpu", "mem"])).unwrap();
        assert_eq!(result.series_list(), vec!["cpu", "mem"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_identical_subscribe_is_noop() {
        let mut registry = SubscriptionRegistry::new();
        assert!(registry.upsert(config("g", &["cpu"])).is_some());
        assert!(registry.upsert(config("g", &["cpu"])).is_none());
    }

    #[test]
    fn test_subset_subscribe_is_noop() {
        let mut registry = SubscriptionRegistry::new();
        registry.upsert(config("g", &["cpu", "mem"]));
        assert!(registry.upsert(config("g", &["mem"])).is_none());
        assert_eq!(registry.get("g").unwrap().series_list(), vec!["cpu", "mem"]);
    }

    #[test]
    fn test_new_series_merges_into_group() {
        let mut registry = SubscriptionRegistry::new();
        registry.upsert(config("g", &["cpu"]));
        let merged = registry.upsert(config("g", &["mem", "cpu"])).unwrap();
        assert_eq!(merged.series_list(), vec!["cpu", "mem"]);
    }

    #[test]
    fn test_resolution_or_since_change_is_detected() {
        let mut registry = SubscriptionRegistry::new();
        registry.upsert(config("g", &["cpu"]));

        let lo = SubscriptionConfig::new("g", Resolution::Lo, "0").series_key("cpu");
        assert_eq!(registry.upsert(lo).unwrap().res, Resolution::Lo);

        let later = SubscriptionConfig::new("g", Resolution::Lo, "1699000000000").series_key("cpu");
        assert_eq!(registry.upsert(later).unwrap().since, "1699000000000");
    }

    #[test]
    fn test_empty_new_group_is_not_stored() {
        let mut registry = SubscriptionRegistry::new();
        assert!(registry.upsert(config("g", &[])).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_partial_removal_keeps_remainder() {
        let mut registry = SubscriptionRegistry::new();
        registry.upsert(config("g", &["a", "b", "c"]));

        let removal = registry.remove_series("g", &["b"]).unwrap();
        assert_eq!(removal.removed, vec!["b"]);
        assert!(!removal.group_dropped);
        assert_eq!(registry.get("g").unwrap().series_list(), vec!["a", "c"]);
    }

    #[test]
    fn test_removing_last_series_drops_group() {
        let mut registry = SubscriptionRegistry::new();
        registry.upsert(config("g", &["a", "b"]));

        let removal = registry.remove_series("g", &["a", "b", "zzz"]).unwrap();
        assert_eq!(removal.removed, vec!["a", "b"]);
        assert!(removal.group_dropped);
        assert!(registry.get("g").is_none());
    }

    #[test]
    fn test_remove_unknown_group() {
        let mut registry = SubscriptionRegistry::new();
        assert!(registry.remove_series("nope", &["a"]).is_none());
        assert!(registry.remove_group("nope").is_none());
    }

    #[test]
    fn test_iteration_follows_registration_order() {
        let mut registry = SubscriptionRegistry::new();
        registry.upsert(config("b", &["x"]));
        registry.upsert(config("a", &["y"]));
        registry.upsert(config("c", &["z"]));
        registry.remove_group("a");

        let order: Vec<&str> = registry.iter().map(|c| c.group_id.as_str()).collect();
        assert_eq!(order, vec!["b", "c"]);
    }
}
