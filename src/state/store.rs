//! Notified-state: per-resource delivery history, encoded into two
//! annotations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::resource::Resource;
use crate::subscription::AnnotationPrefix;

use super::key::StateKey;

const MAX_NOTIFIED_STATE_ENTRIES: usize = 100;

/// A `(service, recipient)` pair, used as the key into `ServiceState`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ServiceKey {
    service: String,
    recipient: String,
}

impl std::fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.service, self.recipient)
    }
}

/// Delivery history materialised from a resource's annotations; mutated
/// in-process during reconciliation, then persisted back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    notified: BTreeMap<String, i64>,
    service: BTreeMap<String, i64>,
}

/// Minimal shape of a trigger's condition result needed to compute a state
/// key; mirrors `ConditionResult` without importing the evaluator, so the
/// state module has no dependency on `expr`/`config`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionIdentity {
    pub condition_key: String,
    pub once_per: String,
}

impl State {
    /// Reads `notified.{prefix}` and `notified.{prefix}/service` off
    /// `resource`. Missing or unparsable annotations yield empty maps (never
    /// an error): a resource with no prior history is indistinguishable from
    /// one whose state annotation was wiped.
    #[must_use]
    pub fn from_resource(resource: &Resource, prefix: &AnnotationPrefix) -> Self {
        let notified = resource
            .annotations
            .get(&prefix.notified_key())
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();
        let service = resource
            .annotations
            .get(&prefix.notified_service_key())
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();
        Self { notified, service }
    }

    #[must_use]
    pub fn is_notified(&self, trigger: &str, cond: &ConditionIdentity, service: &str, recipient: &str) -> bool {
        let key = StateKey::new(&cond.once_per, trigger, &cond.condition_key, service, recipient);
        self.notified.contains_key(&key.encode())
    }

    /// Implements the `SetAlreadyNotified` contract: returns whether the map
    /// actually changed. A `once_per`-tagged entry is never removed once set
    /// — a later `false` call is a no-op that still reports "unchanged".
    pub fn set_already_notified(
        &mut self,
        trigger: &str,
        cond: &ConditionIdentity,
        service: &str,
        recipient: &str,
        is_notified: bool,
        now: i64,
    ) -> bool {
        let key = StateKey::new(&cond.once_per, trigger, &cond.condition_key, service, recipient);
        let encoded = key.encode();
        let currently_present = self.notified.contains_key(&encoded);

        if currently_present == is_notified {
            return false;
        }

        if is_notified {
            self.notified.insert(encoded, now);
            true
        } else if !cond.once_per.is_empty() {
            false
        } else {
            self.notified.remove(&encoded);
            true
        }
    }

    /// "Skip first run" policy: true the first time `(service, recipient)` is
    /// observed (and records it), false on every subsequent call.
    pub fn skip_first_run(&mut self, service: &str, recipient: &str, now: i64) -> bool {
        let key = ServiceKey {
            service: service.to_string(),
            recipient: recipient.to_string(),
        }
        .to_string();
        if self.service.contains_key(&key) {
            false
        } else {
            self.service.insert(key, now);
            true
        }
    }

    /// Truncates `notified` to the 100 most recent entries (invariant #1),
    /// then serialises both maps back into `resource`'s annotations, deleting
    /// each key entirely when its map is empty.
    pub fn persist(&mut self, resource: &mut Resource, prefix: &AnnotationPrefix) {
        self.truncate();

        let notified_key = prefix.notified_key();
        if self.notified.is_empty() {
            resource.annotations.remove(&notified_key);
        } else {
            let encoded = serde_json::to_string(&self.notified).expect("map of String/i64 always serialises");
            resource.annotations.insert(notified_key, encoded);
        }

        let service_key = prefix.notified_service_key();
        if self.service.is_empty() {
            resource.annotations.remove(&service_key);
        } else {
            let encoded = serde_json::to_string(&self.service).expect("map of String/i64 always serialises");
            resource.annotations.insert(service_key, encoded);
        }
    }

    fn truncate(&mut self) {
        if self.notified.len() <= MAX_NOTIFIED_STATE_ENTRIES {
            return;
        }
        let mut by_age: Vec<(String, i64)> = self.notified.iter().map(|(k, v)| (k.clone(), *v)).collect();
        by_age.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        let evict_count = by_age.len() - MAX_NOTIFIED_STATE_ENTRIES;
        for (key, _) in by_age.into_iter().take(evict_count) {
            self.notified.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(key: &str, once_per: &str) -> ConditionIdentity {
        ConditionIdentity {
            condition_key: key.to_string(),
            once_per: once_per.to_string(),
        }
    }

    #[test]
    fn set_already_notified_is_idempotent() {
        let mut state = State::default();
        let c = cond("0", "");
        assert!(state.set_already_notified("t", &c, "mock", "r", true, 10));
        assert!(!state.set_already_notified("t", &c, "mock", "r", true, 20));
    }

    #[test]
    fn clears_on_not_triggered_without_once_per() {
        let mut state = State::default();
        let c = cond("0", "");
        state.set_already_notified("t", &c, "mock", "r", true, 10);
        assert!(state.set_already_notified("t", &c, "mock", "r", false, 20));
        assert!(!state.is_notified("t", &c, "mock", "r"));
    }

    #[test]
    fn once_per_entry_survives_not_triggered() {
        let mut state = State::default();
        let c = cond("0", "abc");
        state.set_already_notified("t", &c, "mock", "r", true, 10);
        assert!(!state.set_already_notified("t", &c, "mock", "r", false, 20));
        assert!(state.is_notified("t", &c, "mock", "r"));
    }

    #[test]
    fn skip_first_run_fires_once() {
        let mut state = State::default();
        assert!(state.skip_first_run("mock", "r", 1));
        assert!(!state.skip_first_run("mock", "r", 2));
    }

    #[test]
    fn persist_round_trips_through_annotations() {
        let prefix = AnnotationPrefix::default();
        let mut resource = Resource::new("ns", "app");
        let mut state = State::default();
        let c = cond("0", "");
        state.set_already_notified("t", &c, "mock", "r", true, 10);
        state.skip_first_run("mock", "r", 10);
        state.persist(&mut resource, &prefix);

        assert!(resource.annotations.contains_key(&prefix.notified_key()));
        assert!(resource.annotations.contains_key(&prefix.notified_service_key()));

        let restored = State::from_resource(&resource, &prefix);
        assert_eq!(restored, state);
    }

    #[test]
    fn persist_deletes_keys_once_empty() {
        let prefix = AnnotationPrefix::default();
        let mut resource = Resource::new("ns", "app");
        let mut state = State::default();
        state.persist(&mut resource, &prefix);
        assert!(!resource.annotations.contains_key(&prefix.notified_key()));
        assert!(!resource.annotations.contains_key(&prefix.notified_service_key()));
    }

    #[test]
    fn truncation_evicts_oldest_entries_first() {
        let mut state = State::default();
        for i in 0..110 {
            let c = cond(&i.to_string(), "");
            state.set_already_notified("t", &c, "mock", "r", true, i as i64);
        }
        state.truncate();
        assert_eq!(state.notified.len(), MAX_NOTIFIED_STATE_ENTRIES);
        let c_oldest = cond("0", "");
        assert!(!state.is_notified("t", &c_oldest, "mock", "r"));
        let c_newest = cond("109", "");
        assert!(state.is_notified("t", &c_newest, "mock", "r"));
    }
}
