//! Typed shapes produced by parsing the config document (§6): services,
//! templates, triggers, and the default/selector-based subscription tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// One destination-selection rule inside `trigger.<name>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub when: String,
    #[serde(default)]
    pub send: Vec<String>,
    #[serde(default, rename = "oncePer")]
    pub once_per: Option<String>,
}

/// The outcome of evaluating one [`Condition`] against a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionResult {
    pub triggered: bool,
    pub key: String,
    pub templates: Vec<String>,
    pub once_per: String,
}

/// `template.<name>`: a notification body plus arbitrary extra fields for a
/// template-rendering collaborator to use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Notification {
    /// Default, non-templating render: returns the notification unchanged.
    /// Embedders that want variable substitution supply their own
    /// `Renderer` implementation.
    #[must_use]
    pub fn render(&self, _vars: &Value) -> Notification {
        self.clone()
    }
}

/// `service.<name>`: opaque configuration handed to a `NotificationService`
/// adapter at send time. The adapter alone knows how to interpret it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceFactory {
    #[serde(flatten)]
    pub settings: BTreeMap<String, Value>,
}

/// A label-selector-based global subscription: resources whose labels match
/// `selector` receive `destinations` regardless of their own annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSubscription {
    pub selector: BTreeMap<String, String>,
    pub triggers: Vec<String>,
    pub destinations: Vec<crate::subscription::YamlDestination>,
}

impl GlobalSubscription {
    /// A resource matches when every selector key/value pair is present
    /// among its labels (AND semantics; empty selector matches everything).
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.selector
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }
}

/// The fully parsed configuration document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub services: BTreeMap<String, ServiceFactory>,
    pub templates: BTreeMap<String, Notification>,
    pub triggers: BTreeMap<String, Vec<Condition>>,
    pub default_triggers: Vec<String>,
    pub service_default_triggers: BTreeMap<String, Vec<String>>,
    pub subscriptions: Vec<GlobalSubscription>,
    /// Set for configs built from a non-default namespace (§4.C).
    pub is_self_service_config: bool,
}

impl Config {
    /// Destinations contributed by label-selector subscriptions (§3
    /// `Subscriptions`), independent of the resource's own annotations.
    #[must_use]
    pub fn global_destinations(&self, labels: &BTreeMap<String, String>) -> BTreeMap<String, Vec<crate::destination::Destination>> {
        let mut out: BTreeMap<String, Vec<crate::destination::Destination>> = BTreeMap::new();
        for sub in &self.subscriptions {
            if !sub.matches(labels) {
                continue;
            }
            for trigger in &sub.triggers {
                let bucket = out.entry(trigger.clone()).or_default();
                for dest in &sub.destinations {
                    for recipient in &dest.recipients {
                        bucket.push(crate::destination::Destination::new(dest.service.clone(), recipient.clone()));
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_subscription_matches_on_label_subset() {
        let sub = GlobalSubscription {
            selector: BTreeMap::from([("team".to_string(), "platform".to_string())]),
            triggers: vec!["on-sync-failed".to_string()],
            destinations: vec![],
        };
        let labels = BTreeMap::from([
            ("team".to_string(), "platform".to_string()),
            ("app".to_string(), "x".to_string()),
        ]);
        assert!(sub.matches(&labels));
        assert!(!sub.matches(&BTreeMap::new()));
    }

    #[test]
    fn global_destinations_aggregates_matching_subscriptions() {
        let mut config = Config::default();
        config.subscriptions.push(GlobalSubscription {
            selector: BTreeMap::new(),
            triggers: vec!["t".to_string()],
            destinations: vec![crate::subscription::YamlDestination {
                service: "slack".to_string(),
                recipients: vec!["ops".to_string()],
            }],
        });
        let destinations = config.global_destinations(&BTreeMap::new());
        assert_eq!(
            destinations["t"],
            vec![crate::destination::Destination::new("slack", "ops")]
        );
    }
}
