//! Subscription annotation key grammar.
//!
//! Keys are either the flat form `{prefix}/subscribe.TRIGGER.SERVICE` (or
//! `{prefix}/subscribe.SERVICE` when the trigger segment is omitted), or the
//! YAML form `{prefix}/subscriptions`. The prefix itself is never a global —
//! it is constructed once and threaded through the resolver and state store,
//! per the redesign flag in SPEC_FULL.md.

use serde::{Deserialize, Serialize};

/// Default annotation prefix, matching the upstream notification system this
/// engine's behavior is specified against.
pub const DEFAULT_ANNOTATION_PREFIX: &str = "notifications.argoproj.io";

const SUBSCRIBE_SEGMENT: &str = "subscribe";
const SUBSCRIPTIONS_SEGMENT: &str = "subscriptions";

/// A construction-time dependency carrying the annotation namespace prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationPrefix(String);

impl Default for AnnotationPrefix {
    fn default() -> Self {
        Self(DEFAULT_ANNOTATION_PREFIX.to_string())
    }
}

impl AnnotationPrefix {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self(prefix.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds a flat subscription key. An empty `trigger` omits the trigger
    /// segment entirely (`{prefix}/subscribe.SERVICE`).
    #[must_use]
    pub fn subscribe_key(&self, trigger: &str, service: &str) -> String {
        if trigger.is_empty() {
            format!("{}/{SUBSCRIBE_SEGMENT}.{service}", self.0)
        } else {
            format!("{}/{SUBSCRIBE_SEGMENT}.{trigger}.{service}", self.0)
        }
    }

    /// Key for the YAML-bearing subscriptions annotation.
    #[must_use]
    pub fn subscriptions_key(&self) -> String {
        format!("{}/{SUBSCRIPTIONS_SEGMENT}", self.0)
    }

    /// Key under which the `NotifiedState` map is persisted.
    #[must_use]
    pub fn notified_key(&self) -> String {
        format!("notified.{}", self.0)
    }

    /// Key under which the `ServiceState` map (first-seen timestamps) is persisted.
    #[must_use]
    pub fn notified_service_key(&self) -> String {
        format!("notified.{}/service", self.0)
    }

    /// Parses a flat `subscribe.*` key into `(trigger, service)`. `trigger` is
    /// `""` when the key omits that segment. Returns `None` for non-flat-form
    /// or non-matching keys (including the YAML `subscriptions` key).
    #[must_use]
    pub fn parse_subscribe_key(&self, key: &str) -> Option<(String, String)> {
        let prefix = format!("{}/{SUBSCRIBE_SEGMENT}.", self.0);
        let rest = key.strip_prefix(&prefix)?;
        match rest.split_once('.') {
            Some((trigger, service)) if !trigger.is_empty() && !service.is_empty() => {
                Some((trigger.to_string(), service.to_string()))
            }
            None if !rest.is_empty() => Some((String::new(), rest.to_string())),
            _ => None,
        }
    }

    /// Returns true if `key` is exactly the YAML subscriptions key.
    #[must_use]
    pub fn is_subscriptions_key(&self, key: &str) -> bool {
        key == self.subscriptions_key()
    }
}
