//! Subscription resolution: annotations → `(trigger -> [destination])`.

use std::collections::BTreeMap;

use tracing::warn;

use crate::destination::{dedup_in_place, Destination};

use super::key::AnnotationPrefix;
use super::yaml::parse_subscriptions;

/// One `(trigger, service, recipients)` emission from annotation iteration,
/// before effective-trigger-list materialization. `trigger == ""` means "use
/// the default trigger list for this service (or the global default)".
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRecord {
    pub trigger: String,
    pub service: String,
    pub recipients: Vec<String>,
}

fn split_recipients(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lazily iterates `annotations` yielding one [`SubscriptionRecord`] per
/// recognised subscription key. Unrecognised keys are silently skipped (step
/// 4 of the resolver algorithm); malformed YAML emits an empty record and is
/// logged via `tracing::warn!`.
pub fn iter_subscription_records<'a>(
    annotations: &'a BTreeMap<String, String>,
    prefix: &'a AnnotationPrefix,
) -> impl Iterator<Item = SubscriptionRecord> + 'a {
    annotations.iter().flat_map(move |(key, value)| {
        if let Some((trigger, service)) = prefix.parse_subscribe_key(key) {
            return vec![SubscriptionRecord {
                trigger,
                service,
                recipients: split_recipients(value),
            }];
        }

        if prefix.is_subscriptions_key(key) {
            return match parse_subscriptions(value) {
                Ok(subs) => subs
                    .into_iter()
                    .flat_map(|sub| {
                        let triggers = if sub.triggers.is_empty() {
                            vec![String::new()]
                        } else {
                            sub.triggers
                        };
                        let destinations = if sub.destinations.is_empty() {
                            vec![super::yaml::YamlDestination {
                                service: String::new(),
                                recipients: Vec::new(),
                            }]
                        } else {
                            sub.destinations
                        };
                        triggers
                            .into_iter()
                            .flat_map(move |trigger| {
                                destinations
                                    .clone()
                                    .into_iter()
                                    .map(move |dest| SubscriptionRecord {
                                        trigger: trigger.clone(),
                                        service: dest.service,
                                        recipients: dest.recipients,
                                    })
                            })
                            .collect::<Vec<_>>()
                    })
                    .collect(),
                Err(err) => {
                    warn!(key = %key, error = %err, "malformed subscriptions YAML annotation");
                    vec![SubscriptionRecord {
                        trigger: String::new(),
                        service: String::new(),
                        recipients: Vec::new(),
                    }]
                }
            };
        }

        Vec::new()
    })
}

/// Resolves annotation-derived destinations, per resource, into a
/// `trigger -> destinations` map.
///
/// `default_triggers` is used when a record carries no trigger and the
/// service (if any) has no entry in `service_default_triggers`.
pub fn get_destinations(
    annotations: &BTreeMap<String, String>,
    prefix: &AnnotationPrefix,
    default_triggers: &[String],
    service_default_triggers: &BTreeMap<String, Vec<String>>,
) -> BTreeMap<String, Vec<Destination>> {
    let mut out: BTreeMap<String, Vec<Destination>> = BTreeMap::new();

    for record in iter_subscription_records(annotations, prefix) {
        if record.service.is_empty() && record.recipients.is_empty() {
            continue;
        }

        let effective_triggers: Vec<String> = if !record.trigger.is_empty() {
            vec![record.trigger.clone()]
        } else if let Some(defaults) = service_default_triggers.get(&record.service) {
            defaults.clone()
        } else {
            default_triggers.to_vec()
        };

        for trigger in effective_triggers {
            let bucket = out.entry(trigger).or_default();
            for recipient in &record.recipients {
                bucket.push(Destination::new(record.service.clone(), recipient.clone()));
            }
        }
    }

    for destinations in out.values_mut() {
        dedup_in_place(destinations);
    }

    out
}

/// Adds `recipient` to the flat `subscribe.TRIGGER.SERVICE` annotation,
/// merging into any existing `;`-separated recipient list.
pub fn subscribe(
    annotations: &mut BTreeMap<String, String>,
    prefix: &AnnotationPrefix,
    trigger: &str,
    service: &str,
    recipient: &str,
) {
    let key = prefix.subscribe_key(trigger, service);
    let mut recipients = annotations
        .get(&key)
        .map(|v| split_recipients(v))
        .unwrap_or_default();
    if !recipients.iter().any(|r| r == recipient) {
        recipients.push(recipient.to_string());
    }
    annotations.insert(key, recipients.join(";"));
}

/// Removes `recipient` from the flat `subscribe.TRIGGER.SERVICE` annotation
/// matching `(trigger, service)`, rewriting with `;` as separator (the
/// upstream join-with-no-separator behavior is treated as a bug, per
/// SPEC_FULL.md's Open Questions), or deleting the key entirely once empty.
pub fn unsubscribe(
    annotations: &mut BTreeMap<String, String>,
    prefix: &AnnotationPrefix,
    trigger: &str,
    service: &str,
    recipient: &str,
) {
    let key = prefix.subscribe_key(trigger, service);
    let Some(existing) = annotations.get(&key) else {
        return;
    };
    let remaining: Vec<String> = split_recipients(existing)
        .into_iter()
        .filter(|r| r != recipient)
        .collect();

    if remaining.is_empty() {
        annotations.remove(&key);
    } else {
        annotations.insert(key, remaining.join(";"));
    }
}

/// Returns true if `annotations` already subscribes `(service, recipient)`
/// under any trigger, flat or YAML form.
#[must_use]
pub fn has(
    annotations: &BTreeMap<String, String>,
    prefix: &AnnotationPrefix,
    service: &str,
    recipient: &str,
) -> bool {
    iter_subscription_records(annotations, prefix)
        .any(|r| r.service == service && r.recipients.iter().any(|rec| rec == recipient))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ann(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn flat_form_with_trigger() {
        let prefix = AnnotationPrefix::default();
        let annotations = ann(&[(
            "notifications.argoproj.io/subscribe.my-trigger.mock",
            "a@b.com; ;c@d.com",
        )]);
        let destinations = get_destinations(&annotations, &prefix, &[], &BTreeMap::new());
        assert_eq!(
            destinations.get("my-trigger").unwrap(),
            &vec![
                Destination::new("mock", "a@b.com"),
                Destination::new("mock", "c@d.com"),
            ]
        );
    }

    #[test]
    fn flat_form_without_trigger_uses_service_defaults() {
        let prefix = AnnotationPrefix::default();
        let annotations = ann(&[("notifications.argoproj.io/subscribe.mock", "x")]);
        let mut service_defaults = BTreeMap::new();
        service_defaults.insert("mock".to_string(), vec!["on-deployed".to_string()]);

        let destinations = get_destinations(&annotations, &prefix, &["fallback".into()], &service_defaults);
        assert!(destinations.contains_key("on-deployed"));
        assert!(!destinations.contains_key("fallback"));
    }

    #[test]
    fn flat_form_without_trigger_falls_back_to_global_defaults() {
        let prefix = AnnotationPrefix::default();
        let annotations = ann(&[("notifications.argoproj.io/subscribe.mock", "x")]);
        let destinations = get_destinations(&annotations, &prefix, &["fallback".into()], &BTreeMap::new());
        assert!(destinations.contains_key("fallback"));
    }

    #[test]
    fn yaml_form_cross_products_triggers_and_destinations() {
        let prefix = AnnotationPrefix::default();
        let raw = r#"
- triggers: [t1, t2]
  destinations:
    - service: slack
      recipients: [ops]
"#;
        let annotations = ann(&[("notifications.argoproj.io/subscriptions", raw)]);
        let destinations = get_destinations(&annotations, &prefix, &[], &BTreeMap::new());
        assert_eq!(destinations.len(), 2);
        assert_eq!(destinations["t1"], vec![Destination::new("slack", "ops")]);
        assert_eq!(destinations["t2"], vec![Destination::new("slack", "ops")]);
    }

    #[test]
    fn malformed_yaml_logs_and_yields_nothing() {
        let prefix = AnnotationPrefix::default();
        let annotations = ann(&[(
            "notifications.argoproj.io/subscriptions",
            "not: [valid: yaml",
        )]);
        let destinations = get_destinations(&annotations, &prefix, &[], &BTreeMap::new());
        assert!(destinations.is_empty());
    }

    #[test]
    fn unrelated_keys_are_ignored() {
        let prefix = AnnotationPrefix::default();
        let annotations = ann(&[("some/other-key", "value")]);
        let destinations = get_destinations(&annotations, &prefix, &["fallback".into()], &BTreeMap::new());
        assert!(destinations.is_empty());
    }

    #[test]
    fn subscribe_merges_recipients_with_semicolon() {
        let prefix = AnnotationPrefix::default();
        let mut annotations = BTreeMap::new();
        subscribe(&mut annotations, &prefix, "t", "mock", "a@b.com");
        subscribe(&mut annotations, &prefix, "t", "mock", "c@d.com");
        assert_eq!(
            annotations.get("notifications.argoproj.io/subscribe.t.mock"),
            Some(&"a@b.com;c@d.com".to_string())
        );
        assert!(has(&annotations, &prefix, "mock", "c@d.com"));
    }

    #[test]
    fn unsubscribe_removes_recipient_and_rejoins_with_semicolon() {
        let prefix = AnnotationPrefix::default();
        let mut annotations = BTreeMap::new();
        subscribe(&mut annotations, &prefix, "t", "mock", "a@b.com");
        subscribe(&mut annotations, &prefix, "t", "mock", "c@d.com");
        subscribe(&mut annotations, &prefix, "t", "mock", "e@f.com");

        unsubscribe(&mut annotations, &prefix, "t", "mock", "c@d.com");
        assert_eq!(
            annotations.get("notifications.argoproj.io/subscribe.t.mock"),
            Some(&"a@b.com;e@f.com".to_string())
        );
    }

    #[test]
    fn unsubscribe_deletes_key_once_empty() {
        let prefix = AnnotationPrefix::default();
        let mut annotations = BTreeMap::new();
        subscribe(&mut annotations, &prefix, "t", "mock", "a@b.com");
        unsubscribe(&mut annotations, &prefix, "t", "mock", "a@b.com");
        assert!(!annotations.contains_key("notifications.argoproj.io/subscribe.t.mock"));
    }
}
