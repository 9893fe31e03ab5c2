//! Parses the config document (§6) into a [`Config`].
//!
//! The config and secret documents are both flat `string -> string` maps, in
//! the shape of a ConfigMap/Secret `data` field. Recognised config keys:
//! `service.<name>`, `template.<name>`, `trigger.<name>`, `defaultTriggers`,
//! `defaultTriggers.<service>`, `subscriptions`.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{NotifyResult, ValidationError};
use crate::subscription::YamlSubscription;

use super::model::{Condition, Config, GlobalSubscription, Notification, ServiceFactory};

const SERVICE_PREFIX: &str = "service.";
const TEMPLATE_PREFIX: &str = "template.";
const TRIGGER_PREFIX: &str = "trigger.";
const DEFAULT_TRIGGERS_KEY: &str = "defaultTriggers";
const DEFAULT_TRIGGERS_PREFIX: &str = "defaultTriggers.";
const SUBSCRIPTIONS_KEY: &str = "subscriptions";

static SECRET_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex"));

/// Parses a config/secret document pair into a live [`Config`]. Implemented
/// as a trait so the factory can be tested against a stub without pulling in
/// a real YAML document.
pub trait ConfigParser: Send + Sync {
    fn parse(&self, config_doc: &BTreeMap<String, String>, secret_doc: &BTreeMap<String, String>) -> NotifyResult<Config>;
}

/// The grammar described in §6, implemented directly against `serde_yaml`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConfigParser;

impl DefaultConfigParser {
    fn substitute_secrets(raw: &str, secrets: &BTreeMap<String, String>) -> String {
        SECRET_TOKEN
            .replace_all(raw, |caps: &regex::Captures| {
                let key = &caps[1];
                secrets.get(key).cloned().unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

impl ConfigParser for DefaultConfigParser {
    fn parse(&self, config_doc: &BTreeMap<String, String>, secret_doc: &BTreeMap<String, String>) -> NotifyResult<Config> {
        let mut config = Config::default();

        for (key, raw) in config_doc {
            if let Some(name) = key.strip_prefix(SERVICE_PREFIX) {
                let substituted = Self::substitute_secrets(raw, secret_doc);
                let factory: ServiceFactory = serde_yaml::from_str(&substituted)
                    .map_err(|e| ValidationError::invalid_field("service", e.to_string()))?;
                config.services.insert(name.to_string(), factory);
            } else if let Some(name) = key.strip_prefix(TEMPLATE_PREFIX) {
                let notification: Notification = serde_yaml::from_str(raw)
                    .map_err(|e| ValidationError::invalid_field("template", e.to_string()))?;
                config.templates.insert(name.to_string(), notification);
            } else if let Some(name) = key.strip_prefix(TRIGGER_PREFIX) {
                let conditions: Vec<Condition> = serde_yaml::from_str(raw)
                    .map_err(|e| ValidationError::invalid_field("trigger", e.to_string()))?;
                config.triggers.insert(name.to_string(), conditions);
            } else if key == DEFAULT_TRIGGERS_KEY {
                config.default_triggers = serde_yaml::from_str(raw)
                    .map_err(|e| ValidationError::invalid_field(DEFAULT_TRIGGERS_KEY, e.to_string()))?;
            } else if let Some(service) = key.strip_prefix(DEFAULT_TRIGGERS_PREFIX) {
                let triggers: Vec<String> = serde_yaml::from_str(raw)
                    .map_err(|e| ValidationError::invalid_field("defaultTriggers.<service>", e.to_string()))?;
                config.service_default_triggers.insert(service.to_string(), triggers);
            } else if key == SUBSCRIPTIONS_KEY {
                let subs: Vec<YamlSubscription> = serde_yaml::from_str(raw)
                    .map_err(|e| ValidationError::invalid_field(SUBSCRIPTIONS_KEY, e.to_string()))?;
                config.subscriptions = subs
                    .into_iter()
                    .map(|s| GlobalSubscription {
                        selector: BTreeMap::new(),
                        triggers: s.triggers,
                        destinations: s.destinations,
                    })
                    .collect();
            }
            // unrecognised keys are ignored, matching upstream's forward-compatible grammar.
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_secret_tokens_before_parsing_service() {
        let mut config_doc = BTreeMap::new();
        config_doc.insert(
            "service.slack".to_string(),
            "token: $slackToken\nchannel: ops\n".to_string(),
        );
        let mut secret_doc = BTreeMap::new();
        secret_doc.insert("slackToken".to_string(), "xoxb-abc".to_string());

        let config = DefaultConfigParser.parse(&config_doc, &secret_doc).unwrap();
        let factory = config.services.get("slack").unwrap();
        assert_eq!(
            factory.settings.get("token").and_then(|v| v.as_str()),
            Some("xoxb-abc")
        );
    }

    #[test]
    fn parses_triggers_templates_and_defaults() {
        let mut config_doc = BTreeMap::new();
        config_doc.insert(
            "trigger.on-sync-failed".to_string(),
            "- when: \"payload.status.phase == 'Failed'\"\n  send: [failure]\n".to_string(),
        );
        config_doc.insert(
            "template.failure".to_string(),
            "message: Sync failed\ntitle: Alert\n".to_string(),
        );
        config_doc.insert("defaultTriggers".to_string(), "[on-sync-failed]".to_string());
        config_doc.insert("defaultTriggers.slack".to_string(), "[on-sync-failed]".to_string());

        let config = DefaultConfigParser.parse(&config_doc, &BTreeMap::new()).unwrap();
        assert_eq!(config.triggers["on-sync-failed"].len(), 1);
        assert_eq!(config.templates["failure"].message, "Sync failed");
        assert_eq!(config.default_triggers, vec!["on-sync-failed".to_string()]);
        assert_eq!(config.service_default_triggers["slack"], vec!["on-sync-failed".to_string()]);
    }

    #[test]
    fn malformed_yaml_is_a_validation_error() {
        let mut config_doc = BTreeMap::new();
        config_doc.insert("service.slack".to_string(), "not: [valid: yaml".to_string());
        let err = DefaultConfigParser.parse(&config_doc, &BTreeMap::new()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn unrecognised_keys_are_ignored() {
        let mut config_doc = BTreeMap::new();
        config_doc.insert("unknown.key".to_string(), "whatever".to_string());
        let config = DefaultConfigParser.parse(&config_doc, &BTreeMap::new()).unwrap();
        assert_eq!(config, Config::default());
    }
}
