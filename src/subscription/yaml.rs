//! Shapes for the YAML-bearing subscription annotation
//! (`{prefix}/subscriptions`).

use serde::{Deserialize, Serialize};

/// One entry of the `{prefix}/subscriptions` sequence.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct YamlSubscription {
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub destinations: Vec<YamlDestination>,
}

/// One destination entry within a [`YamlSubscription`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct YamlDestination {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub recipients: Vec<String>,
}

/// Parses the `{prefix}/subscriptions` annotation value.
///
/// Malformed YAML is the caller's concern to log; this just surfaces the
/// `serde_yaml` error so the caller can decide how loudly to complain.
pub fn parse_subscriptions(raw: &str) -> Result<Vec<YamlSubscription>, serde_yaml::Error> {
    serde_yaml::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_subscription_list() {
        let raw = r#"
- triggers: [on-sync-failed]
  destinations:
    - service: slack
      recipients: [platform-team]
    - service: email
      recipients: [oncall@example.com, backup@example.com]
"#;
        let subs = parse_subscriptions(raw).unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].triggers, vec!["on-sync-failed".to_string()]);
        assert_eq!(subs[0].destinations.len(), 2);
        assert_eq!(subs[0].destinations[1].recipients.len(), 2);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let raw = "- {}\n";
        let subs = parse_subscriptions(raw).unwrap();
        assert_eq!(subs.len(), 1);
        assert!(subs[0].triggers.is_empty());
        assert!(subs[0].destinations.is_empty());
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let raw = "this: [is not: a list";
        assert!(parse_subscriptions(raw).is_err());
    }
}
