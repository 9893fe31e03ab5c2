//! `stateKey` encoding: the canonical identity of one
//! `(trigger, condition, destination)` delivery.

use std::fmt;

/// `[oncePer ":"] trigger ":" conditionKey ":" service ":" recipient`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey {
    pub once_per: String,
    pub trigger: String,
    pub condition_key: String,
    pub service: String,
    pub recipient: String,
}

impl StateKey {
    #[must_use]
    pub fn new(
        once_per: impl Into<String>,
        trigger: impl Into<String>,
        condition_key: impl Into<String>,
        service: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            once_per: once_per.into(),
            trigger: trigger.into(),
            condition_key: condition_key.into(),
            service: service.into(),
            recipient: recipient.into(),
        }
    }

    #[must_use]
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.once_per.is_empty() {
            write!(
                f,
                "{}:{}:{}:{}",
                self.trigger, self.condition_key, self.service, self.recipient
            )
        } else {
            write!(
                f,
                "{}:{}:{}:{}:{}",
                self.once_per, self.trigger, self.condition_key, self.service, self.recipient
            )
        }
    }
}
