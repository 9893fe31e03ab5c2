//! Notification destinations.

use serde::{Deserialize, Serialize};

/// A `(service, recipient)` delivery target.
///
/// Equality is structural. Order within a destination list is preserved for
/// reproducibility even though it carries no correctness meaning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Destination {
    pub service: String,
    pub recipient: String,
}

impl Destination {
    #[must_use]
    pub fn new(service: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            recipient: recipient.into(),
        }
    }
}

/// Appends `extra` onto `base`, then removes structural duplicates while
/// preserving first-seen order.
pub fn dedup_destinations(base: &mut Vec<Destination>, extra: impl IntoIterator<Item = Destination>) {
    base.extend(extra);
    dedup_in_place(base);
}

/// Removes structural duplicates from `destinations`, preserving order.
pub fn dedup_in_place(destinations: &mut Vec<Destination>) {
    let mut seen = std::collections::HashSet::with_capacity(destinations.len());
    destinations.retain(|d| seen.insert(d.clone()));
}
