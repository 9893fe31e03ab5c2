//! Annotation-driven subscription model: key grammar, YAML shape, and the
//! resolver that turns a resource's annotations into destinations per
//! trigger.

pub mod key;
pub mod resolver;
pub mod yaml;

pub use key::{AnnotationPrefix, DEFAULT_ANNOTATION_PREFIX};
pub use resolver::{get_destinations, has, iter_subscription_records, subscribe, unsubscribe, SubscriptionRecord};
pub use yaml::{parse_subscriptions, YamlDestination, YamlSubscription};
