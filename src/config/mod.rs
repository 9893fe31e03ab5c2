//! Config/API factory: parses the config document, builds per-namespace
//! `Api` snapshots, and caches them with invalidation on upstream change
//! events.

pub mod api;
pub mod factory;
pub mod model;
pub mod parser;

pub use api::Api;
pub use factory::{ApiBuilder, ApiFactory, DocumentSource, Settings};
pub use model::{Condition, ConditionResult, Config, GlobalSubscription, Notification, ServiceFactory};
pub use parser::{ConfigParser, DefaultConfigParser};
