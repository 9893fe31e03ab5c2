//! Notified-state model: `stateKey` encoding and the per-resource store.

pub mod key;
pub mod store;

pub use key::StateKey;
pub use store::{ConditionIdentity, State};
