//! The upstream informer: an indexed, namespaced local store plus an
//! add/update event source. Delete events are intentionally not modeled —
//! the controller treats "missing from the index" as the drop signal.

use std::sync::mpsc::Receiver;

use crate::resource::{Resource, ResourceKey};

/// An informer event. Only add/update are ever emitted onto the stream
/// (REDESIGN FLAG: re-expressed as a channel, not a closure-based handler).
#[derive(Debug, Clone, PartialEq)]
pub enum InformerEvent {
    Added(ResourceKey),
    Updated(ResourceKey),
}

/// A read-only, indexed local cache of resources, plus a stream of
/// add/update events. The controller never mutates through this trait; it
/// deep-copies before making changes and relies on the patch round-trip
/// (`ResourceClient::patch`) to update the store.
pub trait ResourceInformer: Send + Sync {
    /// Looks up a resource by key. `None` models "not found" — the
    /// controller drops the work item rather than treating it as an error.
    fn get(&self, key: &ResourceKey) -> Option<Resource>;

    /// Replaces the index's copy of `resource` after a successful patch.
    fn put(&self, resource: Resource);

    /// Takes the event receiver. Informers are constructed with their sender
    /// half already wired to whatever upstream watch mechanism feeds them;
    /// returns `None` on every call after the first, since a channel
    /// receiver cannot be shared.
    fn take_events(&self) -> Option<Receiver<InformerEvent>>;
}
