//! In-memory collaborator implementations for downstream integration tests.
//! Gated behind `test-support` so embedders can exercise the controller
//! without standing up real informers, clients, or service adapters.

use std::collections::BTreeMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

use crate::config::{ApiBuilder, Api, Config, DocumentSource};
use crate::controller::ResourceClient;
use crate::error::NotifyResult;
use crate::informer::{InformerEvent, ResourceInformer};
use crate::resource::{Resource, ResourceKey};
use crate::service::NotificationService;

/// An in-memory [`ResourceInformer`] backed by a `Mutex<BTreeMap>`. Events
/// are emitted synchronously by [`InMemoryInformer::push`].
pub struct InMemoryInformer {
    store: Mutex<BTreeMap<ResourceKey, Resource>>,
    sender: Sender<InformerEvent>,
    receiver: Mutex<Option<Receiver<InformerEvent>>>,
}

impl Default for InMemoryInformer {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryInformer {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = channel();
        Self {
            store: Mutex::new(BTreeMap::new()),
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Seeds or updates a resource and emits the corresponding event.
    pub fn push(&self, resource: Resource) {
        let key = resource.key();
        let is_new = {
            let mut store = self.store.lock().expect("informer store mutex poisoned");
            let is_new = !store.contains_key(&key);
            store.insert(key.clone(), resource);
            is_new
        };
        let event = if is_new { InformerEvent::Added(key) } else { InformerEvent::Updated(key) };
        let _ = self.sender.send(event);
    }
}

impl ResourceInformer for InMemoryInformer {
    fn get(&self, key: &ResourceKey) -> Option<Resource> {
        self.store.lock().expect("informer store mutex poisoned").get(key).cloned()
    }

    fn put(&self, resource: Resource) {
        self.store
            .lock()
            .expect("informer store mutex poisoned")
            .insert(resource.key(), resource);
    }

    fn take_events(&self) -> Option<Receiver<InformerEvent>> {
        self.receiver.lock().expect("informer receiver mutex poisoned").take()
    }
}

/// A [`ResourceClient`] that applies merge-patch annotation changes directly
/// to an in-memory map, mirroring what a real API server would do for this
/// narrow patch shape.
pub struct InMemoryResourceClient {
    resources: Mutex<BTreeMap<ResourceKey, Resource>>,
}

impl Default for InMemoryResourceClient {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryResourceClient {
    #[must_use]
    pub fn new() -> Self {
        Self { resources: Mutex::new(BTreeMap::new()) }
    }

    pub fn seed(&self, resource: Resource) {
        self.resources.lock().expect("client mutex poisoned").insert(resource.key(), resource);
    }
}

impl ResourceClient for InMemoryResourceClient {
    fn patch(&self, namespace: &str, name: &str, merge_patch: &serde_json::Value) -> Result<Resource, String> {
        let key = ResourceKey::new(namespace, name);
        let mut resources = self.resources.lock().expect("client mutex poisoned");
        let resource = resources.get_mut(&key).ok_or_else(|| format!("{key} not found"))?;

        let Some(annotations) = merge_patch.get("metadata").and_then(|m| m.get("annotations")).and_then(|a| a.as_object()) else {
            return Ok(resource.clone());
        };

        for (k, v) in annotations {
            if v.is_null() {
                resource.annotations.remove(k);
            } else if let Some(s) = v.as_str() {
                resource.annotations.insert(k.clone(), s.to_string());
            }
        }

        Ok(resource.clone())
    }
}

/// A [`DocumentSource`] backed by a fixed in-memory map, for tests that
/// don't need live ConfigMap/Secret mutation.
pub struct StaticDocumentSource {
    documents: BTreeMap<(String, String), BTreeMap<String, String>>,
}

impl StaticDocumentSource {
    #[must_use]
    pub fn new() -> Self {
        Self { documents: BTreeMap::new() }
    }

    #[must_use]
    pub fn with(mut self, namespace: impl Into<String>, name: impl Into<String>, data: BTreeMap<String, String>) -> Self {
        self.documents.insert((namespace.into(), name.into()), data);
        self
    }
}

impl Default for StaticDocumentSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentSource for StaticDocumentSource {
    fn get(&self, namespace: &str, name: &str) -> Result<Option<BTreeMap<String, String>>, String> {
        Ok(self.documents.get(&(namespace.to_string(), name.to_string())).cloned())
    }
}

/// Builds an [`Api`] wiring every configured service name to a
/// [`RecordingNotificationService`] shared across all built APIs, so tests
/// can assert on what was sent regardless of namespace.
pub struct RecordingApiBuilder {
    pub service: std::sync::Arc<RecordingNotificationService>,
}

impl ApiBuilder for RecordingApiBuilder {
    fn build(&self, config: Config) -> Api {
        let services = config
            .services
            .keys()
            .map(|name| (name.clone(), self.service.clone() as std::sync::Arc<dyn NotificationService>))
            .collect();
        Api::new(config, services)
    }
}

/// A [`NotificationService`] that records every delivery instead of sending
/// it anywhere.
#[derive(Default)]
pub struct RecordingNotificationService {
    sent: Mutex<Vec<(crate::config::Notification, crate::destination::Destination)>>,
}

impl RecordingNotificationService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sent(&self) -> Vec<(crate::config::Notification, crate::destination::Destination)> {
        self.sent.lock().expect("recording service mutex poisoned").clone()
    }
}

impl NotificationService for RecordingNotificationService {
    fn send(&self, notification: &crate::config::Notification, destination: &crate::destination::Destination) -> NotifyResult<()> {
        self.sent
            .lock()
            .expect("recording service mutex poisoned")
            .push((notification.clone(), destination.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_informer_emits_added_then_updated() {
        let informer = InMemoryInformer::new();
        let events = informer.take_events().unwrap();
        informer.push(Resource::new("ns", "app"));
        informer.push(Resource::new("ns", "app").with_label("x", "y"));
        assert_eq!(events.recv().unwrap(), InformerEvent::Added(ResourceKey::new("ns", "app")));
        assert_eq!(events.recv().unwrap(), InformerEvent::Updated(ResourceKey::new("ns", "app")));
    }

    #[test]
    fn in_memory_client_applies_merge_patch() {
        let client = InMemoryResourceClient::new();
        client.seed(Resource::new("ns", "app").with_annotation("a", "1"));
        let patch = serde_json::json!({"metadata": {"annotations": {"a": null, "b": "2"}}});
        let patched = client.patch("ns", "app", &patch).unwrap();
        assert!(!patched.annotations.contains_key("a"));
        assert_eq!(patched.annotations.get("b"), Some(&"2".to_string()));
    }

    #[test]
    fn recording_service_records_every_send() {
        let service = RecordingNotificationService::new();
        let notification = crate::config::Notification { message: "hi".to_string(), title: None, fields: BTreeMap::new() };
        service.send(&notification, &crate::destination::Destination::new("mock", "r")).unwrap();
        assert_eq!(service.sent().len(), 1);
    }
}
