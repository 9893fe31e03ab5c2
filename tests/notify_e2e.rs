//! End-to-end reconciliation scenarios, driven entirely through the public
//! API and the `test-support` in-memory collaborators.

use std::collections::BTreeMap;
use std::sync::Arc;

use notify_engine::config::{ApiFactory, DefaultConfigParser, Settings};
use notify_engine::controller::{reconcile, Outcome, ReconcileContext};
use notify_engine::resource::Resource;
use notify_engine::subscription::AnnotationPrefix;
use notify_engine::test_support::{InMemoryInformer, InMemoryResourceClient, RecordingApiBuilder, RecordingNotificationService, StaticDocumentSource};
use notify_engine::Metrics;

fn trigger_doc(trigger_yaml: &str) -> BTreeMap<String, String> {
    let mut doc = BTreeMap::new();
    doc.insert("service.mock".to_string(), "{}".to_string());
    doc.insert("trigger.my-trigger".to_string(), trigger_yaml.to_string());
    doc.insert(
        "template.test".to_string(),
        "message: hello\n".to_string(),
    );
    doc
}

fn build_context(
    config_doc: BTreeMap<String, String>,
    informer: Arc<InMemoryInformer>,
    client: Arc<InMemoryResourceClient>,
    service: Arc<RecordingNotificationService>,
) -> Arc<ReconcileContext> {
    let registry = prometheus::Registry::new();
    let factory = ApiFactory::new(
        Settings {
            config_map_name: "notifications-cm".to_string(),
            secret_name: "notifications-secret".to_string(),
            default_namespace: "default".to_string(),
        },
        Box::new(StaticDocumentSource::new().with("default", "notifications-cm", config_doc)),
        Box::new(StaticDocumentSource::new()),
        Box::new(DefaultConfigParser),
        Box::new(RecordingApiBuilder { service }),
    );

    Arc::new(ReconcileContext {
        informer,
        client,
        factory: Arc::new(factory),
        prefix: AnnotationPrefix::default(),
        metrics: Arc::new(Metrics::register(&registry, "test").unwrap()),
        additional_destinations: None,
        skip_processing: None,
    })
}

#[test]
fn send_when_triggered() {
    let informer = Arc::new(InMemoryInformer::new());
    let client = Arc::new(InMemoryResourceClient::new());
    let service = Arc::new(RecordingNotificationService::new());

    let resource = Resource::new("default", "app")
        .with_annotation("notifications.argoproj.io/subscribe.my-trigger.mock", "recipient")
        .with_payload(notify_engine::Value::Map(BTreeMap::from([(
            "status".to_string(),
            notify_engine::Value::Map(BTreeMap::from([(
                "phase".to_string(),
                notify_engine::Value::String("Failed".to_string()),
            )])),
        )])));
    informer.push(resource.clone());
    client.seed(resource.clone());

    let doc = trigger_doc("- when: \"payload.status.phase == 'Failed'\"\n  send: [test]\n");
    let ctx = build_context(doc, informer.clone(), client.clone(), service.clone());

    let outcome = reconcile(&ctx, &resource.key());
    assert_eq!(outcome, Outcome::Processed);
    assert_eq!(service.sent().len(), 1);

    let patched = client.patch("default", "app", &serde_json::json!({})).unwrap();
    let state_raw = patched.annotations.get("notified.notifications.argoproj.io").unwrap();
    assert!(state_raw.contains("my-trigger:0:mock:recipient"));
}

#[test]
fn suppression_by_existing_state() {
    let informer = Arc::new(InMemoryInformer::new());
    let client = Arc::new(InMemoryResourceClient::new());
    let service = Arc::new(RecordingNotificationService::new());

    let notified = serde_json::json!({"my-trigger:0:mock:recipient": 1}).to_string();
    let resource = Resource::new("default", "app")
        .with_annotation("notifications.argoproj.io/subscribe.my-trigger.mock", "recipient")
        .with_annotation("notified.notifications.argoproj.io", notified)
        .with_payload(notify_engine::Value::Map(BTreeMap::from([(
            "status".to_string(),
            notify_engine::Value::Map(BTreeMap::from([(
                "phase".to_string(),
                notify_engine::Value::String("Failed".to_string()),
            )])),
        )])));
    informer.push(resource.clone());
    client.seed(resource.clone());

    let doc = trigger_doc("- when: \"payload.status.phase == 'Failed'\"\n  send: [test]\n");
    let ctx = build_context(doc, informer, client, service.clone());

    let outcome = reconcile(&ctx, &resource.key());
    assert_eq!(outcome, Outcome::Processed);
    assert!(service.sent().is_empty());
}

#[test]
fn state_cleared_when_no_longer_triggered() {
    let informer = Arc::new(InMemoryInformer::new());
    let client = Arc::new(InMemoryResourceClient::new());
    let service = Arc::new(RecordingNotificationService::new());

    let notified = serde_json::json!({"my-trigger:0:mock:recipient": 1}).to_string();
    let resource = Resource::new("default", "app")
        .with_annotation("notifications.argoproj.io/subscribe.my-trigger.mock", "recipient")
        .with_annotation("notified.notifications.argoproj.io", notified)
        .with_payload(notify_engine::Value::Map(BTreeMap::from([(
            "status".to_string(),
            notify_engine::Value::Map(BTreeMap::from([(
                "phase".to_string(),
                notify_engine::Value::String("Synced".to_string()),
            )])),
        )])));
    informer.push(resource.clone());
    client.seed(resource.clone());

    let doc = trigger_doc("- when: \"payload.status.phase == 'Failed'\"\n  send: [test]\n");
    let ctx = build_context(doc, informer, client.clone(), service.clone());

    reconcile(&ctx, &resource.key());
    assert!(service.sent().is_empty());

    let patched = client.patch("default", "app", &serde_json::json!({})).unwrap();
    assert!(!patched.annotations.contains_key("notified.notifications.argoproj.io"));
}

#[test]
fn rollback_on_delivery_error() {
    struct FailingService;
    impl notify_engine::NotificationService for FailingService {
        fn send(&self, _n: &notify_engine::config::Notification, _d: &notify_engine::Destination) -> notify_engine::NotifyResult<()> {
            Err(notify_engine::NotifyError::internal("delivery boom"))
        }
    }
    struct FailingBuilder;
    impl notify_engine::config::ApiBuilder for FailingBuilder {
        fn build(&self, config: notify_engine::Config) -> notify_engine::Api {
            let services = config
                .services
                .keys()
                .map(|name| (name.clone(), Arc::new(FailingService) as Arc<dyn notify_engine::NotificationService>))
                .collect();
            notify_engine::Api::new(config, services)
        }
    }

    let informer = Arc::new(InMemoryInformer::new());
    let client = Arc::new(InMemoryResourceClient::new());

    let resource = Resource::new("default", "app")
        .with_annotation("notifications.argoproj.io/subscribe.my-trigger.mock", "recipient")
        .with_payload(notify_engine::Value::Map(BTreeMap::from([(
            "status".to_string(),
            notify_engine::Value::Map(BTreeMap::from([(
                "phase".to_string(),
                notify_engine::Value::String("Failed".to_string()),
            )])),
        )])));
    informer.push(resource.clone());
    client.seed(resource.clone());

    let doc = trigger_doc("- when: \"payload.status.phase == 'Failed'\"\n  send: [test]\n");
    let registry = prometheus::Registry::new();
    let factory = ApiFactory::new(
        Settings {
            config_map_name: "notifications-cm".to_string(),
            secret_name: "notifications-secret".to_string(),
            default_namespace: "default".to_string(),
        },
        Box::new(StaticDocumentSource::new().with("default", "notifications-cm", doc)),
        Box::new(StaticDocumentSource::new()),
        Box::new(DefaultConfigParser),
        Box::new(FailingBuilder),
    );
    let ctx = Arc::new(ReconcileContext {
        informer,
        client: client.clone(),
        factory: Arc::new(factory),
        prefix: AnnotationPrefix::default(),
        metrics: Arc::new(Metrics::register(&registry, "test").unwrap()),
        additional_destinations: None,
        skip_processing: None,
    });

    reconcile(&ctx, &resource.key());

    let patched = client.patch("default", "app", &serde_json::json!({})).unwrap();
    assert!(!patched.annotations.contains_key("notified.notifications.argoproj.io"));
}

#[test]
fn once_per_stickiness_survives_untriggered_reconciliation() {
    let informer = Arc::new(InMemoryInformer::new());
    let client = Arc::new(InMemoryResourceClient::new());
    let service = Arc::new(RecordingNotificationService::new());

    let resource = Resource::new("default", "app")
        .with_annotation("notifications.argoproj.io/subscribe.my-trigger.mock", "recipient")
        .with_payload(notify_engine::Value::Map(BTreeMap::from([(
            "status".to_string(),
            notify_engine::Value::Map(BTreeMap::from([(
                "phase".to_string(),
                notify_engine::Value::String("Failed".to_string()),
            )])),
        )])));
    informer.push(resource.clone());
    client.seed(resource.clone());

    let doc = trigger_doc("- when: \"payload.status.phase == 'Failed'\"\n  send: [test]\n  oncePer: abc\n");
    let ctx = build_context(doc, informer.clone(), client.clone(), service.clone());

    reconcile(&ctx, &resource.key());
    assert_eq!(service.sent().len(), 1);

    let after_first = client.patch("default", "app", &serde_json::json!({})).unwrap();
    informer.push(after_first.clone());

    let untriggered = after_first
        .clone()
        .with_payload(notify_engine::Value::Map(BTreeMap::from([(
            "status".to_string(),
            notify_engine::Value::Map(BTreeMap::from([(
                "phase".to_string(),
                notify_engine::Value::String("Synced".to_string()),
            )])),
        )])));
    informer.push(untriggered.clone());
    client.seed(untriggered.clone());

    reconcile(&ctx, &untriggered.key());
    assert_eq!(service.sent().len(), 1, "oncePer delivery must not repeat or roll back");

    let patched = client.patch("default", "app", &serde_json::json!({})).unwrap();
    assert!(patched
        .annotations
        .get("notified.notifications.argoproj.io")
        .unwrap()
        .contains("abc:my-trigger:0:mock:recipient"));
}

/// A [`notify_engine::config::DocumentSource`] whose documents can be
/// swapped in place, so a test can simulate a ConfigMap update landing
/// between two fetches through the *same* factory.
struct MutableDocumentSource {
    documents: std::sync::Mutex<BTreeMap<(String, String), BTreeMap<String, String>>>,
}

impl MutableDocumentSource {
    fn new() -> Self {
        Self { documents: std::sync::Mutex::new(BTreeMap::new()) }
    }

    fn set(&self, namespace: &str, name: &str, data: BTreeMap<String, String>) {
        self.documents
            .lock()
            .unwrap()
            .insert((namespace.to_string(), name.to_string()), data);
    }
}

impl notify_engine::config::DocumentSource for MutableDocumentSource {
    fn get(&self, namespace: &str, name: &str) -> Result<Option<BTreeMap<String, String>>, String> {
        Ok(self.documents.lock().unwrap().get(&(namespace.to_string(), name.to_string())).cloned())
    }
}

#[test]
fn factory_invalidation_rebuilds_notification_services() {
    let service = Arc::new(RecordingNotificationService::new());

    let config_maps = Arc::new(MutableDocumentSource::new());
    let mut cm_data = BTreeMap::new();
    cm_data.insert("service.slack".to_string(), "{}".to_string());
    config_maps.set("default", "notifications-cm", cm_data);

    struct SharedSource(Arc<MutableDocumentSource>);
    impl notify_engine::config::DocumentSource for SharedSource {
        fn get(&self, namespace: &str, name: &str) -> Result<Option<BTreeMap<String, String>>, String> {
            self.0.get(namespace, name)
        }
    }

    let factory = ApiFactory::new(
        Settings {
            config_map_name: "notifications-cm".to_string(),
            secret_name: "notifications-secret".to_string(),
            default_namespace: "default".to_string(),
        },
        Box::new(SharedSource(config_maps.clone())),
        Box::new(StaticDocumentSource::new()),
        Box::new(DefaultConfigParser),
        Box::new(RecordingApiBuilder { service }),
    );

    let api = factory.get_api().unwrap();
    assert!(api.get_notification_services().contains_key("slack"));

    // Simulate a ConfigMap update swapping `slack` for `email`, then
    // invalidate and re-fetch through the same factory: this is the
    // invalidate-then-rebuild transition the test is meant to cover.
    let mut cm_data_v2 = BTreeMap::new();
    cm_data_v2.insert("service.email".to_string(), "{}".to_string());
    config_maps.set("default", "notifications-cm", cm_data_v2);
    factory.invalidate("default");

    let api_v2 = factory.get_api().unwrap();
    assert!(api_v2.get_notification_services().contains_key("email"));
    assert!(!api_v2.get_notification_services().contains_key("slack"));
}
