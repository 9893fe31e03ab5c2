//! Namespace -> [`Api`] cache, invalidated by ConfigMap/Secret change events.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::error::{ConfigError, NotifyResult};

use super::api::Api;
use super::parser::ConfigParser;

/// A namespace-scoped indexed lookup over ConfigMap-like or Secret-like
/// objects, keyed by object name. `NotFound` is represented as `Ok(None)`;
/// any other failure is `Err`.
pub trait DocumentSource: Send + Sync {
    fn get(&self, namespace: &str, name: &str) -> Result<Option<BTreeMap<String, String>>, String>;
}

/// Construction-time settings for the factory.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_map_name: String,
    pub secret_name: String,
    pub default_namespace: String,
}

/// Builds a [`Api`] for a namespace from its ConfigMap/Secret pair, wiring
/// up whatever `NotificationService` instances the embedder provides.
pub trait ApiBuilder: Send + Sync {
    fn build(&self, config: super::model::Config) -> Api;
}

enum CacheEntry {
    Live(Arc<Api>),
    Invalidated,
}

/// Maintains `apiMap: namespace -> Api|nil`, guarded by a single mutex. A
/// missing entry means "never built"; an [`CacheEntry::Invalidated`] entry
/// means "rebuild on next access".
pub struct ApiFactory {
    settings: Settings,
    config_maps: Box<dyn DocumentSource>,
    secrets: Box<dyn DocumentSource>,
    parser: Box<dyn ConfigParser>,
    builder: Box<dyn ApiBuilder>,
    cache: Mutex<BTreeMap<String, CacheEntry>>,
}

impl ApiFactory {
    #[must_use]
    pub fn new(
        settings: Settings,
        config_maps: Box<dyn DocumentSource>,
        secrets: Box<dyn DocumentSource>,
        parser: Box<dyn ConfigParser>,
        builder: Box<dyn ApiBuilder>,
    ) -> Self {
        Self {
            settings,
            config_maps,
            secrets,
            parser,
            builder,
            cache: Mutex::new(BTreeMap::new()),
        }
    }

    /// Marks `namespace`'s cached API for rebuild. Called by the ConfigMap
    /// and Secret event handlers; invalidation is scoped to the object's own
    /// namespace only.
    pub fn invalidate(&self, namespace: &str) {
        self.cache
            .lock()
            .expect("factory cache mutex poisoned")
            .insert(namespace.to_string(), CacheEntry::Invalidated);
    }

    /// Equivalent to `get_apis_from_namespace(DefaultNamespace)`, returning
    /// just the default-namespace entry.
    pub fn get_api(&self) -> NotifyResult<Arc<Api>> {
        let default_namespace = self.settings.default_namespace.clone();
        let mut apis = self.get_apis_from_namespace(&default_namespace)?;
        apis.remove(&default_namespace)
            .ok_or_else(|| ConfigError::ParseFailed { reason: "default namespace API missing after build".to_string() }.into())
    }

    /// Builds (or returns cached) APIs for `ns`, and for `DefaultNamespace`
    /// when it differs from `ns`.
    pub fn get_apis_from_namespace(&self, ns: &str) -> NotifyResult<BTreeMap<String, Arc<Api>>> {
        let mut lookup = vec![ns.to_string()];
        if ns != self.settings.default_namespace {
            lookup.push(self.settings.default_namespace.clone());
        }

        let mut out = BTreeMap::new();
        let mut first_error: Option<String> = None;
        let mut attempted = 0usize;
        let mut failed = 0usize;

        for namespace in lookup {
            attempted += 1;
            match self.build_one(&namespace) {
                Ok(api) => {
                    out.insert(namespace, api);
                }
                Err(err) => {
                    failed += 1;
                    warn!(namespace = %namespace, error = %err, "failed to build namespace API");
                    if first_error.is_none() {
                        first_error = Some(err.to_string());
                    }
                }
            }
        }

        if let Some(first_reason) = first_error {
            return Err(ConfigError::PartialFailure {
                failed_count: failed,
                attempted_count: attempted,
                first_reason,
            }
            .into());
        }

        Ok(out)
    }

    fn build_one(&self, namespace: &str) -> NotifyResult<Arc<Api>> {
        {
            let cache = self.cache.lock().expect("factory cache mutex poisoned");
            if let Some(CacheEntry::Live(api)) = cache.get(namespace) {
                return Ok(api.clone());
            }
        }

        let config_map = self
            .config_maps
            .get(namespace, &self.settings.config_map_name)
            .map_err(|reason| ConfigError::LoadFailed {
                kind: "configmap",
                name: self.settings.config_map_name.clone(),
                namespace: namespace.to_string(),
                reason,
            })?
            .unwrap_or_default();

        let secret = self
            .secrets
            .get(namespace, &self.settings.secret_name)
            .map_err(|reason| ConfigError::LoadFailed {
                kind: "secret",
                name: self.settings.secret_name.clone(),
                namespace: namespace.to_string(),
                reason,
            })?
            .unwrap_or_default();

        let mut config = self.parser.parse(&config_map, &secret)?;
        if namespace != self.settings.default_namespace {
            config.is_self_service_config = true;
        }

        let api = Arc::new(self.builder.build(config));
        self.cache
            .lock()
            .expect("factory cache mutex poisoned")
            .insert(namespace.to_string(), CacheEntry::Live(api.clone()));
        Ok(api)
    }
}
