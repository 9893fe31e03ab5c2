//! Per-item reconciliation: the nine processing steps of §4.D.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{Api, ConditionResult};
use crate::destination::{dedup_destinations, Destination};
use crate::error::PatchError;
use crate::informer::ResourceInformer;
use crate::metrics::Metrics;
use crate::resource::{Resource, ResourceKey};
use crate::state::{ConditionIdentity, State};
use crate::subscription::{self, AnnotationPrefix};

use super::patch::build_annotation_patch;

/// A per-resource-type client exposing the merge-patch write path. Returns
/// the server's resulting object so the informer's local store can be kept
/// current without waiting for the next watch event.
pub trait ResourceClient: Send + Sync {
    fn patch(&self, namespace: &str, name: &str, merge_patch: &serde_json::Value) -> Result<Resource, String>;
}

/// Appends caller-supplied destinations to the computed set, before dedup.
pub trait AdditionalDestinations: Send + Sync {
    fn additional_destinations(&self, resource: &Resource, config: &crate::config::Config) -> Vec<Destination>;
}

/// Short-circuits a reconciliation before any trigger evaluation.
pub trait SkipProcessing: Send + Sync {
    fn skip_processing(&self, resource: &Resource) -> Option<String>;
}

/// Collaborators and configuration a single reconciliation needs. Built
/// once and shared (via `Arc`) across all worker threads.
pub struct ReconcileContext {
    pub informer: Arc<dyn ResourceInformer>,
    pub client: Arc<dyn ResourceClient>,
    pub factory: Arc<crate::config::ApiFactory>,
    pub prefix: AnnotationPrefix,
    pub metrics: Arc<Metrics>,
    pub additional_destinations: Option<Arc<dyn AdditionalDestinations>>,
    pub skip_processing: Option<Arc<dyn SkipProcessing>>,
}

/// Outcome of processing one work-queue item.
///
/// None of these trigger an explicit re-queue: a factory failure aborts the
/// item and waits for the next informer event, the same as every other
/// outcome here.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Dropped,
    Skipped,
    Processed,
    Aborted,
}

/// Runs steps 1-9 of §4.D for one resource key.
pub fn reconcile(ctx: &ReconcileContext, key: &ResourceKey) -> Outcome {
    let Some(original) = ctx.informer.get(key) else {
        debug!(key = %key, "resource no longer in informer index, dropping");
        return Outcome::Dropped;
    };

    let mut copy = original.deep_clone();

    if let Some(skip) = &ctx.skip_processing {
        if let Some(reason) = skip.skip_processing(&copy) {
            info!(key = %key, reason = %reason, "skipping reconciliation");
            return Outcome::Skipped;
        }
    }

    let api = match ctx.factory.get_apis_from_namespace(&copy.namespace) {
        Ok(apis) => match apis.get(&copy.namespace).cloned() {
            Some(api) => api,
            None => {
                warn!(key = %key, "factory returned no API for namespace");
                return Outcome::Aborted;
            }
        },
        Err(err) => {
            warn!(key = %key, error = %err, "failed to build API for namespace");
            return Outcome::Aborted;
        }
    };

    let destinations = compute_destinations(ctx, &api, &copy);
    let mut state = State::from_resource(&copy, &ctx.prefix);

    for (trigger, dests) in &destinations {
        let results = api.run_trigger(trigger, &copy.payload, &copy.labels, &copy.annotations);
        for result in results {
            ctx.metrics.record_trigger_eval(trigger, result.triggered);
            process_condition_result(ctx, &api, &mut copy, &mut state, trigger, &result, dests);
        }
    }

    state.persist(&mut copy, &ctx.prefix);

    match build_annotation_patch(&original.annotations, &copy.annotations) {
        None => Outcome::Processed,
        Some(patch) => match ctx.client.patch(&copy.namespace, &copy.name, &patch) {
            Ok(patched) => {
                ctx.informer.put(patched);
                Outcome::Processed
            }
            Err(reason) => {
                warn!(
                    key = %key,
                    error = %PatchError::Rejected {
                        namespace: copy.namespace.clone(),
                        name: copy.name.clone(),
                        reason: reason.clone(),
                    },
                    "annotation patch rejected"
                );
                Outcome::Processed
            }
        },
    }
}

fn compute_destinations(
    ctx: &ReconcileContext,
    api: &Api,
    resource: &Resource,
) -> std::collections::BTreeMap<String, Vec<Destination>> {
    let mut destinations = api.config().global_destinations(&resource.labels);

    let annotation_destinations = subscription::get_destinations(
        &resource.annotations,
        &ctx.prefix,
        &api.config().default_triggers,
        &api.config().service_default_triggers,
    );
    for (trigger, dests) in annotation_destinations {
        dedup_destinations(destinations.entry(trigger).or_default(), dests);
    }

    if let Some(hook) = &ctx.additional_destinations {
        let extra = hook.additional_destinations(resource, api.config());
        for dests in destinations.values_mut() {
            dedup_destinations(dests, extra.clone());
        }
    }

    for dests in destinations.values_mut() {
        crate::destination::dedup_in_place(dests);
    }

    destinations
}

fn process_condition_result(
    ctx: &ReconcileContext,
    api: &Api,
    resource: &mut Resource,
    state: &mut State,
    trigger: &str,
    result: &ConditionResult,
    destinations: &[Destination],
) {
    let now = now_unix();
    let cond = ConditionIdentity {
        condition_key: result.key.clone(),
        once_per: result.once_per.clone(),
    };

    if !result.triggered {
        for dest in destinations {
            state.set_already_notified(trigger, &cond, &dest.service, &dest.recipient, false, now);
        }
        return;
    }

    for dest in destinations {
        let changed = state.set_already_notified(trigger, &cond, &dest.service, &dest.recipient, true, now);
        if !changed {
            debug!(trigger = trigger, service = %dest.service, recipient = %dest.recipient, "suppressed, already notified");
            continue;
        }

        match api.send(&resource.payload, &result.templates, dest) {
            Ok(()) => {
                ctx.metrics.record_delivery(trigger, &dest.service, true);
            }
            Err(err) => {
                warn!(trigger = trigger, service = %dest.service, recipient = %dest.recipient, error = %err, "delivery failed, rolling back state");
                state.set_already_notified(trigger, &cond, &dest.service, &dest.recipient, false, now);
                ctx.metrics.record_delivery(trigger, &dest.service, false);
            }
        }
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
