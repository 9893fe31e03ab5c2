//! The live, immutable API object a factory hands back per namespace.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{DeliveryError, NotifyResult};
use crate::value::Value;

use super::model::{Condition, Config, ConditionResult, Notification};
use crate::expr::{eval_bool, EvalContext};
use crate::service::NotificationService;

/// A live, immutable snapshot of one namespace's configuration plus its
/// bound notification services. Safe to share across worker threads via
/// `Arc` once built.
pub struct Api {
    config: Config,
    services: BTreeMap<String, std::sync::Arc<dyn NotificationService>>,
}

impl Api {
    #[must_use]
    pub fn new(config: Config, services: BTreeMap<String, std::sync::Arc<dyn NotificationService>>) -> Self {
        Self { config, services }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn get_notification_services(&self) -> &BTreeMap<String, std::sync::Arc<dyn NotificationService>> {
        &self.services
    }

    /// Evaluates every [`Condition`] registered under `trigger_name` against
    /// `payload`/`labels`/`annotations`. A single condition's evaluation
    /// error is logged and that condition is skipped — it never aborts
    /// sibling conditions (§7 error taxonomy, item 2).
    #[must_use]
    pub fn run_trigger(
        &self,
        trigger_name: &str,
        payload: &Value,
        labels: &BTreeMap<String, String>,
        annotations: &BTreeMap<String, String>,
    ) -> Vec<ConditionResult> {
        let Some(conditions) = self.config.triggers.get(trigger_name) else {
            return Vec::new();
        };

        let ctx = EvalContext { payload, labels, annotations };
        conditions
            .iter()
            .enumerate()
            .filter_map(|(idx, condition)| self.eval_condition(trigger_name, idx, condition, &ctx))
            .collect()
    }

    fn eval_condition(
        &self,
        trigger_name: &str,
        idx: usize,
        condition: &Condition,
        ctx: &EvalContext,
    ) -> Option<ConditionResult> {
        match eval_bool(&condition.when, ctx) {
            Ok(triggered) => Some(ConditionResult {
                triggered,
                key: idx.to_string(),
                templates: condition.send.clone(),
                once_per: condition.once_per.clone().unwrap_or_default(),
            }),
            Err(err) => {
                debug!(trigger = trigger_name, index = idx, error = %err, "trigger condition evaluation failed");
                None
            }
        }
    }

    /// Sends every template named by `templates` to `destination`.
    pub fn send(
        &self,
        payload: &Value,
        templates: &[String],
        destination: &crate::destination::Destination,
    ) -> NotifyResult<()> {
        let service = self
            .services
            .get(&destination.service)
            .ok_or_else(|| DeliveryError::UnknownService {
                service: destination.service.clone(),
            })?;

        for template_name in templates {
            let notification = self
                .config
                .templates
                .get(template_name)
                .cloned()
                .unwrap_or_default()
                .render(payload);
            service
                .send(&notification, destination)
                .map_err(|err| DeliveryError::SendFailed {
                    service: destination.service.clone(),
                    recipient: destination.recipient.clone(),
                    reason: err.to_string(),
                })?;
        }
        Ok(())
    }
}
