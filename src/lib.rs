//! # notify-engine
//!
//! A reconciliation engine that watches resources, evaluates configurable
//! triggers against them, and dispatches notifications to subscribed
//! destinations — at most once per `(trigger, condition, destination)`,
//! tracked via a compact state record persisted on the resource's own
//! annotations.
//!
//! ## Core concepts
//!
//! - **Resource**: the identity/labels/annotations/payload tuple the engine
//!   reconciles; the payload is an opaque [`value::Value`] tree.
//! - **Subscription**: an annotation-encoded binding from trigger(s) to
//!   `(service, recipient)` destinations (see [`subscription`]).
//! - **Trigger**: a named set of [`config::Condition`]s, each a small
//!   expression (see [`expr`]) producing a [`config::ConditionResult`].
//! - **Notified-state**: the per-resource delivery history enforcing
//!   at-most-once delivery (see [`state`]).
//! - **Api**: the live, per-namespace snapshot of services/templates/
//!   triggers built by the [`config::ApiFactory`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use notify_engine::controller::{Controller, ReconcileContext};
//! use notify_engine::queue::WorkQueue;
//!
//! let ctx = std::sync::Arc::new(build_reconcile_context());
//! let queue = std::sync::Arc::new(WorkQueue::new());
//! let controller = Controller::run(ctx, queue, 4);
//! // ... feed informer events into `queue.add(key)` ...
//! controller.shutdown();
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod controller;
pub mod destination;
pub mod error;
pub mod expr;
pub mod informer;
pub mod metrics;
pub mod queue;
pub mod resource;
pub mod service;
pub mod state;
pub mod subscription;
pub mod value;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::{Api, ApiFactory, Config};
pub use controller::{Controller, ReconcileContext};
pub use destination::Destination;
pub use error::{NotifyError, NotifyResult};
pub use informer::{InformerEvent, ResourceInformer};
pub use metrics::Metrics;
pub use queue::WorkQueue;
pub use resource::{Resource, ResourceKey};
pub use service::NotificationService;
pub use state::State;
pub use subscription::AnnotationPrefix;
pub use value::Value;
