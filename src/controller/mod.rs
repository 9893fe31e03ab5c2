//! The reconciliation controller: consumes work-queue items, evaluates
//! triggers, diffs against notified-state, dispatches deliveries, and
//! patches resource annotations.

pub mod patch;
pub mod reconcile;
pub mod run;

pub use patch::build_annotation_patch;
pub use reconcile::{reconcile, AdditionalDestinations, Outcome, ReconcileContext, ResourceClient, SkipProcessing};
pub use run::Controller;
