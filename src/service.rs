//! The notification-service adapter seam.
//!
//! Concrete service integrations (Slack, email, webhook, ...) are external
//! collaborators, out of scope for this engine; it only depends on this
//! trait's contract.

use crate::config::Notification;
use crate::destination::Destination;
use crate::error::NotifyResult;

/// Sends a rendered [`Notification`] to one [`Destination`]. Implementors
/// own all service-specific transport, auth, and retry concerns; a returned
/// error is treated as a delivery failure and triggers state rollback.
pub trait NotificationService: Send + Sync {
    fn send(&self, notification: &Notification, destination: &Destination) -> NotifyResult<()>;
}
