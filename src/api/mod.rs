//! API layer
//!
//! HTTP handlers for:
//! - Mailbox (private messages)
//! - ActivityPub (actors, inbox/outbox, collections)
//! - Metrics (Prometheus)

mod activitypub;
mod dto;
mod mailbox;
pub mod metrics;

pub use dto::*;

pub use activitypub::activitypub_router;
pub use mailbox::mailbox_router;
pub use metrics::metrics_router;
