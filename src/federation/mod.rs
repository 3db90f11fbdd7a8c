//! Federation module
//!
//! Handles:
//! - Activity processing (inbox/outbox state machine)
//! - Activity delivery to peer inboxes
//! - Identity service lookups (profiles, public keys)

mod activity;
mod delivery;
mod identity;

pub use activity::{Activity, ActivityKind, ActivityProcessor, ActorType};
pub use delivery::{ActivityDelivery, builder, peer_inbox};
pub use identity::{IdentityClient, Profile};
