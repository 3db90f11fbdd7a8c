//! Service layer
//!
//! Contains business logic separated from HTTP handlers.

mod mailbox;

pub use mailbox::MailboxService;
