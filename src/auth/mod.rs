//! Request authentication
//!
//! Callers prove control of the `sender`/`receiver`/actor ID they claim
//! by signing the request body with the actor's Ed25519 key.

mod gate;
mod keys;

pub use gate::{
    AuthError, AuthGate, canonicalize, public_key_base58, sign_canonical, signing_key_from_base58,
};
#[cfg(test)]
pub use keys::MockKeyResolver;
pub use keys::{CachedKeyResolver, KeyResolver, StaticKeyResolver};
