//! Detached body signature verification
//!
//! A request proves control of an actor ID by carrying, in a header,
//! an Ed25519 signature over the canonical form of its raw body.
//! The public key of the claimed actor is resolved through a
//! [`KeyResolver`](super::KeyResolver).

use std::sync::Arc;

use axum::http::HeaderMap;
use base58::{FromBase58, ToBase58};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use thiserror::Error;

use super::KeyResolver;
use crate::metrics::AUTH_FAILURES_TOTAL;

/// Reasons an identity claim is rejected
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Could not resolve public key: {0}")]
    KeyLookupFailed(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Malformed signature header: {0}")]
    MalformedHeader(String),
}

impl AuthError {
    fn reason(&self) -> &'static str {
        match self {
            AuthError::KeyLookupFailed(_) => "key_lookup_failed",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::MalformedHeader(_) => "malformed_header",
        }
    }
}

/// Canonical encoding of a request body.
///
/// ASCII whitespace and ASCII control bytes are dropped; every other
/// byte is kept in order. Re-serialising JSON with different spacing
/// therefore yields the same canonical bytes.
pub fn canonicalize(body: &[u8]) -> Vec<u8> {
    body.iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace() && !b.is_ascii_control())
        .collect()
}

/// Sign the canonical form of `body`, returning the base64 signature
/// suitable for the signature header.
pub fn sign_canonical(key: &SigningKey, body: &[u8]) -> String {
    let signature = key.sign(&canonicalize(body));
    STANDARD.encode(signature.to_bytes())
}

/// Decode a base58 Ed25519 seed (32 bytes) into a signing key
pub fn signing_key_from_base58(seed: &str) -> Result<SigningKey, AuthError> {
    let bytes = seed
        .trim()
        .from_base58()
        .map_err(|e| AuthError::KeyLookupFailed(format!("seed is not base58: {:?}", e)))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| AuthError::KeyLookupFailed("seed must be 32 bytes".to_string()))?;
    Ok(SigningKey::from_bytes(&bytes))
}

/// Base58 encoding of the public half of `key`
pub fn public_key_base58(key: &SigningKey) -> String {
    key.verifying_key().to_bytes().to_base58()
}

fn parse_public_key(encoded: &str) -> Result<VerifyingKey, AuthError> {
    let bytes = encoded
        .trim()
        .from_base58()
        .map_err(|e| AuthError::KeyLookupFailed(format!("public key is not base58: {:?}", e)))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| AuthError::KeyLookupFailed("public key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| AuthError::KeyLookupFailed(format!("public key rejected: {}", e)))
}

fn parse_signature(header: Option<&str>) -> Result<Signature, AuthError> {
    let header = header
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AuthError::MalformedHeader("signature header is missing".to_string()))?;

    let bytes = STANDARD
        .decode(header)
        .map_err(|e| AuthError::MalformedHeader(format!("signature is not base64: {}", e)))?;
    let bytes: [u8; 64] = bytes.try_into().map_err(|bytes: Vec<u8>| {
        AuthError::MalformedHeader(format!(
            "signature must be 64 bytes, got {}",
            bytes.len()
        ))
    })?;

    Ok(Signature::from_bytes(&bytes))
}

/// Verifies sender/receiver identity claims
#[derive(Clone)]
pub struct AuthGate {
    resolver: Arc<dyn KeyResolver>,
    header_name: String,
}

impl AuthGate {
    pub fn new(resolver: Arc<dyn KeyResolver>, header_name: impl Into<String>) -> Self {
        Self {
            resolver,
            header_name: header_name.into(),
        }
    }

    /// Name of the header carrying the signature
    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    /// Verify that `body` was signed by the key controlling `claimed_actor`.
    ///
    /// The header is parsed first; a malformed header never triggers a
    /// key lookup.
    ///
    /// # Errors
    /// - `MalformedHeader` if the header is absent, not base64 or not 64 bytes
    /// - `KeyLookupFailed` if the key cannot be resolved or decoded
    /// - `InvalidSignature` if verification over the canonical body fails
    pub async fn authenticate(
        &self,
        claimed_actor: &str,
        body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<(), AuthError> {
        let result = self.verify(claimed_actor, body, signature_header).await;

        if let Err(ref error) = result {
            AUTH_FAILURES_TOTAL
                .with_label_values(&[error.reason()])
                .inc();
            tracing::debug!(actor = %claimed_actor, error = %error, "Identity claim rejected");
        }

        result
    }

    /// Same as [`authenticate`](Self::authenticate), reading the
    /// signature from the configured header.
    pub async fn authenticate_headers(
        &self,
        claimed_actor: &str,
        body: &[u8],
        headers: &HeaderMap,
    ) -> Result<(), AuthError> {
        let header = match headers.get(self.header_name.as_str()) {
            Some(value) => Some(value.to_str().map_err(|_| {
                AUTH_FAILURES_TOTAL
                    .with_label_values(&["malformed_header"])
                    .inc();
                AuthError::MalformedHeader("signature header is not ASCII".to_string())
            })?),
            None => None,
        };

        self.authenticate(claimed_actor, body, header).await
    }

    async fn verify(
        &self,
        claimed_actor: &str,
        body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<(), AuthError> {
        let signature = parse_signature(signature_header)?;

        let encoded_key = self.resolver.resolve(claimed_actor).await?;
        let public_key = parse_public_key(&encoded_key)?;

        public_key
            .verify_strict(&canonicalize(body), &signature)
            .map_err(|_| AuthError::InvalidSignature)
    }
}
