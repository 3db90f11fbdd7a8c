//! Identity service client
//!
//! Resolves actor IDs to display profiles and Ed25519 public keys
//! through the identity service's GraphQL endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::{AuthError, KeyResolver, sign_canonical};
use crate::error::AppError;

const PERSON_QUERY: &str = "query($id: ID!) {person(id: $id) {id name note}}";
const ECONOMIC_RESOURCE_QUERY: &str = "query($id: ID!) {economicResource(id: $id) {id name note}}";
const PUBLIC_KEY_QUERY: &str = "query($id: ID!) {person(id: $id) {eddsaPublicKey}}";

/// Display profile of a person or economic resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// GraphQL identity client
pub struct IdentityClient {
    http_client: Arc<reqwest::Client>,
    url: String,
    user: Option<String>,
    signing_key: Option<SigningKey>,
    signature_header: String,
}

impl IdentityClient {
    pub fn new(http_client: Arc<reqwest::Client>, url: String, signature_header: String) -> Self {
        Self {
            http_client,
            url,
            user: None,
            signing_key: None,
            signature_header,
        }
    }

    /// Send the user header with every query
    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    /// Sign every query with the instance key
    pub fn with_signing_key(mut self, key: Option<SigningKey>) -> Self {
        self.signing_key = key;
        self
    }

    pub async fn person(&self, id: &str) -> Result<Profile, AppError> {
        let data = self.query(PERSON_QUERY, id).await?;
        parse_profile(&data, "person", id)
    }

    pub async fn economic_resource(&self, id: &str) -> Result<Profile, AppError> {
        let data = self.query(ECONOMIC_RESOURCE_QUERY, id).await?;
        parse_profile(&data, "economicResource", id)
    }

    /// Base58 Ed25519 public key of a person
    pub async fn public_key(&self, id: &str) -> Result<String, AppError> {
        let data = self.query(PUBLIC_KEY_QUERY, id).await?;
        data.get("person")
            .and_then(|person| person.get("eddsaPublicKey"))
            .and_then(Value::as_str)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::Identity(format!("no public key for {}", id)))
    }

    /// Run a query with a single `$id` variable and return its `data` object
    async fn query(&self, query: &str, id: &str) -> Result<Value, AppError> {
        let body = serde_json::to_vec(&serde_json::json!({
            "query": query,
            "variables": { "id": id },
        }))?;

        let mut request = self
            .http_client
            .post(&self.url)
            .header("Content-Type", "application/json");

        if let Some(key) = &self.signing_key {
            request = request.header(self.signature_header.as_str(), sign_canonical(key, &body));
        }
        if let Some(user) = &self.user {
            request = request.header("zenflows-user", user);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::Identity(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Identity(format!(
                "identity service answered HTTP {}",
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| AppError::Identity(format!("invalid response: {}", e)))?;

        if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
            if let Some(first) = errors.first() {
                let message = first
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                return Err(AppError::Identity(message.to_string()));
            }
        }

        payload
            .get("data")
            .cloned()
            .filter(|data| data.is_object())
            .ok_or_else(|| AppError::Identity("response has no data".to_string()))
    }
}

fn parse_profile(data: &Value, field: &str, id: &str) -> Result<Profile, AppError> {
    let node = data
        .get(field)
        .filter(|node| !node.is_null())
        .ok_or_else(|| AppError::Identity(format!("{} {} not found", field, id)))?;

    serde_json::from_value(node.clone())
        .map_err(|e| AppError::Identity(format!("malformed {} {}: {}", field, id, e)))
}

#[async_trait]
impl KeyResolver for IdentityClient {
    async fn resolve(&self, actor_id: &str) -> Result<String, AuthError> {
        self.public_key(actor_id)
            .await
            .map_err(|e| AuthError::KeyLookupFailed(e.to_string()))
    }
}
