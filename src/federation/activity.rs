//! Activity processing
//!
//! The follow/like state machine behind the `/{type}/{id}/inbox` and
//! `/{type}/{id}/outbox` endpoints. The processor keeps no state between
//! requests; everything is read from and written to the Storage Port.
//!
//! Follow relationships move `NONE -> PENDING -> ACCEPTED` and never back.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ActivityDelivery;
use super::delivery::builder;
use crate::data::{NewLike, Storage};
use crate::error::AppError;
use crate::metrics::ACTIVITIES_RECEIVED;

/// Supported activity types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    Follow,
    Accept,
    Like,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Follow => "Follow",
            ActivityKind::Accept => "Accept",
            ActivityKind::Like => "Like",
        }
    }
}

impl FromStr for ActivityKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Follow" => Ok(ActivityKind::Follow),
            "Accept" => Ok(ActivityKind::Accept),
            "Like" => Ok(ActivityKind::Like),
            other => Err(AppError::UnknownActivityType(other.to_string())),
        }
    }
}

/// Kinds of local actor addressed by the `{type}` path segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorType {
    Person,
    EconomicResource,
}

impl ActorType {
    /// Path segment
    pub fn as_path(&self) -> &'static str {
        match self {
            ActorType::Person => "person",
            ActorType::EconomicResource => "economicresource",
        }
    }

    /// ActivityStreams object type of the actor document
    pub fn as_object_type(&self) -> &'static str {
        match self {
            ActorType::Person => "Person",
            ActorType::EconomicResource => "Document",
        }
    }
}

impl FromStr for ActorType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "person" => Ok(ActorType::Person),
            "economicresource" => Ok(ActorType::EconomicResource),
            other => Err(AppError::UnknownActorType(other.to_string())),
        }
    }
}

/// Activity as received on an inbox or outbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "@context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(rename = "type")]
    pub kind: String,
    /// Ignored on create; ids are assigned by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub actor: String,
    /// Peer actor URL, liked resource URI, or an embedded activity
    pub object: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Activity {
    pub fn kind(&self) -> Result<ActivityKind, AppError> {
        self.kind.parse()
    }

    /// `object` as a URI: the string itself, or the `id` of an embedded object
    pub fn object_id(&self) -> Option<&str> {
        match &self.object {
            Value::String(id) => Some(id.as_str()),
            Value::Object(map) => map.get("id").and_then(Value::as_str),
            _ => None,
        }
    }

    fn require_object_id(&self) -> Result<&str, AppError> {
        self.object_id()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::Validation("Activity object must be a URI".to_string()))
    }
}

/// Activity processor
pub struct ActivityProcessor {
    storage: Arc<dyn Storage>,
    delivery: Arc<ActivityDelivery>,
    /// Instance base URL, e.g. "https://inbox.example.com"
    base_url: String,
}

impl ActivityProcessor {
    pub fn new(storage: Arc<dyn Storage>, delivery: Arc<ActivityDelivery>, base_url: String) -> Self {
        Self {
            storage,
            delivery,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// URL of a local actor: `{base_url}/{type}/{id}`
    pub fn actor_url(&self, actor_type: ActorType, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, actor_type.as_path(), id)
    }

    // =========================================================================
    // Outbox
    // =========================================================================

    /// Handle an activity posted by a local actor to its own outbox.
    ///
    /// Returns the URI of the stored Follow or Like.
    pub async fn outbox(
        &self,
        actor_type: ActorType,
        id: &str,
        activity: &Activity,
    ) -> Result<String, AppError> {
        let kind = activity.kind()?;
        let actor_url = self.actor_url(actor_type, id);

        if activity.actor != actor_url {
            return Err(AppError::Validation(format!(
                "Activity actor {} does not own outbox {}",
                activity.actor, actor_url
            )));
        }

        ACTIVITIES_RECEIVED
            .with_label_values(&["outbox", kind.as_str()])
            .inc();

        match kind {
            ActivityKind::Follow => self.send_follow(&actor_url, activity).await,
            ActivityKind::Like => self.record_like(&actor_url, activity).await,
            ActivityKind::Accept => Err(AppError::Validation(
                "Accept activities are sent by the server, not posted to an outbox".to_string(),
            )),
        }
    }

    async fn send_follow(&self, actor_url: &str, activity: &Activity) -> Result<String, AppError> {
        let object = activity.require_object_id()?;
        if object == actor_url {
            return Err(AppError::Validation("An actor cannot follow itself".to_string()));
        }

        let stored = self.storage.store_follower(actor_url, object).await?;
        let follow_uri = format!("{}/follow/{}", actor_url, stored.follow.id);

        if stored.follow.accepted {
            tracing::debug!(follow = %follow_uri, "Follow already accepted, not re-sending");
            return Ok(follow_uri);
        }

        tracing::info!(
            follow = %follow_uri,
            target = %object,
            created = stored.created,
            "Sending Follow"
        );

        let follow = builder::follow(&follow_uri, actor_url, object);
        self.delivery
            .deliver(ActivityKind::Follow, object, &follow)
            .await?;

        Ok(follow_uri)
    }

    async fn record_like(&self, actor_url: &str, activity: &Activity) -> Result<String, AppError> {
        let object = activity.require_object_id()?;

        let like_id = self
            .storage
            .actor_likes(&NewLike {
                actor: actor_url.to_string(),
                object: object.to_string(),
                summary: activity.summary.clone(),
            })
            .await?;

        tracing::info!(actor = %actor_url, object = %object, like_id, "Like recorded");
        Ok(format!("{}/liked/{}", actor_url, like_id))
    }

    // =========================================================================
    // Inbox
    // =========================================================================

    /// Handle an activity delivered to a local actor's inbox
    pub async fn inbox(
        &self,
        actor_type: ActorType,
        id: &str,
        activity: &Activity,
    ) -> Result<(), AppError> {
        let kind = activity.kind()?;
        let actor_url = self.actor_url(actor_type, id);

        if activity.actor.is_empty() {
            return Err(AppError::Validation("Activity actor is missing".to_string()));
        }

        ACTIVITIES_RECEIVED
            .with_label_values(&["inbox", kind.as_str()])
            .inc();

        match kind {
            ActivityKind::Follow => self.receive_follow(&actor_url, activity).await,
            ActivityKind::Accept => self.receive_accept(&actor_url, activity).await,
            ActivityKind::Like => Err(AppError::Validation(
                "Like activities are only accepted by outboxes".to_string(),
            )),
        }
    }

    async fn receive_follow(&self, actor_url: &str, activity: &Activity) -> Result<(), AppError> {
        let object = activity.require_object_id()?;
        if object != actor_url {
            return Err(AppError::Validation(format!(
                "Follow targets {}, not {}",
                object, actor_url
            )));
        }

        let stored = self.storage.store_follower(&activity.actor, actor_url).await?;
        tracing::info!(
            follower = %activity.actor,
            followee = %actor_url,
            created = stored.created,
            "Follow received"
        );

        let follow = serde_json::to_value(activity)?;
        let accept_uri = format!("{}/accept/{}", actor_url, stored.follow.id);
        let accept = builder::accept(&accept_uri, actor_url, follow);

        self.delivery
            .deliver(ActivityKind::Accept, &activity.actor, &accept)
            .await
    }

    async fn receive_accept(&self, actor_url: &str, activity: &Activity) -> Result<(), AppError> {
        let follow_uri = activity.require_object_id()?;
        let follow_id = parse_follow_id(actor_url, follow_uri)?;

        let follow = self.storage.find_follow(follow_id).await?;
        if follow.actor != actor_url || follow.object != activity.actor {
            return Err(AppError::Validation(format!(
                "Follow {} is not between {} and {}",
                follow_uri, actor_url, activity.actor
            )));
        }

        self.storage.accept_follower(follow_id).await?;
        tracing::info!(follower = %actor_url, followee = %activity.actor, "Follow accepted");
        Ok(())
    }

    // =========================================================================
    // Collections
    // =========================================================================

    /// URIs of the Likes recorded by a local actor
    pub async fn liked(&self, actor_type: ActorType, id: &str) -> Result<Vec<String>, AppError> {
        let actor_url = self.actor_url(actor_type, id);
        let ids = self.storage.find_actor_likes(&actor_url).await?;
        Ok(ids
            .into_iter()
            .map(|like_id| format!("{}/liked/{}", actor_url, like_id))
            .collect())
    }

    /// One Like of a local actor, rendered as an activity
    pub async fn liked_item(
        &self,
        actor_type: ActorType,
        id: &str,
        like_id: i64,
    ) -> Result<Value, AppError> {
        let actor_url = self.actor_url(actor_type, id);
        let record = self.storage.find_actor_like(like_id).await?;
        if record.actor != actor_url {
            return Err(AppError::NotFound);
        }

        Ok(builder::like(
            &format!("{}/liked/{}", actor_url, record.id),
            &record.actor,
            &record.object,
            record.summary.as_deref(),
        ))
    }

    /// Followers (`want_followers`) or followees of a local actor
    pub async fn follows(
        &self,
        actor_type: ActorType,
        id: &str,
        want_followers: bool,
    ) -> Result<Vec<String>, AppError> {
        let actor_url = self.actor_url(actor_type, id);
        self.storage
            .find_actor_follows(&actor_url, want_followers)
            .await
    }
}

/// Extract the numeric id from `{actor_url}/follow/{id}`
fn parse_follow_id(actor_url: &str, follow_uri: &str) -> Result<i64, AppError> {
    let suffix = follow_uri
        .strip_prefix(actor_url)
        .and_then(|rest| rest.strip_prefix("/follow/"))
        .ok_or_else(|| {
            AppError::Validation(format!(
                "Accept references {}, which is not a Follow of {}",
                follow_uri, actor_url
            ))
        })?;

    suffix
        .parse::<i64>()
        .map_err(|_| AppError::Validation(format!("Malformed Follow id {}", follow_uri)))
}
