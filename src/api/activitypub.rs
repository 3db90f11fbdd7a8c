//! ActivityPub endpoints
//!
//! - Actor document (person / economic resource profile)
//! - Inbox (Follow, Accept)
//! - Outbox (Follow, Like)
//! - Liked, follower and following collections

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::{
    Router,
    extract::{Path, State},
    response::Json,
    routing::{get, post},
};
use http::HeaderMap;

use super::dto::*;
use super::mailbox::decode;
use crate::AppState;
use crate::error::AppError;
use crate::federation::{Activity, ActorType};
use crate::metrics::HTTP_REQUEST_DURATION_SECONDS;

/// Create ActivityPub router
///
/// Routes:
/// - GET /:type/:id - Actor document
/// - POST /:type/:id/inbox
/// - POST /:type/:id/outbox
/// - GET /:type/:id/liked
/// - GET /:type/:id/liked/:liked_id
/// - GET /:type/:id/follower
/// - GET /:type/:id/following
pub fn activitypub_router() -> Router<AppState> {
    Router::new()
        .route("/:type/:id", get(actor))
        .route("/:type/:id/inbox", post(inbox))
        .route("/:type/:id/outbox", post(outbox))
        .route("/:type/:id/liked", get(liked))
        .route("/:type/:id/liked/:liked_id", get(liked_item))
        .route("/:type/:id/follower", get(followers))
        .route("/:type/:id/following", get(following))
}

/// GET /:type/:id
///
/// Profile from the identity service, projected as an actor document.
async fn actor(
    State(state): State<AppState>,
    Path((actor_type, id)): Path<(String, String)>,
) -> Result<Json<ActorDocument>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/:type/:id"])
        .start_timer();

    let actor_type: ActorType = actor_type.parse()?;
    let profile = match actor_type {
        ActorType::Person => state.identity.person(&id).await?,
        ActorType::EconomicResource => state.identity.economic_resource(&id).await?,
    };

    let actor_url = state.activities.actor_url(actor_type, &id);

    Ok(Json(ActorDocument {
        success: true,
        context: "https://www.w3.org/ns/activitystreams".to_string(),
        kind: actor_type.as_object_type().to_string(),
        id: actor_url.clone(),
        name: profile.name,
        summary: profile.note.unwrap_or_default(),
        inbox: format!("{}/inbox", actor_url),
        outbox: format!("{}/outbox", actor_url),
        liked: format!("{}/liked", actor_url),
        followers: format!("{}/follower", actor_url),
        following: format!("{}/following", actor_url),
    }))
}

/// POST /:type/:id/inbox
///
/// Activities from peers. Trust rests on the activity fields: a Follow
/// must target this actor, an Accept must reference one of its Follows.
async fn inbox(
    State(state): State<AppState>,
    Path((actor_type, id)): Path<(String, String)>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<SuccessResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/:type/:id/inbox"])
        .start_timer();

    let actor_type: ActorType = actor_type.parse()?;
    let (_, activity): (_, Activity) = decode(body)?;

    state.activities.inbox(actor_type, &id, &activity).await?;

    Ok(Json(SuccessResponse::ok()))
}

/// POST /:type/:id/outbox
///
/// Activities from the local actor; the body must be signed by `:id`.
async fn outbox(
    State(state): State<AppState>,
    Path((actor_type, id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ActivityIdResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/:type/:id/outbox"])
        .start_timer();

    let actor_type: ActorType = actor_type.parse()?;
    let (body, activity): (_, Activity) = decode(body)?;
    activity.kind()?;
    state.auth.authenticate_headers(&id, &body, &headers).await?;

    let activity_id = state.activities.outbox(actor_type, &id, &activity).await?;

    Ok(Json(ActivityIdResponse {
        success: true,
        id: activity_id,
    }))
}

/// GET /:type/:id/liked
async fn liked(
    State(state): State<AppState>,
    Path((actor_type, id)): Path<(String, String)>,
) -> Result<Json<OrderedCollection>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/:type/:id/liked"])
        .start_timer();

    let actor_type: ActorType = actor_type.parse()?;
    let items = state.activities.liked(actor_type, &id).await?;
    let collection_id = format!("{}/liked", state.activities.actor_url(actor_type, &id));

    Ok(Json(OrderedCollection::new(collection_id, items)))
}

/// GET /:type/:id/liked/:liked_id
async fn liked_item(
    State(state): State<AppState>,
    Path((actor_type, id, liked_id)): Path<(String, String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/:type/:id/liked/:liked_id"])
        .start_timer();

    let actor_type: ActorType = actor_type.parse()?;
    let liked_id: i64 = liked_id.parse().map_err(|_| AppError::NotFound)?;

    let mut like = state
        .activities
        .liked_item(actor_type, &id, liked_id)
        .await?;
    like["success"] = serde_json::Value::Bool(true);

    Ok(Json(like))
}

/// GET /:type/:id/follower
async fn followers(
    State(state): State<AppState>,
    Path((actor_type, id)): Path<(String, String)>,
) -> Result<Json<OrderedCollection>, AppError> {
    follow_collection(state, actor_type, id, true).await
}

/// GET /:type/:id/following
async fn following(
    State(state): State<AppState>,
    Path((actor_type, id)): Path<(String, String)>,
) -> Result<Json<OrderedCollection>, AppError> {
    follow_collection(state, actor_type, id, false).await
}

async fn follow_collection(
    state: AppState,
    actor_type: String,
    id: String,
    want_followers: bool,
) -> Result<Json<OrderedCollection>, AppError> {
    let endpoint = if want_followers {
        "/:type/:id/follower"
    } else {
        "/:type/:id/following"
    };
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", endpoint])
        .start_timer();

    let actor_type: ActorType = actor_type.parse()?;
    let items = state
        .activities
        .follows(actor_type, &id, want_followers)
        .await?;
    let collection_id = format!(
        "{}{}",
        state.activities.actor_url(actor_type, &id),
        if want_followers { "/follower" } else { "/following" }
    );

    Ok(Json(OrderedCollection::new(collection_id, items)))
}
