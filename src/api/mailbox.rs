//! Mailbox endpoints
//!
//! - POST /send
//! - POST /read
//! - POST /set-read
//! - POST /count-unread
//! - POST /delete
//!
//! Each request is decoded, validated, then authenticated against the
//! `sender` or `receiver` it claims before storage is touched.

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::{Router, extract::State, http::StatusCode, response::Json, routing::post};
use http::HeaderMap;
use serde::de::DeserializeOwned;

use super::dto::*;
use crate::AppState;
use crate::data::Message;
use crate::error::AppError;
use crate::metrics::HTTP_REQUEST_DURATION_SECONDS;

/// Create mailbox router
pub fn mailbox_router() -> Router<AppState> {
    Router::new()
        .route("/send", post(send))
        .route("/read", post(read))
        .route("/set-read", post(set_read))
        .route("/count-unread", post(count_unread))
        .route("/delete", post(delete))
}

/// Raw body plus its decoded form
pub(super) fn decode<T: DeserializeOwned>(
    body: Result<Bytes, BytesRejection>,
) -> Result<(Bytes, T), AppError> {
    let body = body.map_err(|e| match e.status() {
        StatusCode::PAYLOAD_TOO_LARGE => AppError::PayloadTooLarge(e.body_text()),
        _ => AppError::BodyRead(e.body_text()),
    })?;
    let decoded = serde_json::from_slice(&body)?;
    Ok((body, decoded))
}

/// POST /send
async fn send(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<SendResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/send"])
        .start_timer();

    let (body, message): (_, Message) = decode(body)?;
    message.validate()?;
    state
        .auth
        .authenticate_headers(&message.sender, &body, &headers)
        .await?;

    let outcome = state.mailbox.send(message).await?;

    Ok(Json(SendResponse {
        success: true,
        count: outcome.delivered,
        failed: outcome.failed,
    }))
}

/// POST /read
async fn read(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ReadResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/read"])
        .start_timer();

    let (body, request): (_, ReadRequest) = decode(body)?;
    state
        .auth
        .authenticate_headers(&request.receiver, &body, &headers)
        .await?;

    let messages = state
        .mailbox
        .read(&request.receiver, request.only_unread)
        .await?;

    Ok(Json(ReadResponse {
        success: true,
        request_id: request.request_id,
        messages,
    }))
}

/// POST /set-read
async fn set_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<SuccessResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/set-read"])
        .start_timer();

    let (body, request): (_, SetReadRequest) = decode(body)?;
    state
        .auth
        .authenticate_headers(&request.receiver, &body, &headers)
        .await?;

    state
        .mailbox
        .set_read(&request.receiver, request.message_id, request.read)
        .await?;

    Ok(Json(SuccessResponse::ok()))
}

/// POST /count-unread
///
/// The count saturates at `storage.scan_limit`.
async fn count_unread(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<CountResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/count-unread"])
        .start_timer();

    let (body, request): (_, CountUnreadRequest) = decode(body)?;
    state
        .auth
        .authenticate_headers(&request.receiver, &body, &headers)
        .await?;

    let count = state.mailbox.count_unread(&request.receiver).await?;

    Ok(Json(CountResponse {
        success: true,
        count,
    }))
}

/// POST /delete
async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<SuccessResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/delete"])
        .start_timer();

    let (body, request): (_, DeleteRequest) = decode(body)?;
    state
        .auth
        .authenticate_headers(&request.receiver, &body, &headers)
        .await?;

    state
        .mailbox
        .delete(&request.receiver, request.message_id)
        .await?;

    Ok(Json(SuccessResponse::ok()))
}
