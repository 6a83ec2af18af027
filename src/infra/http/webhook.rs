//! Change-notification webhook.

use axum::{
    body::{Body, to_bytes},
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::{info, warn};

use crate::application::error::HttpError;
use crate::application::signature::{self, SIGNATURE_HEADER};
use crate::cache::ChangeNotification;

use super::HttpState;

/// Largest webhook body accepted for verification.
pub const WEBHOOK_BODY_LIMIT: usize = 1024 * 1024;

const SOURCE: &str = "infra::http::webhook";

/// Reject requests whose body does not carry a valid signature.
///
/// The body is buffered, checked against the signature header and handed on
/// unchanged; nothing is parsed before the check succeeds.
pub async fn verify_signature(
    State(state): State<HttpState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, WEBHOOK_BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return HttpError::from_error(
                SOURCE,
                StatusCode::PAYLOAD_TOO_LARGE,
                "Payload too large",
                &err,
            )
            .into_response();
        }
    };

    let header = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    if let Err(err) = signature::verify(state.webhook_secret.as_deref(), header, &bytes) {
        warn!(
            target = "delivery_cache::webhook",
            reason = %err,
            body_len = bytes.len(),
            "Rejected webhook with invalid signature"
        );
        return HttpError::from(err).into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Invalidate every subject named by a verified notification.
pub async fn receive_notification(
    State(state): State<HttpState>,
    body: Bytes,
) -> Result<StatusCode, HttpError> {
    let notification: ChangeNotification = serde_json::from_slice(&body).map_err(|err| {
        HttpError::from_error(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Malformed notification",
            &err,
        )
    })?;

    let subjects = notification.subjects();
    info!(
        target = "delivery_cache::webhook",
        message_id = ?notification.message.id,
        kind = ?notification.message.kind,
        operation = ?notification.message.operation,
        subjects = subjects.len(),
        "Webhook received"
    );

    for subject in &subjects {
        state.cache.invalidate(subject);
    }

    Ok(StatusCode::OK)
}
