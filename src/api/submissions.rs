use crate::store::{InsertOutcome, SubmissionStore};
use crate::submission::{is_honeypot_tripped, DemoSubmission, ValidationError, WaitlistSubmission};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info};

use super::health::health;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SubmissionStore>,
    /// Bodies above this size are rejected before decoding
    pub max_body_bytes: usize,
}

/// Body of every JSON response from the submission endpoints
#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

/// Create API router with the submission endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/waitlist", post(submit_waitlist))
        .route("/api/demo", post(submit_demo))
        .route("/health", get(health))
        .with_state(Arc::new(state))
}

/// POST /api/waitlist - Join the waitlist
async fn submit_waitlist(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let fields = decode_fields(&body, state.max_body_bytes)?;

    // Bots get a 200 so they cannot tell they were caught
    if is_honeypot_tripped(&fields) {
        info!(endpoint = "waitlist", "Honeypot tripped, discarding submission");
        return Ok(StatusCode::OK.into_response());
    }

    let new = WaitlistSubmission::from_fields(&fields).validate()?;

    let outcome = state.store.insert_waitlist(&new).map_err(|e| {
        error!(error = %e, "Failed to write waitlist entry");
        ApiError::Internal
    })?;

    match outcome {
        InsertOutcome::Created(entry) => {
            info!(id = %entry.id, "Waitlist entry created");
            Ok(created("Success! You have been added to the waitlist."))
        }
        InsertOutcome::Duplicate => Err(ApiError::Conflict(
            "This email is already on the waitlist.",
        )),
    }
}

/// POST /api/demo - Request a demo
async fn submit_demo(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let fields = decode_fields(&body, state.max_body_bytes)?;

    if is_honeypot_tripped(&fields) {
        info!(endpoint = "demo", "Honeypot tripped, discarding submission");
        return Ok(StatusCode::OK.into_response());
    }

    let new = DemoSubmission::from_fields(&fields).validate()?;

    let outcome = state.store.insert_demo_request(&new).map_err(|e| {
        error!(error = %e, "Failed to write demo request");
        ApiError::Internal
    })?;

    match outcome {
        InsertOutcome::Created(request) => {
            info!(id = %request.id, urgency = %new.urgency, "Demo request created");
            Ok(created(
                "Success! We will contact you soon to schedule your demo.",
            ))
        }
        InsertOutcome::Duplicate => Err(ApiError::Conflict(
            "A demo request for this email already exists.",
        )),
    }
}

/// Size-check the body and decode it as a JSON object.
fn decode_fields(body: &Bytes, limit: usize) -> Result<Map<String, Value>, ApiError> {
    if body.len() > limit {
        return Err(ApiError::PayloadTooLarge);
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => Ok(fields),
        _ => Err(ApiError::InvalidBody),
    }
}

fn created(message: &str) -> Response {
    (
        StatusCode::CREATED,
        Json(MessageResponse {
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Application error types
#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationError),
    InvalidBody,
    PayloadTooLarge,
    Conflict(&'static str),
    /// Cause is logged where it happens, never returned
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::InvalidBody => (
                StatusCode::BAD_REQUEST,
                "Request body must be valid JSON.".to_string(),
            ),
            ApiError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body is too large.".to_string(),
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.to_string()),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal server error occurred.".to_string(),
            ),
        };
        (status, Json(MessageResponse { message })).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Validation(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_oversized_body() {
        let body = Bytes::from_static(b"{\"email\":\"a@x.com\"}");
        assert!(matches!(
            decode_fields(&body, 4),
            Err(ApiError::PayloadTooLarge)
        ));
    }

    #[test]
    fn test_decode_requires_object() {
        let raws: [&[u8]; 4] = [b"[]", b"\"a@x.com\"", b"not json", b""];
        for raw in raws {
            let body = Bytes::copy_from_slice(raw);
            assert!(matches!(
                decode_fields(&body, 1024),
                Err(ApiError::InvalidBody)
            ));
        }
    }

    #[test]
    fn test_decode_object() {
        let body = Bytes::from_static(b"{\"email\":\"a@x.com\",\"honeypot\":\"\"}");
        let fields = decode_fields(&body, 1024).unwrap();
        assert_eq!(fields["email"], "a@x.com");
    }

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (
                ApiError::Validation(ValidationError::EmailRequired),
                StatusCode::BAD_REQUEST,
            ),
            (ApiError::InvalidBody, StatusCode::BAD_REQUEST),
            (ApiError::PayloadTooLarge, StatusCode::PAYLOAD_TOO_LARGE),
            (ApiError::Conflict("taken"), StatusCode::CONFLICT),
            (ApiError::Internal, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
