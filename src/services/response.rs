//! HTTP response building helpers

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use serde::Serialize;
use tracing::warn;

use crate::error::FeedError;

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
    response
}

pub fn ok<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, body)
}

pub fn created<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::CREATED, body)
}

pub fn no_content() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

fn error_body(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "error": message }))
}

pub fn not_found(message: &str) -> Response<Full<Bytes>> {
    error_body(StatusCode::NOT_FOUND, message)
}

pub fn method_not_allowed() -> Response<Full<Bytes>> {
    error_body(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

/// Map a FeedError onto its HTTP status
pub fn error_response(error: FeedError) -> Response<Full<Bytes>> {
    let status = match &error {
        FeedError::NotFound(_) => StatusCode::NOT_FOUND,
        FeedError::DuplicateInteraction { .. }
        | FeedError::AlreadyFollowing { .. }
        | FeedError::NotFollowing { .. } => StatusCode::CONFLICT,
        FeedError::Validation(_) | FeedError::Json(_) => StatusCode::BAD_REQUEST,
        FeedError::Unauthenticated => StatusCode::UNAUTHORIZED,
        FeedError::Unauthorized(_) => StatusCode::FORBIDDEN,
        FeedError::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
        FeedError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if !error.is_business_outcome() {
        warn!(status = status.as_u16(), error = %error, "Request failed");
    }

    error_body(status, &error.to_string())
}

/// Wrap a service result into an HTTP response
pub fn from_result<T: Serialize>(result: Result<T, FeedError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => ok(&value),
        Err(e) => error_response(e),
    }
}

/// Returns 404 if None
pub fn from_option<T: Serialize>(result: Result<Option<T>, FeedError>, not_found_msg: &str) -> Response<Full<Bytes>> {
    match result {
        Ok(Some(value)) => ok(&value),
        Ok(None) => not_found(not_found_msg),
        Err(e) => error_response(e),
    }
}

pub fn from_create_result<T: Serialize>(result: Result<T, FeedError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => created(&value),
        Err(e) => error_response(e),
    }
}

pub fn from_delete_result(result: Result<(), FeedError>) -> Response<Full<Bytes>> {
    match result {
        Ok(()) => no_content(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = vec![
            (FeedError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                FeedError::DuplicateInteraction { user_id: 1, item_id: 2, interaction_type: "like".into() },
                StatusCode::CONFLICT,
            ),
            (FeedError::AlreadyFollowing { follower_id: 1, followee_id: 2 }, StatusCode::CONFLICT),
            (FeedError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (FeedError::Unauthorized("no".into()), StatusCode::FORBIDDEN),
            (FeedError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (FeedError::TransientStore("down".into()), StatusCode::SERVICE_UNAVAILABLE),
            (FeedError::Cancelled, StatusCode::GATEWAY_TIMEOUT),
            (FeedError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, status) in cases {
            assert_eq!(error_response(error).status(), status);
        }
    }

    #[test]
    fn test_from_option_none_is_404() {
        let resp = from_option::<i64>(Ok(None), "missing");
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(from_delete_result(Ok(())).status(), StatusCode::NO_CONTENT);
    }
}
