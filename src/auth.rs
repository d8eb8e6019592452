use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

use crate::{error::ApiError, routes::AppState};

/// Rejects requests that do not carry `Authorization: Bearer <API_TOKEN>`.
pub async fn require_api_token<B>(
    State(state): State<AppState>,
    request: Request<B>,
    next: Next<B>,
) -> Result<Response, ApiError> {
    tracing::debug!(path = %request.uri().path(), "checking API token");
    check_bearer(request.headers().get(AUTHORIZATION), &state.api_token)?;
    Ok(next.run(request).await)
}

pub fn check_bearer(header: Option<&HeaderValue>, expected: &str) -> Result<(), ApiError> {
    let token = header
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(ApiError::MissingToken)?;

    if constant_time_eq(token.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(ApiError::InvalidToken)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
