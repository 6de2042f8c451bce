use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::{models::identity::Identity, state::AppState, utils::jwt::verify_access_token};

/// Requires a valid bearer token and attaches the caller's [`Identity`].
pub async fn auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let identity = authenticate_request(request.headers(), &state.config.jwt_secret)?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

// Auth + require admin role for admin-only routes
pub async fn auth_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let identity = authenticate_request(request.headers(), &state.config.jwt_secret)?;
    if !identity.is_admin() {
        tracing::debug!(user_id = %identity.user_id, "non-admin caller rejected");
        return Err(StatusCode::FORBIDDEN);
    }

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

pub(crate) fn parse_bearer_token(header: &str) -> Option<&str> {
    let (scheme, rest) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then_some(token)
}

fn authenticate_request(
    headers: &axum::http::HeaderMap,
    secret: &str,
) -> Result<Identity, StatusCode> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_bearer_token)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = verify_access_token(token, secret).map_err(|err| {
        tracing::debug!(error = %err, "rejected access token");
        StatusCode::UNAUTHORIZED
    })?;

    claims.identity().map_err(|_| StatusCode::UNAUTHORIZED)
}
