//! Authentication middleware.
//!
//! UI routes take a Bearer token. When `AUTH_SECRET` is configured the token
//! must match it; otherwise requests are accepted anonymously.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};

use crate::AppState;

/// Authenticated caller extracted from a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthUser {
    /// Presented the configured secret
    Token,
    /// No secret is configured
    Anonymous,
}

impl AuthUser {
    fn authorize(
        header: Option<&str>,
        secret: Option<&str>,
    ) -> Result<Self, (StatusCode, &'static str)> {
        let Some(secret) = secret else {
            return Ok(AuthUser::Anonymous);
        };

        match header {
            Some(header) => match header.strip_prefix("Bearer ") {
                Some(token) if token.is_empty() => {
                    Err((StatusCode::UNAUTHORIZED, "Empty bearer token"))
                }
                Some(token) if token == secret => Ok(AuthUser::Token),
                Some(_) => Err((StatusCode::UNAUTHORIZED, "Invalid bearer token")),
                None => Err((
                    StatusCode::UNAUTHORIZED,
                    "Invalid authorization header format",
                )),
            },
            None => Err((StatusCode::UNAUTHORIZED, "Missing authorization header")),
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let user = Self::authorize(auth_header, state.config.auth_secret.as_deref());
        if let Err((_, reason)) = &user {
            tracing::debug!(reason, "Rejected request");
        }
        user
    }
}
