//! Bearer-token authentication.
//!
//! The middleware resolves the `Authorization` header to an active user and
//! stores a [`RequestContext`] in the request extensions. Handlers take the
//! context as an extractor.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::error::ApiError;
use super::tokens::hash_token;
use super::AppState;
use crate::db::UserRepository;
use crate::models::{Role, User};

const NO_CREDENTIALS: &str = "Authentication credentials were not provided.";
const INVALID_TOKEN: &str = "Invalid token.";
const INACTIVE_USER: &str = "User inactive or deleted.";

/// The authenticated caller, derived once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
}

impl RequestContext {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_clerk(&self) -> bool {
        self.role == Role::Clerk
    }
}

impl From<&User> for RequestContext {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or(ApiError::Unauthenticated(NO_CREDENTIALS))
    }
}

/// Extracts the token from `Bearer <token>` (or the legacy `JWT <token>`).
fn parse_authorization(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    if scheme.eq_ignore_ascii_case("Bearer") || scheme.eq_ignore_ascii_case("JWT") {
        Some(token)
    } else {
        None
    }
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&state, request.headers()).await {
        Ok(ctx) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<RequestContext, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Err(ApiError::Unauthenticated(NO_CREDENTIALS));
    };

    let token = value
        .to_str()
        .ok()
        .and_then(parse_authorization)
        .ok_or_else(|| {
            tracing::warn!("Rejected malformed Authorization header");
            ApiError::Unauthenticated(INVALID_TOKEN)
        })?;

    let users = UserRepository::new(state.pool.clone());
    let Some(user) = users.find_by_token_hash(&hash_token(token)).await? else {
        tracing::warn!("Rejected unknown API token");
        return Err(ApiError::Unauthenticated(INVALID_TOKEN));
    };

    if !user.is_active {
        tracing::warn!(username = %user.username, "Rejected token of inactive user");
        return Err(ApiError::Unauthenticated(INACTIVE_USER));
    }

    Ok(RequestContext::from(&user))
}
