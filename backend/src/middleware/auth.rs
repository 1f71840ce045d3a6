//! Authentication middleware
//!
//! Resolves the acting user from an HS256 bearer token. Token issuance
//! belongs to the account service; this side only verifies.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::Actor;

use crate::error::{AppError, ErrorResponse};
use crate::AppState;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn for_actor(actor: &Actor, ttl_secs: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: actor.id.to_string(),
            first_name: actor.first_name.clone(),
            last_name: actor.last_name.clone(),
            role: actor.role.clone(),
            exp: now + ttl_secs,
            iat: now,
        }
    }

    fn into_actor(self) -> Result<Actor, AppError> {
        let id = uuid::Uuid::parse_str(&self.sub)
            .map_err(|_| AppError::Unauthorized("Invalid user ID in token".to_string()))?;
        Ok(Actor::new(id, self.first_name, self.last_name, self.role))
    }
}

/// Sign a token for `actor`
pub fn issue_token(actor: &Actor, secret: &str, ttl_secs: i64) -> Result<String, AppError> {
    encode(
        &Header::default(),
        &Claims::for_actor(actor, ttl_secs),
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
}

/// Decode and validate a token into the acting user
pub fn verify_token(token: &str, secret: &str) -> Result<Actor, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?
    .claims
    .into_actor()
}

/// Authentication middleware that validates JWT tokens and stores the
/// resolved [`Actor`] in the request extensions
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(TypedHeader(Authorization(bearer))) = bearer else {
        return AppError::Unauthorized("Missing or invalid Authorization header".to_string())
            .into_response();
    };

    match verify_token(bearer.token(), &state.config.jwt.secret) {
        Ok(actor) => {
            request.extensions_mut().insert(actor);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Extractor for the authenticated user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub Actor);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Actor>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorResponse::new("UNAUTHORIZED", "Authentication required")),
                )
            })
    }
}
