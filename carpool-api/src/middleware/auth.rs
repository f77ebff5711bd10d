use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use carpool_core::{IdentityError, IdentityResolver};
use carpool_domain::UserId;
use carpool_shared::Masked;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User id as a UUID string.
    pub sub: String,
    pub exp: usize,
}

/// The authenticated user, available to handlers as `Extension<Caller>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub UserId);

/// Verifies HS256 tokens signed with the shared secret.
pub struct JwtIdentityResolver {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityResolver {
    pub fn new(secret: &Masked<String>) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.expose().as_bytes()),
            validation: Validation::default(),
        }
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve(&self, token: &Masked<String>) -> Result<UserId, IdentityError> {
        if token.expose().is_empty() {
            return Err(IdentityError::Missing);
        }

        let data = decode::<Claims>(token.expose(), &self.key, &self.validation)
            .map_err(|e| IdentityError::Invalid(e.to_string()))?;

        Uuid::parse_str(&data.claims.sub).map_err(|e| IdentityError::Invalid(format!("sub: {}", e)))
    }
}

pub async fn caller_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| Masked(t.trim().to_string()))
        .ok_or(IdentityError::Missing)?;

    let user_id = state.identity.resolve(&token).await?;
    req.extensions_mut().insert(Caller(user_id));

    Ok(next.run(req).await)
}
