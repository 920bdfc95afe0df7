use crate::error::{AppError, Result};
use crate::state::AppState;
use axum::{
    RequestPartsExt,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use axum_extra::{TypedHeader, headers};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Platform-level role carried by the identity provider. Community roles are a
/// separate, per-community concept (see `models::community::CommunityRole`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformRole {
    User,
    Admin,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid, // User ID
    pub role: PlatformRole,
    pub exp: i64, // Expiration time
    pub iat: i64, // Issued at
}

impl Claims {
    pub fn new(user_id: Uuid, role: PlatformRole, expires_in_hours: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id,
            role,
            exp: (now + Duration::hours(expires_in_hours)).timestamp(),
            iat: now.timestamp(),
        }
    }
}

pub fn create_token(user_id: Uuid, role: PlatformRole, secret: &str) -> Result<String> {
    let claims = Claims::new(user_id, role, 24 * 7); // 7 days

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// The authenticated principal. Resolved once at the request boundary and
/// passed explicitly into every service operation.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: PlatformRole,
}

impl AuthUser {
    pub fn is_platform_admin(&self) -> bool {
        self.role == PlatformRole::Admin
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let TypedHeader(auth_header) = parts
            .extract::<TypedHeader<headers::Authorization<headers::authorization::Bearer>>>()
            .await
            .map_err(|_| AppError::Unauthorized)?;

        let claims = verify_token(auth_header.token(), &app_state.config.jwt_secret)?;

        Ok(AuthUser {
            user_id: claims.sub,
            role: claims.role,
        })
    }
}

/// Extractor for endpoints that are readable without a session (community and
/// event discovery). A present-but-invalid token is still rejected.
pub struct OptionalAuthUser(pub Option<AuthUser>);

impl<S> FromRequestParts<S> for OptionalAuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        if !parts.headers.contains_key(AUTHORIZATION) {
            return Ok(OptionalAuthUser(None));
        }

        let user = AuthUser::from_request_parts(parts, state).await?;
        Ok(OptionalAuthUser(Some(user)))
    }
}
