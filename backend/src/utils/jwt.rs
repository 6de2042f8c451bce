//! Verification of access tokens issued by the authentication provider.
//!
//! Tokens are HS256-signed with the shared `JWT_SECRET`. Issuing lives here
//! only so tests and local tooling can mint tokens the verifier accepts.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::models::identity::{Identity, UserRole};
use crate::types::UserId;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    #[serde(default)]
    pub role: String,
    pub exp: i64, // expiration time
    pub iat: i64, // issued at
}

impl Claims {
    pub fn new(user_id: UserId, role: UserRole, expiration_hours: u64) -> Self {
        let now = Utc::now();
        let exp = now + Duration::hours(expiration_hours as i64);

        Self {
            sub: user_id.to_string(),
            role: role.as_str().to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        }
    }

    /// The identity the claims grant. Fails when `sub` is not a user id.
    pub fn identity(&self) -> anyhow::Result<Identity> {
        let user_id: UserId = self.sub.parse()?;
        Ok(Identity::new(user_id, UserRole::from_claim(&self.role)))
    }
}

pub fn create_access_token(
    user_id: UserId,
    role: UserRole,
    secret: &str,
    expiration_hours: u64,
) -> anyhow::Result<String> {
    let claims = Claims::new(user_id, role, expiration_hours);
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;

    Ok(token)
}

pub fn verify_access_token(token: &str, secret: &str) -> anyhow::Result<Claims> {
    let validation = Validation::default();
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )?;

    Ok(token_data.claims)
}
