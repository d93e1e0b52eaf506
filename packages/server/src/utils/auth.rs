use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::env;

use crate::models::player::UserId;

/// `sub` にユーザーIDを入れる
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("JWT_SECRET is not set")]
    MissingSecret,
    #[error("failed to create token")]
    TokenCreation,
    #[error("failed to verify token")]
    TokenValidation,
    #[error("token subject is not a user id: {0}")]
    InvalidSubject(String),
}

fn secret() -> Result<String, AuthError> {
    env::var("JWT_SECRET").map_err(|_| AuthError::MissingSecret)
}

/// トークンの発行は本来ロビー側の仕事。開発・テスト用。
pub fn create_token(user_id: UserId) -> Result<String, AuthError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (now + Duration::hours(24)).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret()?.as_bytes()),
    )
    .map_err(|_| AuthError::TokenCreation)
}

pub fn verify_token(token: &str) -> Result<UserId, AuthError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret()?.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AuthError::TokenValidation)?;

    let sub = token_data.claims.sub;
    sub.parse().map_err(|_| AuthError::InvalidSubject(sub))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_setup::setup_test_env;

    #[test]
    fn token_round_trips_user_id() {
        setup_test_env();
        let token = create_token(42).unwrap();
        assert_eq!(verify_token(&token).unwrap(), 42);
    }

    #[test]
    fn garbage_token_is_rejected() {
        setup_test_env();
        assert!(matches!(
            verify_token("not-a-token"),
            Err(AuthError::TokenValidation)
        ));
    }

    #[test]
    fn non_numeric_subject_is_rejected() {
        setup_test_env();
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: "alice".to_string(),
            exp: now + 3600,
            iat: now,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret().unwrap().as_bytes()),
        )
        .unwrap();
        assert!(matches!(
            verify_token(&token),
            Err(AuthError::InvalidSubject(sub)) if sub == "alice"
        ));
    }
}
