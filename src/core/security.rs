use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::Settings;

#[derive(Debug, Error)]
pub(crate) enum SecurityError {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("unsupported jwt algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

impl From<jsonwebtoken::errors::Error> for SecurityError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => SecurityError::Expired,
            _ => SecurityError::Invalid(err.to_string()),
        }
    }
}

/// Claims issued by the platform's identity provider. `sub` is the learner or
/// reviewer id used throughout the grading tables.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub(crate) sub: String,
    pub(crate) exp: i64,
}

fn algorithm(settings: &Settings) -> Result<Algorithm, SecurityError> {
    match settings.security().algorithm.as_str() {
        "HS256" => Ok(Algorithm::HS256),
        other => Err(SecurityError::UnsupportedAlgorithm(other.to_string())),
    }
}

pub(crate) fn verify_token(token: &str, settings: &Settings) -> Result<Claims, SecurityError> {
    let mut validation = Validation::new(algorithm(settings)?);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "sub"]);

    let key = DecodingKey::from_secret(settings.security().secret_key.as_bytes());
    Ok(decode::<Claims>(token, &key, &validation)?.claims)
}

/// Tokens are minted by the platform; this service only mints them in tests.
#[cfg(test)]
pub(crate) fn create_access_token(
    subject: &str,
    settings: &Settings,
    expires_in: Option<time::Duration>,
) -> Result<String, SecurityError> {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let lifetime = expires_in.unwrap_or_else(|| {
        time::Duration::minutes(settings.security().access_token_expire_minutes as i64)
    });
    let claims = Claims {
        sub: subject.to_string(),
        exp: (time::OffsetDateTime::now_utc() + lifetime).unix_timestamp(),
    };
    let key = EncodingKey::from_secret(settings.security().secret_key.as_bytes());
    Ok(encode(&Header::new(algorithm(settings)?), &claims, &key)?)
}
