use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};

use super::credentials::AuthError;
use super::models::{AssertionClaims, CLOUD_PLATFORM_SCOPE, ServiceAccountKey};

const ASSERTION_LIFETIME_MINUTES: i64 = 60;

/// Signs the RS256 JWT a service account trades for an access token.
pub fn sign_assertion(key: &ServiceAccountKey) -> Result<String, AuthError> {
    let now = Utc::now();
    let expiration = now + Duration::minutes(ASSERTION_LIFETIME_MINUTES);

    let claims = AssertionClaims {
        iss: key.client_email.clone(),
        scope: CLOUD_PLATFORM_SCOPE.to_string(),
        aud: key.token_uri.clone(),
        iat: now.timestamp(),
        exp: expiration.timestamp(),
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| AuthError::InvalidKey(format!("private_key: {}", e)))?;

    encode(&header, &claims, &encoding_key).map_err(AuthError::Signing)
}
