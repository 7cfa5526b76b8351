use actix_web::cookie::{Cookie, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use super::models::{SessionClaims, SessionState};

pub const SESSION_COOKIE: &str = "pneumoscan_session";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session encoding error: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
    #[error("Session decoding error: {0}")]
    Decoding(String),
    #[error("Invalid session token")]
    InvalidToken,
    #[error("Session expired")]
    Expired,
}

/// Signs and verifies the session cookie (an HS256 JWT holding the state).
#[derive(Clone)]
pub struct SessionService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: Duration,
}

impl SessionService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
            lifetime: Duration::hours(24),
        }
    }

    /// Service with a throwaway secret; sessions do not survive a restart.
    pub fn ephemeral() -> Self {
        let secret = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        Self::new(&secret)
    }

    pub fn encode_state(&self, state: &SessionState) -> Result<String, SessionError> {
        let now = Utc::now();
        let claims = SessionClaims {
            state: state.clone(),
            exp: (now + self.lifetime).timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let header = Header::new(Algorithm::HS256);
        encode(&header, &claims, &self.encoding_key).map_err(SessionError::Encoding)
    }

    pub fn decode_state(&self, token: &str) -> Result<SessionState, SessionError> {
        if token.is_empty() || token.split('.').count() != 3 {
            return Err(SessionError::InvalidToken);
        }

        let validation = Validation::new(Algorithm::HS256);
        match decode::<SessionClaims>(token, &self.decoding_key, &validation) {
            Ok(token_data) => Ok(token_data.claims.state),
            Err(err) => match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => Err(SessionError::Expired),
                jsonwebtoken::errors::ErrorKind::InvalidToken
                | jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    Err(SessionError::InvalidToken)
                }
                _ => Err(SessionError::Decoding(err.to_string())),
            },
        }
    }

    pub fn cookie(&self, state: &SessionState) -> Result<Cookie<'static>, SessionError> {
        let token = self.encode_state(state)?;
        Ok(Cookie::build(SESSION_COOKIE, token)
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .finish())
    }
}
