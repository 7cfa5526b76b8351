use actix_web::{FromRequest, HttpRequest, web};
use futures::future::{Ready, ok};

use super::models::SessionState;
use super::service::{SESSION_COOKIE, SessionService};

/// Session state of the requesting browser. Missing, forged or expired
/// cookies yield an empty state.
pub struct Session(pub SessionState);

impl FromRequest for Session {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let Some(service) = req.app_data::<web::Data<SessionService>>() else {
            log::warn!(
                "Session extractor: no SessionService registered for path: {}",
                req.path()
            );
            return ok(Session(SessionState::default()));
        };

        let state = match req.cookie(SESSION_COOKIE) {
            Some(cookie) => match service.decode_state(cookie.value()) {
                Ok(state) => state,
                Err(e) => {
                    log::debug!("Discarding session cookie for path {}: {}", req.path(), e);
                    SessionState::default()
                }
            },
            None => SessionState::default(),
        };

        ok(Session(state))
    }
}
