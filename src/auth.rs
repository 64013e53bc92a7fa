use actix_web::{dev::Payload, web, Error, FromRequest, HttpRequest};
use sha2::{Digest, Sha256};
use std::future::{ready, Ready};

use crate::routes::AppState;
use crate::session::{Session, SESSION_COOKIE};

/// The one reserved admin identity, seeded at first startup. Registration
/// with this email is rejected once the admin row exists.
pub const ADMIN_EMAIL: &str = "dankusnir09@gmail.com";
pub const ADMIN_PASSWORD: &str = "admin123";
pub const ADMIN_FULL_NAME: &str = "Кушнір Даніїл";
pub const ADMIN_PHONE: &str = "0977138005";

/// Unsalted sha256 hex digest. This reproduces the original credential
/// contract (`hash(password) == stored`); existing rows would break under
/// any other scheme.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    hash_password(password) == stored
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(actix_web::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

pub fn session_token(req: &HttpRequest) -> Option<String> {
    bearer_token(req).or_else(|| req.cookie(SESSION_COOKIE).map(|c| c.value().to_string()))
}

/// Extractor yielding the validated `Session` for the presented token.
/// Handlers take `Auth` where a session is mandatory and `Option<Auth>`
/// where anonymous callers are allowed.
pub struct Auth(pub Session);

impl FromRequest for Auth {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, _pl: &mut Payload) -> Self::Future {
        let Some(token) = session_token(req) else {
            return ready(Err(actix_web::error::ErrorUnauthorized(
                "Authorization required",
            )));
        };
        let Some(state) = req.app_data::<web::Data<AppState>>() else {
            return ready(Err(actix_web::error::ErrorInternalServerError(
                "session store unavailable",
            )));
        };
        match state.sessions.get(&token) {
            Some(session) => ready(Ok(Auth(session))),
            None => ready(Err(actix_web::error::ErrorUnauthorized(
                "Invalid or expired session",
            ))),
        }
    }
}
