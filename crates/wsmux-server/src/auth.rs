//! Auth-key check for websocket upgrade requests.

use wsmux_transport::{AuthError, AuthValidator, IncomingRequest};

pub const AUTH_KEY_HEADER: &str = "X-AuthKey";
pub const AUTH_KEY_QUERY: &str = "authkey";

/// Accepts a request when its `X-AuthKey` header (or `authkey` query
/// parameter) equals the configured key. An empty key accepts everything.
#[derive(Debug, Clone)]
pub struct AuthKeyValidator {
    key: String,
}

impl AuthKeyValidator {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn is_enabled(&self) -> bool {
        !self.key.is_empty()
    }
}

impl AuthValidator for AuthKeyValidator {
    fn validate_incoming_request(&self, request: &IncomingRequest<'_>) -> Result<(), AuthError> {
        if !self.is_enabled() {
            return Ok(());
        }
        let presented = request
            .header(AUTH_KEY_HEADER)
            .or_else(|| request.query(AUTH_KEY_QUERY))
            .filter(|key| !key.is_empty());
        match presented {
            None => Err(AuthError::new("no authkey provided")),
            Some(key) if key == self.key => Ok(()),
            Some(_) => Err(AuthError::new("authkey mismatch")),
        }
    }
}
