use crate::config::Config;
use crate::error::ForwardError;
use crate::models::Credential;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::typed_header::{TypedHeaderRejection, TypedHeaderRejectionReason};
use axum_extra::TypedHeader;
use tracing::{debug, warn};

/// The `Authorization` header as extracted, rejection included, so a
/// malformed header can be told apart from an absent one.
pub type AuthHeader = Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>;

/// Picks the credential for one call: the caller's bearer token if sent,
/// otherwise the server's configured token. An `Authorization` header that
/// is present but not `Bearer <token>` is rejected.
pub fn resolve_credential(auth_header: AuthHeader, config: &Config) -> Result<Credential, ForwardError> {
    match auth_header {
        Ok(TypedHeader(auth_header)) => {
            let token = auth_header.token().trim();
            if token.is_empty() {
                warn!("Empty bearer token in Authorization header");
                return Err(ForwardError::invalid("Authorization", "empty bearer token"));
            }
            debug!("Using caller-supplied Upnify token");
            return Ok(Credential::new(token));
        }
        Err(rejection) if matches!(rejection.reason(), TypedHeaderRejectionReason::Missing) => {}
        Err(rejection) => {
            warn!("Rejecting malformed Authorization header: {}", rejection);
            return Err(ForwardError::invalid(
                "Authorization",
                "expected `Bearer <token>`",
            ));
        }
    }

    match config.upnify_token.as_deref() {
        Some(token) => Ok(Credential::new(token)),
        None => {
            warn!("No Upnify token in request and none configured");
            Err(ForwardError::missing("token"))
        }
    }
}
