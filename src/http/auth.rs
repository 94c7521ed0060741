use axum::extract::State;
use axum::headers::authorization::{Authorization, Basic};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use axum::TypedHeader;

use super::errors::Result;
use super::Console;
use crate::config::Credentials;
use crate::errors::Error as ConsoleError;
use crate::registry::RegistrySession;

/// Match inbound Basic credentials against the configured pair. Exact string comparison, no
/// hashing; a console without configured credentials accepts nobody.
pub(crate) fn authenticate(
    console: &Console,
    authorization: Option<&Authorization<Basic>>,
) -> Option<Credentials> {
    let Some(expected) = console.config().credentials.as_ref() else {
        tracing::warn!("registry credentials not configured in console config");
        return None;
    };
    let provided = authorization?;
    if provided.username().is_empty() || provided.password().is_empty() {
        return None;
    }
    if provided.username() == expected.username && provided.password() == expected.password {
        Some(expected.clone())
    } else {
        None
    }
}

/// Rejects the request with 401 unless it carries the configured Basic credentials, otherwise
/// inserts a [`RegistrySession`] using those same credentials for the handler.
pub async fn require_basic_auth<B>(
    State(console): State<Console>,
    authorization: Option<TypedHeader<Authorization<Basic>>>,
    mut req: Request<B>,
    next: Next<B>,
) -> Result<Response> {
    let Some(credentials) = authenticate(&console, authorization.as_ref().map(|h| &h.0)) else {
        tracing::debug!(uri = %req.uri(), "rejecting unauthenticated request");
        return Err(ConsoleError::Unauthenticated.into());
    };

    req.extensions_mut()
        .insert(RegistrySession::new(console.upstream(), Some(credentials)));

    Ok(next.run(req).await)
}
