//! HTTP Basic authentication.
//!
//! When `auth.enabled` is set every route except `/health` requires
//! `Authorization: Basic <base64(user:password)>` matching the configured
//! credentials. With auth enabled but no credentials configured, every
//! request is rejected.

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flix_core::config::AuthConfig;

use crate::context::AppContext;

/// Realm announced in the `WWW-Authenticate` challenge.
const REALM: &str = "FileFlix";

/// Paths reachable without credentials.
const PUBLIC_PATHS: &[&str] = &["/health"];

/// Decode a `Basic` authorization header into `(user, password)`.
pub fn parse_basic(authorization: &str) -> Option<(String, String)> {
    let (scheme, encoded) = authorization.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

/// True when `authorization` carries the configured credentials.
pub fn is_authorized(auth: &AuthConfig, authorization: Option<&str>) -> bool {
    if !auth.enabled {
        return true;
    }
    let (Some(expected_user), Some(expected_password)) = (&auth.username, &auth.password) else {
        return false;
    };
    match authorization.and_then(parse_basic) {
        Some((user, password)) => &user == expected_user && &password == expected_password,
        None => false,
    }
}

pub async fn auth_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Response {
    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if is_authorized(&ctx.config.auth, authorization) {
        next.run(request).await
    } else {
        tracing::debug!(path = %request.uri().path(), "Rejected unauthenticated request");
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, format!("Basic realm=\"{REALM}\""))],
            "Authentication required",
        )
            .into_response()
    }
}
