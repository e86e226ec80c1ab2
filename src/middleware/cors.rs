//! CORS backed by the dynamic origin trust store.
//!
//! Unlike a static allow-list layer, the trusted set here changes at
//! runtime as clients register, so every request consults the store.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::services::OriginTrustStore;

const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "authorization, content-type";
const MAX_AGE_SECS: &str = "3600";

pub async fn dynamic_cors(
    State(origins): State<Arc<OriginTrustStore>>,
    req: Request,
    next: Next,
) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    // Non-browser traffic carries no Origin header.
    let Some(origin) = origin else {
        return next.run(req).await;
    };

    let origin_value = HeaderValue::from_str(&origin)
        .ok()
        .filter(|_| origins.is_trusted(&origin));

    // No CORS policy for this origin: preflights die here; actual
    // requests pass through without CORS headers, which keeps
    // same-origin posts working (browsers attach Origin to every POST)
    // while the browser still blocks the cross-origin read.
    let Some(origin_value) = origin_value else {
        if req.method() == Method::OPTIONS {
            tracing::debug!(%origin, "Rejected untrusted CORS preflight");
            return (StatusCode::FORBIDDEN, "Invalid CORS request").into_response();
        }
        return next.run(req).await;
    };

    if req.method() == Method::OPTIONS {
        // Preflight never reaches the router.
        return (
            StatusCode::NO_CONTENT,
            [
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, origin_value),
                (
                    header::ACCESS_CONTROL_ALLOW_METHODS,
                    HeaderValue::from_static(ALLOW_METHODS),
                ),
                (
                    header::ACCESS_CONTROL_ALLOW_HEADERS,
                    HeaderValue::from_static(ALLOW_HEADERS),
                ),
                (
                    header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                    HeaderValue::from_static("true"),
                ),
                (
                    header::ACCESS_CONTROL_MAX_AGE,
                    HeaderValue::from_static(MAX_AGE_SECS),
                ),
                (header::VARY, HeaderValue::from_static("Origin")),
            ],
        )
            .into_response();
    }

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin_value);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    response
}
