//! Security headers for every response.
//!
//! The Content Security Policy admits Stripe.js (script, iframes and API
//! calls), the origin static assets are served from when that is a CDN or
//! bucket, and the Vite dev server when one is configured.

use axum::{
    extract::{Request, State},
    http::{
        HeaderName, HeaderValue,
        header::{
            CACHE_CONTROL, CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS,
            X_FRAME_OPTIONS,
        },
    },
    middleware::Next,
    response::Response,
};

const STRIPE_JS: &str = "https://js.stripe.com";
const STRIPE_HOOKS: &str = "https://hooks.stripe.com";
const STRIPE_API: &str = "https://api.stripe.com";

/// Precomputed header values, shared by every request.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    csp: HeaderValue,
}

impl SecurityHeaders {
    /// Build the policy.
    ///
    /// `asset_url` is the public static URL; only absolute URLs add an
    /// origin. `dev_server_url` is added to script, style and connect
    /// sources (the dev server pushes updates over a websocket).
    #[must_use]
    pub fn new(asset_url: &str, dev_server_url: Option<&str>) -> Self {
        let asset_origin = origin_of(asset_url);
        let dev_origin = dev_server_url.and_then(origin_of);
        let extra: String = [asset_origin.as_deref(), dev_origin.as_deref()]
            .into_iter()
            .flatten()
            .map(|origin| format!(" {origin}"))
            .collect();
        let dev_ws = dev_origin
            .as_deref()
            .map(|o| format!(" {}", o.replacen("http", "ws", 1)))
            .unwrap_or_default();

        let policy = format!(
            "default-src 'self'; \
             script-src 'self' {STRIPE_JS}{extra}; \
             style-src 'self'{extra}; \
             font-src 'self'{extra}; \
             img-src 'self' data:{extra}; \
             connect-src 'self' {STRIPE_API}{extra}{dev_ws}; \
             frame-src {STRIPE_JS} {STRIPE_HOOKS}; \
             object-src 'none'; \
             base-uri 'self'; \
             form-action 'self'; \
             frame-ancestors 'none'"
        );

        let csp = HeaderValue::from_str(&policy).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Unusable CSP, falling back to same-origin only");
            HeaderValue::from_static("default-src 'self'; frame-ancestors 'none'")
        });
        Self { csp }
    }

    /// The Content-Security-Policy value.
    #[must_use]
    pub const fn csp(&self) -> &HeaderValue {
        &self.csp
    }
}

fn origin_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let origin = parsed.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

/// Add security headers to all responses.
///
/// Responses that already set `Cache-Control` (static files) keep it;
/// everything else is marked `no-store`.
pub async fn security_headers_middleware(
    State(security): State<SecurityHeaders>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(
        REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(CONTENT_SECURITY_POLICY, security.csp.clone());
    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static(
            "camera=(), geolocation=(), microphone=(), usb=(), \
             payment=(self \"https://js.stripe.com\")",
        ),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin-allow-popups"),
    );
    if !headers.contains_key(CACHE_CONTROL) {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store, max-age=0"));
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(headers: &SecurityHeaders) -> &str {
        headers.csp().to_str().unwrap_or_default()
    }

    #[test]
    fn test_local_assets_add_no_origin() {
        let headers = SecurityHeaders::new("/static", None);
        let csp = policy(&headers);
        assert!(csp.contains("script-src 'self' https://js.stripe.com;"));
        assert!(csp.contains("frame-src https://js.stripe.com https://hooks.stripe.com"));
    }

    #[test]
    fn test_cdn_origin_allowed() {
        let headers = SecurityHeaders::new("https://d111111abcdef8.cloudfront.net/static", None);
        let csp = policy(&headers);
        assert!(csp.contains("style-src 'self' https://d111111abcdef8.cloudfront.net;"));
        assert!(!csp.contains("/static"));
    }

    #[test]
    fn test_dev_server_websocket_allowed() {
        let headers = SecurityHeaders::new("/static", Some("http://localhost:5173"));
        let csp = policy(&headers);
        assert!(csp.contains("http://localhost:5173"));
        assert!(csp.contains("ws://localhost:5173"));
    }
}
