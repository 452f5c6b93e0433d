//! HTTP middleware for the storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, transactions)
//! 2. `TraceLayer` (request span)
//! 3. Request ID (recorded on the span, echoed in the response)
//! 4. Security headers (CSP admitting Stripe.js and the asset origin)
//!
//! Staff endpoints additionally take the [`RequireStaff`] extractor.

pub mod request_id;
pub mod security_headers;
pub mod staff;

pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
pub use security_headers::{SecurityHeaders, security_headers_middleware};
pub use staff::RequireStaff;
