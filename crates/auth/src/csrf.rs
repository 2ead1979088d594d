//! Double-submit CSRF check: safe methods pass through untouched, anything
//! else must present a matching `X-CSRF-Token` header and `csrf_token`
//! cookie.

use crate::error::AuthError;

const SAFE_METHODS: [&str; 3] = ["GET", "HEAD", "OPTIONS"];

/// Checks a request's CSRF token pair. `method` is matched case-sensitively
/// against the HTTP verb the way the original compares against Flask's
/// `request.method` (already uppercase).
pub fn verify(method: &str, header_token: Option<&str>, cookie_token: Option<&str>) -> Result<(), AuthError> {
    if SAFE_METHODS.contains(&method) {
        return Ok(());
    }
    match (header_token, cookie_token) {
        (Some(header), Some(cookie)) if header == cookie && !header.is_empty() => Ok(()),
        _ => Err(AuthError::CsrfMismatch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_methods_skip_the_check_entirely() {
        assert!(verify("GET", None, None).is_ok());
        assert!(verify("HEAD", Some("a"), Some("b")).is_ok());
        assert!(verify("OPTIONS", None, Some("b")).is_ok());
    }

    #[test]
    fn matching_tokens_on_a_mutating_method_pass() {
        assert!(verify("POST", Some("tok"), Some("tok")).is_ok());
    }

    #[test]
    fn missing_header_is_rejected() {
        assert!(verify("POST", None, Some("tok")).is_err());
    }

    #[test]
    fn mismatched_tokens_are_rejected() {
        assert!(verify("DELETE", Some("a"), Some("b")).is_err());
    }
}
