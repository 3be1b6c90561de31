use axum::http::{HeaderMap, header::COOKIE};

use crate::{cookie::CookieJar, rpc::RpcResult};

/// Per-call request context handed to every handler.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cookie_header: Option<String>,
    cookies: CookieJar,
}

impl CallContext {
    pub fn new() -> CallContext {
        CallContext::default()
    }

    /// Build a context from a raw `Cookie` header value.
    pub fn from_cookie_header(header: Option<String>) -> CallContext {
        let cookies = header
            .as_deref()
            .map(CookieJar::parse_header)
            .unwrap_or_default();
        CallContext {
            cookie_header: header,
            cookies,
        }
    }

    /// Build a context from HTTP request headers. Multiple `Cookie` headers
    /// are folded into one, as HTTP/2 clients may split them.
    pub fn from_headers(headers: &HeaderMap) -> CallContext {
        let values: Vec<&str> = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        match values.is_empty() {
            true => CallContext::new(),
            false => CallContext::from_cookie_header(Some(values.join("; "))),
        }
    }

    /// The `Cookie` header exactly as the caller sent it.
    pub fn cookie_header(&self) -> Option<&str> {
        self.cookie_header.as_deref()
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name)
    }
}

/// A per-call value derived from a handler's state and the call context,
/// such as the user a session cookie belongs to.
///
/// Operations declared with a context type receive that type instead of the
/// raw [`CallContext`]. When derivation fails the call fails with the same
/// error and the handler never runs.
pub trait FromContext<S: ?Sized>: Sized + Send {
    fn from_context(
        state: &S,
        ctx: &CallContext,
    ) -> impl Future<Output = RpcResult<Self>> + Send;
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn no_cookie_header() {
        let ctx = CallContext::from_headers(&HeaderMap::new());
        assert_eq!(ctx.cookie_header(), None);
        assert!(ctx.cookies().is_empty());
    }

    #[test]
    fn split_cookie_headers_are_folded() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("a=1"));
        headers.append(COOKIE, HeaderValue::from_static("b=2"));
        let ctx = CallContext::from_headers(&headers);
        assert_eq!(ctx.cookie_header(), Some("a=1; b=2"));
        assert_eq!(ctx.cookie("b"), Some("2"));
    }
}
