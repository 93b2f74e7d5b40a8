//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use http::{Extensions, Method};

use crate::cookie;

/// An incoming HTTP request.
///
/// The path is mutable (rewrite middleware changes it before routing) and the
/// request carries request-local state in [`Extensions`], which middleware
/// uses to hand values such as the request id or the CSRF token to handlers.
#[derive(Clone, Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Option<String>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) extensions: Extensions,
}

impl Request {
    /// Converts an `http::Request` whose body has already been collected.
    ///
    /// Header values that are not visible ASCII are dropped.
    pub fn from_http(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        let headers = parts.headers.iter()
            .filter_map(|(k, v)| Some((k.as_str().to_owned(), v.to_str().ok()?.to_owned())))
            .collect();
        Self {
            method: parts.method,
            path: parts.uri.path().to_owned(),
            query: parts.uri.query().map(str::to_owned),
            headers,
            body,
            params: HashMap::new(),
            extensions: parts.extensions,
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn query(&self) -> Option<&str> { self.query.as_deref() }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn extensions(&self) -> &Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }

    /// Replaces the request path. The query string is untouched.
    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets a header, replacing every existing value with the same name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_owned(), value.into()));
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns the value of the named request cookie.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("cookie"))
            .flat_map(|(_, v)| cookie::parse_pairs(v))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }

    /// Sets a request cookie, replacing any cookie with the same name so that
    /// later readers of this request see exactly one value.
    pub fn set_cookie(&mut self, name: &str, value: &str) {
        let mut pairs: Vec<String> = self.headers.iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("cookie"))
            .flat_map(|(_, v)| cookie::parse_pairs(v))
            .filter(|(k, _)| *k != name)
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        pairs.push(format!("{name}={value}"));
        self.set_header("cookie", pairs.join("; "));
    }

    /// Returns the first value of a query-string parameter, percent-decoded.
    pub fn query_value(&self, name: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Returns the first value of an `application/x-www-form-urlencoded` body
    /// field. Other content types yield `None`.
    pub fn form_value(&self, name: &str) -> Option<String> {
        let content_type = self.header("content-type")?;
        if !content_type.starts_with("application/x-www-form-urlencoded") {
            return None;
        }
        form_urlencoded::parse(&self.body)
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }
}
