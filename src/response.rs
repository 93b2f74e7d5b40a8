//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! Build a [`Response`] in your handler and return it. Middleware may adjust
//! headers on the way back out; cookies go through [`Response::set_cookie`] so
//! that one name never appears twice.

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;

use crate::cookie::{self, Cookie};

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
pub enum ContentType {
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use http::StatusCode;
/// use tether::Response;
///
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Clone, Debug)]
pub struct Response {
    pub(crate) body: Bytes,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) status: StatusCode,
}

impl Response {
    /// `200 OK`, `application/json`.
    pub fn json(body: Vec<u8>) -> Self {
        Self::bytes_raw("application/json", body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::bytes_raw("text/plain; charset=utf-8", body.into().into_bytes())
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { body: Bytes::new(), headers: Vec::new(), status: code }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: StatusCode::OK }
    }

    fn bytes_raw(content_type: &str, body: Vec<u8>) -> Self {
        Self {
            body: body.into(),
            headers: vec![("content-type".to_owned(), content_type.to_owned())],
            status: StatusCode::OK,
        }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    pub fn set_status(&mut self, code: StatusCode) {
        self.status = code;
    }

    /// Case-insensitive lookup of the first header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a header, in insertion order.
    pub fn header_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers.iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets a header, replacing every existing value with the same name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_owned(), value.into()));
    }

    /// Appends a header value without touching existing ones.
    pub fn append_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.push((name.to_owned(), value.into()));
    }

    /// Writes a `Set-Cookie` header, replacing any earlier `Set-Cookie` for
    /// the same cookie name.
    pub fn set_cookie(&mut self, cookie: &Cookie) {
        self.headers.retain(|(k, v)| {
            !(k.eq_ignore_ascii_case("set-cookie") && cookie::set_cookie_name(v) == cookie.name)
        });
        self.headers.push(("set-cookie".to_owned(), cookie.to_header_value()));
    }

    /// Returns the raw `Set-Cookie` value written for `name`, if any.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.header_all("set-cookie")
            .find(|v| cookie::set_cookie_name(v) == name)
    }

    /// Converts into the `http` representation handed to hyper.
    ///
    /// Headers whose name or value is not valid on the wire are dropped.
    pub fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        let headers = res.headers_mut();
        for (name, value) in self.headers {
            let (Ok(name), Ok(value)) = (
                http::HeaderName::from_bytes(name.as_bytes()),
                http::HeaderValue::from_str(&value),
            ) else {
                continue;
            };
            headers.append(name, value);
        }
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method, so the content type is always explicit.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: Vec<u8>) -> Response {
        self.finish("application/json", body)
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish("text/plain; charset=utf-8", body.into().into_bytes())
    }

    /// Terminate with a typed body.
    pub fn bytes(self, content_type: ContentType, body: Vec<u8>) -> Response {
        self.finish(content_type.as_str(), body)
    }

    /// Terminate with no body (e.g. `204 No Content`, `302 Found`).
    pub fn no_body(self) -> Response {
        Response { body: Bytes::new(), headers: self.headers, status: self.status }
    }

    fn finish(self, content_type: &str, body: Vec<u8>) -> Response {
        let mut headers = vec![("content-type".to_owned(), content_type.to_owned())];
        headers.extend(self.headers);
        Response { body: body.into(), headers, status: self.status }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for Vec<u8> {
    fn into_response(self) -> Response {
        Response::builder().bytes(ContentType::OctetStream, self)
    }
}

/// Return a status directly from a handler: `return StatusCode::NOT_FOUND`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

impl<T: IntoResponse> IntoResponse for (StatusCode, T) {
    fn into_response(self) -> Response {
        let mut res = self.1.into_response();
        res.status = self.0;
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_cookie_replaces_same_name_only() {
        let mut res = Response::text("ok");
        res.set_cookie(&Cookie::new("a", "1"));
        res.set_cookie(&Cookie::new("b", "2"));
        res.set_cookie(&Cookie::new("a", "3"));

        let cookies: Vec<_> = res.header_all("set-cookie").collect();
        assert_eq!(cookies.len(), 2);
        assert!(res.cookie("a").unwrap().starts_with("a=3;"));
        assert!(res.cookie("b").unwrap().starts_with("b=2;"));
    }

    #[test]
    fn set_header_replaces_append_header_adds() {
        let mut res = Response::status(StatusCode::NO_CONTENT);
        res.append_header("x-a", "1");
        res.append_header("X-A", "2");
        assert_eq!(res.header_all("x-a").count(), 2);

        res.set_header("x-a", "3");
        assert_eq!(res.header_all("x-a").collect::<Vec<_>>(), vec!["3"]);
    }

    #[test]
    fn into_http_keeps_status_and_headers() {
        let res = Response::builder()
            .status(StatusCode::CREATED)
            .header("location", "/users/1")
            .header("bad header", "dropped")
            .text("made");
        let http = res.into_http();
        assert_eq!(http.status(), StatusCode::CREATED);
        assert_eq!(http.headers()["location"], "/users/1");
        assert_eq!(http.headers().len(), 2);
    }

    #[test]
    fn tuple_overrides_status() {
        let res = (StatusCode::FORBIDDEN, "nope").into_response();
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(res.body(), b"nope");
    }
}
