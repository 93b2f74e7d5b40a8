//! Typed value lookups over a request, and ordered fallback chains of them.
//!
//! Each primitive pulls one named value from one place (header, cookie, route
//! parameter, form field, query parameter). [`Extractor::chain`] tries several
//! in order and keeps the first hit:
//!
//! ```rust
//! use tether::extractor::Extractor;
//!
//! let token = Extractor::chain([
//!     Extractor::from_header("X-Csrf-Token"),
//!     Extractor::from_cookie("csrf_"),
//! ]);
//! assert_eq!(token.key(), "X-Csrf-Token");
//! ```
//!
//! Extractors only read the request; they never modify it.

use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::request::Request;

/// Why an extractor came back empty-handed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ExtractError {
    #[error("missing value in header")]
    MissingHeader,
    #[error("missing value in cookie")]
    MissingCookie,
    #[error("missing value in route parameter")]
    MissingParam,
    #[error("missing value in form body")]
    MissingForm,
    #[error("missing value in query string")]
    MissingQuery,
    #[error("invalid auth header")]
    InvalidAuthHeader,
    #[error("value not found")]
    ValueNotFound,
}

/// Where an extractor reads from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Source {
    Header,
    AuthHeader,
    Cookie,
    Param,
    Form,
    Query,
    Custom,
}

type ExtractFn = Arc<dyn Fn(&Request) -> Result<String, ExtractError> + Send + Sync>;

/// A named lookup over a [`Request`].
#[derive(Clone)]
pub struct Extractor {
    extract: ExtractFn,
    key: String,
    source: Source,
    chain: Vec<Extractor>,
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("key", &self.key)
            .field("source", &self.source)
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

impl Extractor {
    fn primitive(
        key: &str,
        source: Source,
        f: impl Fn(&Request, &str) -> Result<String, ExtractError> + Send + Sync + 'static,
    ) -> Self {
        let owned = key.to_owned();
        Self {
            extract: Arc::new(move |req: &Request| f(req, &owned)),
            key: key.to_owned(),
            source,
            chain: Vec::new(),
        }
    }

    /// Reads a request header. An empty value counts as missing.
    pub fn from_header(name: &str) -> Self {
        Self::primitive(name, Source::Header, |req, name| {
            non_empty(req.header(name), ExtractError::MissingHeader)
        })
    }

    /// Reads a header of the form `<scheme> <value>` and returns `<value>`.
    ///
    /// With an empty scheme this behaves like [`from_header`](Self::from_header).
    pub fn from_auth_header(name: &str, scheme: &str) -> Self {
        let prefix = if scheme.is_empty() { String::new() } else { format!("{scheme} ") };
        Self::primitive(name, Source::AuthHeader, move |req, name| {
            let raw = non_empty(req.header(name), ExtractError::MissingHeader)?;
            if prefix.is_empty() {
                return Ok(raw);
            }
            match raw.strip_prefix(prefix.as_str()).map(str::trim) {
                Some(value) if !value.is_empty() => Ok(value.to_owned()),
                _ => Err(ExtractError::InvalidAuthHeader),
            }
        })
    }

    pub fn from_cookie(name: &str) -> Self {
        Self::primitive(name, Source::Cookie, |req, name| {
            non_empty(req.cookie(name), ExtractError::MissingCookie)
        })
    }

    pub fn from_param(name: &str) -> Self {
        Self::primitive(name, Source::Param, |req, name| {
            non_empty(req.param(name), ExtractError::MissingParam)
        })
    }

    pub fn from_form(name: &str) -> Self {
        Self::primitive(name, Source::Form, |req, name| {
            non_empty(req.form_value(name).as_deref(), ExtractError::MissingForm)
        })
    }

    pub fn from_query(name: &str) -> Self {
        Self::primitive(name, Source::Query, |req, name| {
            non_empty(req.query_value(name).as_deref(), ExtractError::MissingQuery)
        })
    }

    /// Wraps an arbitrary lookup.
    pub fn from_fn(
        key: &str,
        f: impl Fn(&Request) -> Result<String, ExtractError> + Send + Sync + 'static,
    ) -> Self {
        Self::primitive(key, Source::Custom, move |req, _| f(req))
    }

    /// Tries each extractor in order and returns the first non-empty value.
    ///
    /// When none succeeds, the last error observed is returned, or
    /// [`ExtractError::ValueNotFound`] if there was none. The chain reports the
    /// key and source of its first member.
    pub fn chain(extractors: impl IntoIterator<Item = Extractor>) -> Self {
        let chain: Vec<Extractor> = extractors.into_iter().collect();
        let (key, source) = chain
            .first()
            .map(|e| (e.key.clone(), e.source))
            .unwrap_or((String::new(), Source::Custom));

        let members = chain.clone();
        let extract: ExtractFn = Arc::new(move |req: &Request| {
            let mut last_err = None;
            for member in &members {
                match member.extract(req) {
                    Ok(value) if !value.is_empty() => return Ok(value),
                    Ok(_) => {}
                    Err(e) => last_err = Some(e),
                }
            }
            Err(last_err.unwrap_or(ExtractError::ValueNotFound))
        });

        Self { extract, key, source, chain }
    }

    /// Builds an extractor from a `source:key[,source:key…]` lookup string,
    /// e.g. `"header:Authorization,cookie:token"`.
    ///
    /// `auth_scheme`, when non-empty, turns `header:` entries into
    /// [`from_auth_header`](Self::from_auth_header) lookups.
    pub fn parse_lookup(lookup: &str, auth_scheme: &str) -> crate::Result<Self> {
        let mut parsed = Vec::new();
        for part in lookup.split(',') {
            let (source, key) = part
                .trim()
                .split_once(':')
                .ok_or(Error::InvalidConfig("lookup entries must look like `source:key`"))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::InvalidConfig("lookup key must not be empty"));
            }
            let extractor = match source.trim() {
                "header" if !auth_scheme.is_empty() => Self::from_auth_header(key, auth_scheme),
                "header" => Self::from_header(key),
                "cookie" => Self::from_cookie(key),
                "param" => Self::from_param(key),
                "form" => Self::from_form(key),
                "query" => Self::from_query(key),
                _ => return Err(Error::InvalidConfig("unknown lookup source")),
            };
            parsed.push(extractor);
        }

        if parsed.len() == 1 {
            Ok(parsed.remove(0))
        } else {
            Ok(Self::chain(parsed))
        }
    }

    pub fn extract(&self, req: &Request) -> Result<String, ExtractError> {
        (self.extract)(req)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn source(&self) -> Source {
        self.source
    }

    /// Members of a chain; empty for primitives.
    pub fn members(&self) -> &[Extractor] {
        &self.chain
    }
}

fn non_empty(value: Option<&str>, missing: ExtractError) -> Result<String, ExtractError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v.to_owned()),
        _ => Err(missing),
    }
}
