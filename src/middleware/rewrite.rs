//! Internal path rewriting.
//!
//! The first matching rule replaces the request path before routing; the
//! client never sees the change. Unmatched requests pass through untouched.

use std::sync::Arc;

use tracing::trace;

use super::{skipped, Middleware, Next, Skip};
use crate::error::Result;
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::rules::RuleSet;

/// Configuration for [`Rewrite`].
#[derive(Clone, Default)]
pub struct Config {
    /// `(glob, replacement)` pairs, tried in order.
    pub rules: Vec<(String, String)>,
    pub skip: Option<Skip>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, glob: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.rules.push((glob.into(), replacement.into()));
        self
    }

    pub fn with_skip(mut self, f: impl Fn(&Request) -> bool + Send + Sync + 'static) -> Self {
        self.skip = Some(Arc::new(f));
        self
    }
}

/// Path-rewriting middleware.
pub struct Rewrite {
    rules: RuleSet,
    skip: Option<Skip>,
}

impl Rewrite {
    /// Compiles the rules. A rule that fails to compile is an error and no
    /// middleware is produced.
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self { rules: RuleSet::new(config.rules)?, skip: config.skip })
    }
}

impl Middleware for Rewrite {
    fn call(&self, mut req: Request, next: Next) -> BoxFuture {
        if !skipped(self.skip.as_ref(), &req) {
            if let Some(path) = self.rules.apply(req.path()) {
                trace!(from = %req.path(), to = %path, "rewrite");
                req.set_path(path);
            }
        }
        next.run(req)
    }
}
