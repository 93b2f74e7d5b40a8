//! # tether
//!
//! Session state and request middleware for services built on a small
//! hyper-based router.
//!
//! ## What's inside
//!
//! - [`storage`]: a TTL key-value store with a background sweeper, plus the
//!   CSRF token store built on it
//! - [`session`]: cookie-keyed sessions persisted through any [`Storage`](storage::Storage)
//! - [`extractor`]: composable lookups for keys in headers, cookies, path
//!   params, forms and query strings
//! - [`middleware`]: CSRF, API keys, load shedding, rewrite/redirect rules,
//!   request ids and response timing
//! - [`backoff`]: exponential backoff with jitter for retrying fallible work
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::Method;
//! use tether::session::{Config, Manager};
//! use tether::{Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> tether::Result<()> {
//!     let sessions = Manager::new(Config::new())?;
//!
//!     let app = Router::new().on(Method::GET, "/visits", move |mut req: Request| {
//!         let sessions = sessions.clone();
//!         async move {
//!             let mut session = sessions.get(&mut req);
//!             let visits = session.get("visits").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
//!             session.set("visits", visits);
//!
//!             let mut res = Response::text(visits.to_string());
//!             if session.save(&mut res).is_err() {
//!                 return Response::status(http::StatusCode::INTERNAL_SERVER_ERROR);
//!             }
//!             res
//!         }
//!     });
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod backoff;
pub mod cookie;
pub mod extractor;
pub mod middleware;
pub mod rules;
pub mod session;
pub mod storage;

pub use cookie::{Cookie, SameSite};
pub use error::{Error, Result};
pub use handler::{BoxFuture, Handler};
pub use middleware::{from_fn, Middleware, Next};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response};
pub use router::Router;
pub use server::Server;
