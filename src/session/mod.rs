//! Cookie-carried server-side sessions.
//!
//! A [`Manager`] turns each request into a [`Session`]: the id comes from the
//! session cookie (or is generated), the state is loaded from the configured
//! [`Storage`](crate::storage::Storage), handlers read and write it in memory,
//! and [`Session::save`] commits it back together with the cookie.
//!
//! ```rust,no_run
//! use tether::session::{Config, Manager};
//! use tether::{Request, Response};
//!
//! async fn login(sessions: Manager, mut req: Request) -> Response {
//!     let mut session = sessions.get(&mut req);
//!     session.set("user", "alice");
//!
//!     let mut res = Response::text("welcome");
//!     if session.save(&mut res).is_err() {
//!         return Response::status(http::StatusCode::INTERNAL_SERVER_ERROR);
//!     }
//!     res
//! }
//! ```
//!
//! Concurrent requests carrying the same id are not serialised against each
//! other: the last `save` wins.

mod config;
mod db;
mod handle;
mod manager;

pub use config::{uuid_generator, Config, KeyGenerator, DEFAULT_COOKIE_NAME, DEFAULT_EXPIRATION};
pub use db::Db;
pub use handle::Session;
pub use manager::Manager;
