//! Sessions, CSRF and the rest of the middleware stack on one small app.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example session
//!
//! Try:
//!   curl -i -c jar -b jar http://localhost:3000/visits
//!   curl -i -c jar -b jar http://localhost:3000/form
//!   curl -i -c jar -b jar -X POST -H "X-Csrf-Token: <token from /form>" http://localhost:3000/logout
//!   curl -i http://localhost:3000/old/visits
//!   curl -i -H 'Authorization: Bearer let-me-in' http://localhost:3000/api/whoami

use std::time::Duration;

use http::{Method, StatusCode};
use tether::middleware::csrf::{self, Csrf, CsrfToken};
use tether::middleware::keyauth::{self, ApiKey, KeyAuth};
use tether::middleware::load_shed::LoadShed;
use tether::middleware::redirect::{self, Redirect};
use tether::middleware::request_id::RequestIdLayer;
use tether::middleware::response_time::ResponseTime;
use tether::middleware::rewrite::{self, Rewrite};
use tether::session::{Config, Manager};
use tether::{Request, Response, Router, Server};

#[tokio::main]
async fn main() -> tether::Result<()> {
    tracing_subscriber::fmt::init();

    let sessions = Manager::new(Config::new().with_expiration(Duration::from_secs(15 * 60)))?;

    let visits = {
        let sessions = sessions.clone();
        move |mut req: Request| {
            let sessions = sessions.clone();
            async move {
                let mut session = sessions.get(&mut req);
                let count = session.get("visits").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
                session.set("visits", count);

                let mut res = Response::text(format!("visit #{count}\n"));
                if let Err(e) = session.save(&mut res) {
                    tracing::error!(error = %e, "session save failed");
                    return Response::status(StatusCode::INTERNAL_SERVER_ERROR);
                }
                res
            }
        }
    };

    let logout = {
        let sessions = sessions.clone();
        move |mut req: Request| {
            let sessions = sessions.clone();
            async move {
                let mut session = sessions.get(&mut req);
                let mut res = Response::text("bye\n");
                if session.reset().and_then(|()| session.save(&mut res)).is_err() {
                    return Response::status(StatusCode::INTERNAL_SERVER_ERROR);
                }
                res
            }
        }
    };

    let app = Router::new()
        .with(RequestIdLayer::default())
        .with(ResponseTime::default())
        .with(LoadShed::new(Duration::from_secs(5), |_req: Request| async {
            (StatusCode::SERVICE_UNAVAILABLE, "busy, try again\n")
        }))
        .with(Redirect::new(redirect::Config::new().rule("/old/*", "/$1"))?)
        .with(Rewrite::new(rewrite::Config::new().rule("/v1/*", "/api/$1"))?)
        .with(Csrf::new(csrf::Config::new().with_skip(|req| req.path().starts_with("/api/")))?)
        .with(KeyAuth::new(
            keyauth::Config::new()
                .with_validator(|_req, key| key == "let-me-in")
                .with_skip(|req| !req.path().starts_with("/api/")),
        )?)
        .on(Method::GET, "/visits", visits)
        .on(Method::GET, "/form", form)
        .on(Method::POST, "/logout", logout)
        .on(Method::GET, "/api/whoami", whoami);

    Server::bind("0.0.0.0:3000")?.serve(app).await?;

    sessions.storage().close()
}

async fn form(req: Request) -> Response {
    let token = req.extensions().get::<CsrfToken>().map(|t| t.0.as_str()).unwrap_or_default();
    Response::text(format!("send X-Csrf-Token: {token}\n"))
}

async fn whoami(req: Request) -> String {
    let key = req.extensions().get::<ApiKey>().map(|k| k.0.as_str()).unwrap_or_default();
    format!("authenticated with {key}\n")
}
