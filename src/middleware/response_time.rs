//! Stamps the time spent downstream onto the response.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;

pub const DEFAULT_HEADER: &str = "X-Response-Time";

/// Response-time middleware. The header is written after the downstream
/// returns, whatever the status.
pub struct ResponseTime {
    header: Arc<str>,
}

impl ResponseTime {
    pub fn new(header: &str) -> Self {
        Self { header: header.into() }
    }
}

impl Default for ResponseTime {
    fn default() -> Self {
        Self::new(DEFAULT_HEADER)
    }
}

impl Middleware for ResponseTime {
    fn call(&self, req: Request, next: Next) -> BoxFuture {
        let header = Arc::clone(&self.header);
        Box::pin(async move {
            let start = Instant::now();
            let mut res = next.run(req).await;
            res.set_header(&header, format_duration(start.elapsed()));
            res
        })
    }
}

/// Formats a duration as `<number><unit>` with the largest unit among
/// `ns`, `µs`, `ms` and `s` that keeps the integer part non-zero.
/// Trailing fractional zeros are dropped: `1.5ms`, `250µs`, `2s`.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_owned();
    }
    let (unit, scale, width) = match nanos {
        0..1_000 => ("ns", 1, 0),
        1_000..1_000_000 => ("µs", 1_000, 3),
        1_000_000..1_000_000_000 => ("ms", 1_000_000, 6),
        _ => ("s", 1_000_000_000, 9),
    };
    let whole = nanos / scale;
    let frac = nanos % scale;
    if frac == 0 {
        return format!("{whole}{unit}");
    }
    let frac = format!("{frac:0width$}");
    format!("{whole}.{}{unit}", frac.trim_end_matches('0'))
}
