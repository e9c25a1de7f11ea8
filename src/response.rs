// Scripted response descriptors and the producers built from them
use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::http::{status_has_body, HttpResponse};

pub const TIMEOUT_MESSAGE: &str = "ERROR: Timeout waiting for test to prepare a response\n";
pub const PANIC_MESSAGE: &str = "ERROR: Response function panicked\n";
const NOT_FOUND_PREFIX: &str = "Path not found in response map: ";

/// What the server should answer for one request.
///
/// A `status` of 0 leaves the status unset, so the default 200 applies.
/// `headers` of None adds no headers beyond the framing ones.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Option<HashMap<String, String>>,
    pub body: Bytes,
}

/// Computes a response from the request path (no query string).
pub type ResponseFunc = Arc<dyn Fn(&str) -> Response + Send + Sync>;

/// Request path to response table.
pub type ResponseMap = HashMap<String, Response>;

impl Response {
    pub fn new(status: u16, headers: Option<HashMap<String, String>>, body: impl Into<Bytes>) -> Self {
        Response { status, headers, body: body.into() }
    }

    pub fn status(status: u16) -> Self {
        Response { status, ..Response::default() }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.get_or_insert_with(HashMap::new).insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub(crate) fn timed_out() -> Self {
        Response::new(500, None, TIMEOUT_MESSAGE)
    }

    pub(crate) fn panicked() -> Self {
        Response::new(500, None, PANIC_MESSAGE)
    }

    pub(crate) fn not_in_map(path: &str) -> Self {
        Response::new(500, None, format!("{NOT_FOUND_PREFIX}{path}"))
    }

    /// Render for the wire. Framing headers are always computed here, so a
    /// scripted `Content-Length` or `Transfer-Encoding` is replaced.
    pub(crate) fn to_wire(&self, method: &str, keep_alive: bool) -> HttpResponse {
        let status = if self.status == 0 { 200 } else { self.status };
        let mut r = HttpResponse::new(status);
        if let Some(h) = &self.headers {
            for (k, v) in h {
                r.set_header(k, v);
            }
        }
        r.headers.retain(|(k, _)| {
            !k.eq_ignore_ascii_case("Content-Length") && !k.eq_ignore_ascii_case("Transfer-Encoding")
        });
        if status_has_body(status) {
            if !self.body.is_empty() && r.get_header("Content-Type").is_none() {
                r.set_header("Content-Type", "text/plain; charset=utf-8");
            }
            r.set_header("Content-Length", &self.body.len().to_string());
            if !method.eq_ignore_ascii_case("HEAD") {
                r.body = self.body.clone();
            }
        }
        if !keep_alive {
            r.set_header("Connection", "close");
        }
        r
    }
}

/// Producer answering every request with the same descriptor.
pub fn fixed(resp: Response) -> ResponseFunc {
    Arc::new(move |_: &str| resp.clone())
}

/// Producer looking the path up in `map`; a miss becomes a 500 naming the path.
pub fn from_map(map: ResponseMap) -> ResponseFunc {
    Arc::new(move |path: &str| match map.get(path) {
        Some(r) => r.clone(),
        None => Response::not_in_map(path),
    })
}
