//! Snapshots of requests received by the fake server.

use std::net::SocketAddr;

use ::http::header::{HeaderMap, HeaderName, HeaderValue};
use ::http::{Method, Uri, Version};
use bytes::Bytes;

use crate::form::{self, Form};
use crate::http::HttpRequest;

/// A request as the server received it, with its body fully buffered.
///
/// The body is kept as [`Bytes`], so it can be read any number of times after
/// the connection that carried it is gone. Form bodies are additionally
/// decoded when they fit within the configured form memory ceiling; the raw
/// bytes are recorded either way.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    seq: u64,
    method: Method,
    uri: Uri,
    path: String,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    form: Option<Form>,
    peer: Option<SocketAddr>,
}

impl RecordedRequest {
    /// Convert a parsed wire request. Returns None when the method, target or
    /// a header cannot be represented by the `http` types.
    pub(crate) fn from_wire(req: HttpRequest, peer: Option<SocketAddr>, max_form_memory: usize) -> Option<Self> {
        let method = Method::from_bytes(req.method.as_bytes()).ok()?;
        let uri = req.target.parse::<Uri>().ok()?;
        let version = match req.version.as_str() {
            "HTTP/1.0" => Version::HTTP_10,
            _ => Version::HTTP_11,
        };
        let mut headers = HeaderMap::with_capacity(req.headers.len());
        for (k, v) in &req.headers {
            let name = HeaderName::from_bytes(k.as_bytes()).ok()?;
            let value = HeaderValue::from_bytes(v.as_bytes()).ok()?;
            headers.append(name, value);
        }
        let form = req
            .get_header("Content-Type")
            .and_then(|ct| form::parse(ct, &req.body, max_form_memory));
        Some(RecordedRequest {
            seq: 0,
            path: form::path_decode(uri.path()),
            method,
            uri,
            version,
            headers,
            body: req.body,
            form,
            peer,
        })
    }

    pub(crate) fn set_seq(&mut self, seq: u64) {
        self.seq = seq;
    }

    /// Arrival order, starting at 1 for the first request sent after `start`.
    /// The readiness check's own request does not use up a number.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request target exactly as sent.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Percent-decoded path without the query string. This is what response
    /// functions are called with.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Decoded `name=value` pairs of the query string.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.uri
            .query()
            .map(|q| form::parse_urlencoded(q.as_bytes()).fields)
            .unwrap_or_default()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of header `name`, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn form(&self) -> Option<&Form> {
        self.form.as_ref()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Rebuild an `http::Request` carrying a copy of the recorded body.
    pub fn to_http(&self) -> ::http::Request<Bytes> {
        let mut r = ::http::Request::new(self.body.clone());
        *r.method_mut() = self.method.clone();
        *r.uri_mut() = self.uri.clone();
        *r.version_mut() = self.version;
        *r.headers_mut() = self.headers.clone();
        r
    }
}
