// HTTP response parsing and serialization
use super::{find_hdr_end, get_hdr, parse_header_lines, Framing};
use bytes::Bytes;

#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub version: String,
    pub status_code: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

pub fn reason_phrase(c: u16) -> &'static str {
    ::http::StatusCode::from_u16(c)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}

/// Statuses that never carry a body.
pub fn status_has_body(c: u16) -> bool {
    !(matches!(c, 100..=199) || c == 204 || c == 304)
}

impl HttpResponse {
    pub fn new(c: u16) -> Self {
        HttpResponse {
            version: "HTTP/1.1".to_string(),
            status_code: c,
            status_text: reason_phrase(c).to_string(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Parse a status line and headers; anything after the head becomes the body.
    pub fn parse(r: &[u8]) -> Option<Self> {
        let e = find_hdr_end(r)?;
        let t = std::str::from_utf8(&r[..e]).ok()?;
        let mut l = t.split("\r\n");
        let sl = l.next()?;
        let (v, rest) = sl.split_once(' ')?;
        if !v.starts_with("HTTP/") { return None; }
        let (cs, txt) = rest.split_once(' ').unwrap_or((rest, ""));
        let c: u16 = cs.parse().ok()?;
        let h = parse_header_lines(l)?;
        let s = e + 4;
        let b = if s < r.len() { Bytes::copy_from_slice(&r[s..]) } else { Bytes::new() };
        Some(HttpResponse { version: v.to_string(), status_code: c, status_text: txt.to_string(), headers: h, body: b })
    }

    /// How the body following this head is delimited, given the request method.
    pub fn framing(&self, method: &str) -> Option<Framing> {
        if method.eq_ignore_ascii_case("HEAD") || !status_has_body(self.status_code) {
            return Some(Framing::Empty);
        }
        if let Some(te) = self.get_header("Transfer-Encoding") {
            return te.to_ascii_lowercase().contains("chunked").then_some(Framing::Chunked);
        }
        match self.get_header("Content-Length") {
            Some(cl) => cl.trim().parse::<usize>().ok().map(Framing::Length),
            None => Some(Framing::UntilClose),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut o = format!("{} {} {}\r\n", self.version, self.status_code, self.status_text);
        for (k, v) in &self.headers {
            o.push_str(k);
            o.push_str(": ");
            o.push_str(v);
            o.push_str("\r\n");
        }
        o.push_str("\r\n");
        let mut b = o.into_bytes();
        b.extend_from_slice(&self.body);
        b
    }

    pub fn error(c: u16, m: &str) -> Self {
        let mut r = HttpResponse::new(c);
        r.headers = vec![
            ("Content-Type".to_string(), "text/plain; charset=utf-8".to_string()),
            ("Content-Length".to_string(), m.len().to_string()),
            ("Connection".to_string(), "close".to_string()),
        ];
        r.body = Bytes::copy_from_slice(m.as_bytes());
        r
    }

    pub fn get_header(&self, n: &str) -> Option<&str> {
        get_hdr(&self.headers, n)
    }

    pub fn set_header(&mut self, n: &str, val: &str) {
        for (k, v) in self.headers.iter_mut() {
            if k.eq_ignore_ascii_case(n) {
                *v = val.to_string();
                return;
            }
        }
        self.headers.push((n.to_string(), val.to_string()));
    }
}
