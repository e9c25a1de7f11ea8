// HTTP request head parsing and serialization
use super::{find_hdr_end, get_hdr, parse_header_lines, Framing};
use bytes::Bytes;

#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: String,
    pub target: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

impl HttpRequest {
    /// Parse a request head (start line and headers). Any bytes after the
    /// blank line are ignored; the body is framed separately.
    /// Returns None for malformed input.
    pub fn parse(r: &[u8]) -> Option<Self> {
        let e = find_hdr_end(r)?;
        let t = std::str::from_utf8(&r[..e]).ok()?;
        let mut l = t.split("\r\n");
        let rl = l.next()?;
        let mut p = rl.split(' ');
        let m = p.next()?.to_string();
        let target = p.next()?.to_string();
        let v = p.next()?.to_string();

        if p.next().is_some() { return None; }

        // Any method token is accepted: the double answers whatever it is sent.
        if !is_token(&m) { return None; }

        if target.is_empty() || target.bytes().any(|b| b <= 0x20 || b == 0x7F) {
            return None;
        }

        if v != "HTTP/1.0" && v != "HTTP/1.1" {
            return None;
        }

        let h = parse_header_lines(l)?;
        Some(HttpRequest { method: m, target, version: v, headers: h, body: Bytes::new() })
    }

    /// How the body following this head is delimited.
    pub fn framing(&self) -> Option<Framing> {
        if let Some(te) = self.get_header("Transfer-Encoding") {
            return if te.rsplit(',').next().map(|s| s.trim().eq_ignore_ascii_case("chunked")).unwrap_or(false) {
                Some(Framing::Chunked)
            } else {
                None
            };
        }
        match self.get_header("Content-Length") {
            Some(cl) => cl.trim().parse::<usize>().ok().map(|n| if n == 0 { Framing::Empty } else { Framing::Length(n) }),
            None => Some(Framing::Empty),
        }
    }

    pub fn expects_continue(&self) -> bool {
        self.version == "HTTP/1.1"
            && self.get_header("Expect").map(|v| v.eq_ignore_ascii_case("100-continue")).unwrap_or(false)
    }

    pub fn keep_alive(&self) -> bool {
        let conn = self.get_header("Connection").map(|v| v.to_ascii_lowercase());
        match self.version.as_str() {
            "HTTP/1.1" => !conn.map(|c| c.split(',').any(|t| t.trim() == "close")).unwrap_or(false),
            _ => conn.map(|c| c.split(',').any(|t| t.trim() == "keep-alive")).unwrap_or(false),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut o = format!("{} {} {}\r\n", self.method, self.target, self.version);
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
