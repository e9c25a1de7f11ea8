// Form body decoding: multipart/form-data and application/x-www-form-urlencoded
use bytes::Bytes;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Form {
    pub fields: Vec<(String, String)>,
    pub files: Vec<FormFile>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FormFile {
    pub field: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl Form {
    /// First value submitted under `name`.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn values(&self, name: &str) -> Vec<&str> {
        self.fields.iter().filter(|(k, _)| k == name).map(|(_, v)| v.as_str()).collect()
    }

    pub fn file(&self, name: &str) -> Option<&FormFile> {
        self.files.iter().find(|f| f.field == name)
    }
}

/// Decode `body` according to `content_type`. Returns None for non-form
/// content, bodies above `max_memory`, or malformed multipart framing.
pub fn parse(content_type: &str, body: &[u8], max_memory: usize) -> Option<Form> {
    if body.len() > max_memory {
        return None;
    }
    let mime = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match mime.as_str() {
        "application/x-www-form-urlencoded" => Some(parse_urlencoded(body)),
        "multipart/form-data" => parse_multipart(&boundary(content_type)?, body),
        _ => None,
    }
}

pub fn parse_urlencoded(body: &[u8]) -> Form {
    let text = String::from_utf8_lossy(body);
    let fields = text
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| {
            let (k, v) = p.split_once('=').unwrap_or((p, ""));
            (percent_decode(k), percent_decode(v))
        })
        .collect();
    Form { fields, files: Vec::new() }
}

/// Decode a query or form component: `%XX` escapes and `+` as space.
pub fn percent_decode(s: &str) -> String {
    unescape(s, true)
}

/// Decode `%XX` escapes only, leaving `+` alone (URL paths).
pub fn path_decode(s: &str) -> String {
    unescape(s, false)
}

fn unescape(s: &str, plus_as_space: bool) -> String {
    let b = s.as_bytes();
    let mut out = Vec::with_capacity(b.len());
    let mut i = 0;
    while i < b.len() {
        match b[i] {
            b'+' if plus_as_space => out.push(b' '),
            b'%' if i + 2 < b.len() => {
                match (hex_val(b[i + 1]), hex_val(b[i + 2])) {
                    (Some(h), Some(l)) => {
                        out.push(h << 4 | l);
                        i += 2;
                    }
                    _ => out.push(b'%'),
                }
            }
            c => out.push(c),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn boundary(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|p| {
        let (k, v) = p.split_once('=')?;
        if k.trim().eq_ignore_ascii_case("boundary") {
            let v = v.trim().trim_matches('"');
            (!v.is_empty()).then(|| v.to_string())
        } else {
            None
        }
    })
}

fn find(hay: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > hay.len() || needle.len() > hay.len() - from {
        return None;
    }
    hay[from..].windows(needle.len()).position(|w| w == needle).map(|p| p + from)
}

/// Pull `name` and `filename` out of a Content-Disposition value.
fn disposition(value: &str) -> (Option<String>, Option<String>) {
    let mut name = None;
    let mut filename = None;
    for p in value.split(';').skip(1) {
        if let Some((k, v)) = p.split_once('=') {
            let v = v.trim().trim_matches('"').to_string();
            match k.trim().to_ascii_lowercase().as_str() {
                "name" => name = Some(v),
                "filename" => filename = Some(v),
                _ => {}
            }
        }
    }
    (name, filename)
}

pub fn parse_multipart(boundary: &str, body: &[u8]) -> Option<Form> {
    let delim = format!("--{boundary}").into_bytes();
    let mut close = b"\r\n".to_vec();
    close.extend_from_slice(&delim);

    let mut form = Form::default();
    let mut pos = find(body, &delim, 0)? + delim.len();
    loop {
        if body[pos..].starts_with(b"--") {
            return Some(form);
        }
        // Transport padding after the delimiter is allowed.
        while pos < body.len() && (body[pos] == b' ' || body[pos] == b'\t') {
            pos += 1;
        }
        if !body[pos..].starts_with(b"\r\n") {
            return None;
        }
        pos += 2;

        let (headers, start) = if body[pos..].starts_with(b"\r\n") {
            (Vec::new(), pos + 2)
        } else {
            let e = crate::http::find_hdr_end(&body[pos..])?;
            let text = std::str::from_utf8(&body[pos..pos + e]).ok()?;
            (crate::http::parse_header_lines(text.split("\r\n"))?, pos + e + 4)
        };
        let end = find(body, &close, start)?;
        let data = &body[start..end];
        pos = end + close.len();

        let (name, filename) = crate::http::get_hdr(&headers, "Content-Disposition")
            .map(disposition)
            .unwrap_or((None, None));
        let Some(name) = name else { continue };
        match filename {
            Some(filename) => form.files.push(FormFile {
                field: name,
                filename,
                content_type: crate::http::get_hdr(&headers, "Content-Type").map(|s| s.to_string()),
                data: Bytes::copy_from_slice(data),
            }),
            None => form.fields.push((name, String::from_utf8_lossy(data).into_owned())),
        }
    }
}
