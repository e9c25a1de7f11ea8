// HTTP/1.x message framing over an async byte stream
mod request;
mod response;
pub use request::HttpRequest;
pub use response::{status_has_body, HttpResponse};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_HEADER_SIZE: usize = 65_536;
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;
const MAX_LINE: usize = 8192;

pub fn find_hdr_end(d: &[u8]) -> Option<usize> {
    if d.len() < 4 { return None; }
    for i in 0..=(d.len() - 4) {
        if &d[i..i + 4] == b"\r\n\r\n" { return Some(i); }
    }
    None
}

pub fn get_hdr<'a>(h: &'a [(String, String)], n: &str) -> Option<&'a str> {
    for (k, v) in h {
        if k.eq_ignore_ascii_case(n) { return Some(v.as_str()); }
    }
    None
}

/// Parse `Name: value` lines following the start line.
pub(crate) fn parse_header_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Option<Vec<(String, String)>> {
    let mut h = Vec::new();
    for ln in lines {
        if ln.is_empty() { break; }
        let (k, val) = ln.split_once(':')?;
        let k = k.trim();
        if k.is_empty() || k.bytes().any(|b| b <= b' ' || b == 0x7F) {
            return None;
        }
        h.push((k.to_string(), val.trim().to_string()));
    }
    Some(h)
}

/// Parse a chunk-size line, ignoring extensions.
pub fn parse_chunk_size(line: &str) -> Option<usize> {
    let size = line.split(';').next()?.trim();
    if size.is_empty() { return None; }
    usize::from_str_radix(size, 16).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Empty,
    Length(usize),
    Chunked,
    /// Body runs until the peer closes (responses only).
    UntilClose,
}

#[derive(Debug)]
pub enum ReadError {
    /// Peer closed before sending anything.
    Closed,
    HeadTooLarge,
    BodyTooLarge,
    Malformed(&'static str),
    Io(std::io::Error),
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::Closed => write!(f, "connection closed"),
            ReadError::HeadTooLarge => write!(f, "headers too large"),
            ReadError::BodyTooLarge => write!(f, "body too large"),
            ReadError::Malformed(m) => write!(f, "malformed message: {m}"),
            ReadError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl From<std::io::Error> for ReadError {
    fn from(e: std::io::Error) -> Self {
        ReadError::Io(e)
    }
}

impl From<ReadError> for std::io::Error {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::Io(e) => e,
            ReadError::Closed => std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection closed"),
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}

impl ReadError {
    /// The error answer for a request that failed to read, if one should be sent.
    pub fn response(&self) -> Option<HttpResponse> {
        match self {
            ReadError::HeadTooLarge => Some(HttpResponse::error(431, "Request Header Fields Too Large")),
            ReadError::BodyTooLarge => Some(HttpResponse::error(413, "Payload Too Large")),
            ReadError::Malformed(_) => Some(HttpResponse::error(400, "Bad Request")),
            ReadError::Closed | ReadError::Io(_) => None,
        }
    }
}

/// Buffered connection. Bytes read past the end of one message stay in the
/// buffer for the next.
pub struct Conn<S> {
    io: S,
    buf: BytesMut,
    buf_size: usize,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Conn<S> {
    pub fn new(io: S, buf_size: usize) -> Self {
        Conn { io, buf: BytesMut::with_capacity(buf_size), buf_size }
    }

    async fn fill(&mut self) -> std::io::Result<usize> {
        self.buf.reserve(self.buf_size);
        self.io.read_buf(&mut self.buf).await
    }

    /// Read through the blank line ending a message head.
    pub async fn read_head(&mut self, max: usize) -> Result<Bytes, ReadError> {
        loop {
            if let Some(p) = find_hdr_end(&self.buf) {
                if p + 4 > max {
                    return Err(ReadError::HeadTooLarge);
                }
                return Ok(self.buf.split_to(p + 4).freeze());
            }
            if self.buf.len() > max {
                return Err(ReadError::HeadTooLarge);
            }
            if self.fill().await? == 0 {
                return Err(if self.buf.is_empty() {
                    ReadError::Closed
                } else {
                    ReadError::Malformed("eof in head")
                });
            }
        }
    }

    pub async fn read_body(&mut self, framing: Framing, max: usize) -> Result<Bytes, ReadError> {
        match framing {
            Framing::Empty => Ok(Bytes::new()),
            Framing::Length(n) if n > max => Err(ReadError::BodyTooLarge),
            Framing::Length(n) => self.read_exact(n).await,
            Framing::Chunked => self.read_chunked(max).await,
            Framing::UntilClose => self.read_to_close(max).await,
        }
    }

    async fn read_exact(&mut self, n: usize) -> Result<Bytes, ReadError> {
        while self.buf.len() < n {
            if self.fill().await? == 0 {
                return Err(ReadError::Malformed("eof in body"));
            }
        }
        Ok(self.buf.split_to(n).freeze())
    }

    async fn read_line(&mut self) -> Result<String, ReadError> {
        loop {
            if let Some(p) = self.buf.windows(2).position(|w| w == b"\r\n") {
                let line = self.buf.split_to(p + 2);
                return std::str::from_utf8(&line[..p])
                    .map(|s| s.to_string())
                    .map_err(|_| ReadError::Malformed("invalid line encoding"));
            }
            if self.buf.len() > MAX_LINE {
                return Err(ReadError::Malformed("line too long"));
            }
            if self.fill().await? == 0 {
                return Err(ReadError::Malformed("eof in chunked body"));
            }
        }
    }

    async fn read_chunked(&mut self, max: usize) -> Result<Bytes, ReadError> {
        let mut body = BytesMut::new();
        loop {
            let line = self.read_line().await?;
            let size = parse_chunk_size(&line).ok_or(ReadError::Malformed("bad chunk size"))?;
            if size == 0 {
                // Trailers are read and dropped.
                while !self.read_line().await?.is_empty() {}
                return Ok(body.freeze());
            }
            body.len()
                .checked_add(size)
                .filter(|&total| total <= max)
                .ok_or(ReadError::BodyTooLarge)?;
            let data = self.read_exact(size).await?;
            body.extend_from_slice(&data);
            if !self.read_line().await?.is_empty() {
                return Err(ReadError::Malformed("missing chunk terminator"));
            }
        }
    }

    async fn read_to_close(&mut self, max: usize) -> Result<Bytes, ReadError> {
        loop {
            if self.buf.len() > max {
                return Err(ReadError::BodyTooLarge);
            }
            if self.fill().await? == 0 {
                return Ok(self.buf.split().freeze());
            }
        }
    }

    pub async fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.io.write_all(data).await?;
        self.io.flush().await
    }

    pub async fn shutdown(&mut self) {
        let _ = self.io.shutdown().await;
    }
}
