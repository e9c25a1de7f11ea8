// Minimal HTTP/1.1 client, used to probe the server's own listener
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpStream;

use crate::http::{Conn, HttpRequest, HttpResponse, MAX_BODY_SIZE, MAX_HEADER_SIZE};

pub const PROBE_AGENT: &str = "fakehttp-probe";

/// Send `req` on a fresh connection and read one response, skipping interim
/// 1xx answers. The whole exchange is bounded by `timeout`.
pub async fn send(addr: SocketAddr, req: &HttpRequest, timeout: Duration) -> io::Result<HttpResponse> {
    tokio::time::timeout(timeout, exchange(addr, req))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, format!("no response from {addr} within {timeout:?}")))?
}

async fn exchange(addr: SocketAddr, req: &HttpRequest) -> io::Result<HttpResponse> {
    let tcp = TcpStream::connect(addr).await?;
    let _ = tcp.set_nodelay(true);
    let mut conn = Conn::new(tcp, 8192);
    conn.write_all(&req.to_bytes()).await?;

    loop {
        let head = conn.read_head(MAX_HEADER_SIZE).await?;
        let mut resp = HttpResponse::parse(&head)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed response head"))?;
        if (100..200).contains(&resp.status_code) && resp.status_code != 101 {
            continue;
        }
        let framing = resp
            .framing(&req.method)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unsupported response framing"))?;
        resp.body = conn.read_body(framing, MAX_BODY_SIZE).await?;
        conn.shutdown().await;
        return Ok(resp);
    }
}

/// Plain `GET target` with `Connection: close`.
pub async fn get(addr: SocketAddr, target: &str, timeout: Duration) -> io::Result<HttpResponse> {
    let mut req = HttpRequest {
        method: "GET".to_string(),
        target: target.to_string(),
        version: "HTTP/1.1".to_string(),
        headers: Vec::new(),
        body: Bytes::new(),
    };
    req.set_header("Host", &addr.to_string());
    req.set_header("User-Agent", PROBE_AGENT);
    req.set_header("Connection", "close");
    send(addr, &req, timeout).await
}
