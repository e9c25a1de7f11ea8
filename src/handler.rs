// Connection tasks: read each request, hand it to the driver, write the scripted answer
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::{TcpListener, TcpStream};

use crate::channels::{Channels, History};
use crate::config::Config;
use crate::http::{Conn, HttpRequest, HttpResponse, ReadError};
use crate::recorded::RecordedRequest;
use crate::response::{Response, TIMEOUT_MESSAGE};

const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

#[derive(Clone, Copy, Debug)]
pub(crate) struct Limits {
    pub buffer_size: usize,
    pub max_header_size: usize,
    pub max_body_size: usize,
    pub max_form_memory: usize,
}

impl Limits {
    pub fn from_config(c: &Config) -> Self {
        Limits {
            buffer_size: c.buffer_size,
            max_header_size: c.max_header_size,
            max_body_size: c.max_body_size,
            max_form_memory: c.max_form_memory,
        }
    }
}

/// Everything a connection task shares with the server.
pub(crate) struct HandlerCtx {
    pub channels: Arc<Channels>,
    pub history: Arc<History>,
    pub timeout_ms: Arc<AtomicU64>,
    pub limits: Limits,
}

impl HandlerCtx {
    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }
}

pub(crate) async fn accept_loop(listener: TcpListener, ctx: Arc<HandlerCtx>) {
    loop {
        match listener.accept().await {
            Ok((tcp, peer)) => {
                let _ = tcp.set_nodelay(true);
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    handle_connection(tcp, peer, ctx).await;
                });
            }
            Err(e) => {
                crate::log::error(&format!("Accept error: {e}"));
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}

async fn reject(conn: &mut Conn<TcpStream>, resp: HttpResponse) {
    let _ = conn.write_all(&resp.to_bytes()).await;
    conn.shutdown().await;
}

async fn handle_connection(tcp: TcpStream, peer: SocketAddr, ctx: Arc<HandlerCtx>) {
    let limits = ctx.limits;
    let mut conn = Conn::new(tcp, limits.buffer_size);

    loop {
        let head = match conn.read_head(limits.max_header_size).await {
            Ok(h) => h,
            Err(ReadError::Closed) => return,
            Err(e) => {
                crate::log::debug(&format!("{peer}: {e}"));
                if let Some(resp) = e.response() {
                    reject(&mut conn, resp).await;
                }
                return;
            }
        };

        let Some(mut req) = HttpRequest::parse(&head) else {
            reject(&mut conn, HttpResponse::error(400, "Bad Request")).await;
            return;
        };
        let Some(framing) = req.framing() else {
            reject(&mut conn, HttpResponse::error(400, "Bad Request")).await;
            return;
        };

        if req.expects_continue() && conn.write_all(CONTINUE).await.is_err() {
            return;
        }

        req.body = match conn.read_body(framing, limits.max_body_size).await {
            Ok(b) => b,
            Err(e) => {
                crate::log::error(&format!("Failed to read body of {} {} from {peer}: {e}", req.method, req.target));
                if let Some(resp) = e.response() {
                    reject(&mut conn, resp).await;
                }
                return;
            }
        };

        let keep_alive = req.keep_alive();
        let method = req.method.clone();
        let resp = match RecordedRequest::from_wire(req, Some(peer), limits.max_form_memory) {
            Some(recorded) => answer(recorded, &method, keep_alive, &ctx).await,
            None => HttpResponse::error(400, "Bad Request"),
        };

        if conn.write_all(&resp.to_bytes()).await.is_err() {
            crate::log::warn(&format!("Failed to write response to {peer}"));
            return;
        }
        let close = resp
            .get_header("Connection")
            .map(|v| v.eq_ignore_ascii_case("close"))
            .unwrap_or(false);
        if close {
            conn.shutdown().await;
            return;
        }
    }
}

/// One handler invocation: queue the request, then race a scripted producer
/// against the timeout. Exactly one producer is consumed, or none on timeout.
pub(crate) async fn answer(req: RecordedRequest, method: &str, keep_alive: bool, ctx: &HandlerCtx) -> HttpResponse {
    let started = Instant::now();
    let req = ctx.channels.push_request(&ctx.history, req).await;
    crate::log::request(method, &req.uri().to_string(), req.seq());

    let (descriptor, timed_out) = match ctx.channels.next_responder(ctx.timeout()).await {
        Some(f) => {
            let path = req.path();
            let r = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (*f)(path)));
            match r {
                Ok(d) => (d, false),
                Err(_) => {
                    crate::log::error(&format!("Response function panicked for {path} (recovered)"));
                    (Response::panicked(), false)
                }
            }
        }
        None => {
            crate::log::error(&format!("{} ({} {})", TIMEOUT_MESSAGE.trim_end(), method, req.uri()));
            (Response::timed_out(), true)
        }
    };

    let resp = descriptor.to_wire(method, keep_alive);
    crate::log::response(resp.status_code, started.elapsed().as_millis(), timed_out);
    resp
}
