//! The fake server and its driver-facing API.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;

use crate::channels::{Channels, History};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::handler::{accept_loop, HandlerCtx, Limits};
use crate::recorded::RecordedRequest;
use crate::response::{self, Response, ResponseMap};

/// Status the readiness probe is scripted to answer with.
const PROBE_STATUS: u16 = 203;

struct Running {
    runtime: Runtime,
    channels: Arc<Channels>,
    addr: SocketAddr,
}

/// A programmable HTTP server for tests.
///
/// Requests sent to the server are queued for the test to inspect with
/// [`wait_request`](Server::wait_request); each one is held open until the test
/// schedules a response for it, or until the timeout turns it into a 500.
/// Responses are matched to requests by position: the Nth scheduled response
/// answers the Nth request still waiting, whatever its path.
///
/// Driver methods block the calling thread and must not be called from inside
/// an async runtime. Dropping the server stops it.
///
/// ```no_run
/// use fakehttp::Server;
///
/// let mut server = Server::with_port(0);
/// server.start();
/// server.response(200, None, "hello");
/// // ... point the client under test at server.url() ...
/// let req = server.wait_request();
/// assert_eq!(req.path(), "/greeting");
/// ```
pub struct Server {
    config: Config,
    timeout_ms: Arc<AtomicU64>,
    history: Arc<History>,
    running: Option<Running>,
}

impl Default for Server {
    fn default() -> Self {
        Server::new()
    }
}

impl Server {
    /// Server on the default port, 4444.
    pub fn new() -> Self {
        Server::with_config(Config::default())
    }

    /// Server on `127.0.0.1:port`. Port 0 picks a free one at start.
    pub fn with_port(port: u16) -> Self {
        Server::with_config(Config::with_port(port))
    }

    pub fn with_config(config: Config) -> Self {
        Server {
            timeout_ms: Arc::new(AtomicU64::new(config.timeout_ms)),
            config,
            history: Arc::new(History::default()),
            running: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    /// Applies to every wait that starts after the call, on both sides.
    pub fn set_timeout(&self, d: Duration) {
        let ms = u64::try_from(d.as_millis()).unwrap_or(u64::MAX).max(1);
        self.timeout_ms.store(ms, Ordering::Relaxed);
    }

    pub fn is_started(&self) -> bool {
        self.running.is_some()
    }

    /// Address actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.addr)
    }

    /// Base URL, e.g. `http://127.0.0.1:4444`. Before start this reflects the
    /// configured address.
    pub fn url(&self) -> String {
        match self.local_addr() {
            Some(a) => format!("http://{a}"),
            None => format!("http://{}", self.config.listen_addr),
        }
    }

    /// Start serving and block until the listener answers. Calling it again is
    /// a no-op.
    ///
    /// # Panics
    ///
    /// If the address is invalid, cannot be bound, or the server never becomes
    /// ready. A test cannot proceed without its listener.
    pub fn start(&mut self) {
        if let Err(e) = self.try_start() {
            crate::log::error(&format!("Server failed to start: {e}"));
            panic!("fakehttp: {e}");
        }
    }

    /// Like [`start`](Server::start), returning the failure instead of panicking.
    pub fn try_start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Ok(());
        }
        if !self.config.validate() {
            return Err(Error::InvalidAddress(self.config.listen_addr.clone()));
        }
        // Zero can only come from the config, set_timeout never stores it.
        let _ = self
            .timeout_ms
            .compare_exchange(0, self.config.timeout_ms, Ordering::Relaxed, Ordering::Relaxed);
        crate::log::init(self.config.logging);
        crate::log::set_level(&self.config.log_level);

        let addr = self.config.socket_addr()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("fakehttp")
            .enable_all()
            .build()?;
        let listener = runtime
            .block_on(TcpListener::bind(addr))
            .map_err(|e| Error::Bind { addr: addr.to_string(), source: e })?;
        let local = listener.local_addr()?;

        let channels = Arc::new(Channels::new(self.config.queue_capacity));
        let ctx = Arc::new(HandlerCtx {
            channels: Arc::clone(&channels),
            history: Arc::clone(&self.history),
            timeout_ms: Arc::clone(&self.timeout_ms),
            limits: Limits::from_config(&self.config),
        });
        runtime.spawn(accept_loop(listener, ctx));
        self.running = Some(Running { runtime, channels, addr: local });
        crate::log::info(&format!("Listening on {}", self.url()));

        if let Err(e) = self.await_ready() {
            self.running = None;
            return Err(e);
        }
        Ok(())
    }

    /// Round-trip one scripted request through the listener, then hide it
    /// from the queue and the history.
    fn await_ready(&self) -> Result<()> {
        let running = self.running()?;
        self.response(PROBE_STATUS, None, "");
        let url = self.url();
        let attempts = self.config.ready_attempts;

        for attempt in 1..=attempts {
            let probe = running
                .runtime
                .block_on(crate::client::get(running.addr, "/", self.timeout()));
            match probe {
                Ok(resp) if resp.status_code == PROBE_STATUS => {
                    crate::log::probe(&url, attempt, "ready");
                    let consumed = running.channels.recv_requests(&running.runtime, 1, self.timeout())?;
                    for r in consumed {
                        self.history.remove(r.seq());
                    }
                    return Ok(());
                }
                Ok(resp) => crate::log::probe(&url, attempt, &format!("status {}", resp.status_code)),
                Err(e) => crate::log::probe(&url, attempt, &e.to_string()),
            }
            std::thread::sleep(self.config.ready_interval());
        }
        Err(Error::NotReady { url, attempts })
    }

    fn running(&self) -> Result<&Running> {
        self.running.as_ref().ok_or(Error::NotStarted)
    }

    fn started(&self) -> &Running {
        match self.running.as_ref() {
            Some(r) => r,
            None => panic!("fakehttp: server not started, call start() first"),
        }
    }

    /// Discard every queued request and every scheduled response.
    pub fn flush(&self) {
        let (requests, responses) = self.started().channels.flush();
        crate::log::debug(&format!("Flushed {requests} request(s), {responses} response(s)"));
    }

    /// Answer the next request with this status, headers and body.
    pub fn response(&self, status: u16, headers: Option<HashMap<String, String>>, body: impl Into<Bytes>) {
        self.responses(1, status, headers, body);
    }

    /// Answer each of the next `n` requests with the same status, headers and body.
    pub fn responses(&self, n: usize, status: u16, headers: Option<HashMap<String, String>>, body: impl Into<Bytes>) {
        let f = response::fixed(Response::new(status, headers, body));
        self.schedule(n, f);
    }

    /// Answer each of the next `n` requests with `f(path)`.
    pub fn response_func<F>(&self, n: usize, f: F)
    where
        F: Fn(&str) -> Response + Send + Sync + 'static,
    {
        self.schedule(n, Arc::new(f));
    }

    /// Answer each of the next `n` requests from `map`, keyed by path. A path
    /// missing from the map gets a 500 naming it.
    pub fn response_map(&self, n: usize, map: ResponseMap) {
        self.schedule(n, response::from_map(map));
    }

    fn schedule(&self, n: usize, f: response::ResponseFunc) {
        let running = self.started();
        for _ in 0..n {
            running.channels.schedule(Arc::clone(&f));
        }
    }

    /// Next request, in arrival order.
    ///
    /// # Panics
    ///
    /// If none arrives within the timeout.
    pub fn wait_request(&self) -> RecordedRequest {
        let mut reqs = self.wait_requests(1);
        match reqs.pop() {
            Some(r) => r,
            None => panic!("fakehttp: no request returned"),
        }
    }

    /// Next `n` requests, in arrival order.
    ///
    /// # Panics
    ///
    /// If any of them fails to arrive within the timeout.
    pub fn wait_requests(&self, n: usize) -> Vec<RecordedRequest> {
        match self.try_wait_requests(n) {
            Ok(r) => r,
            Err(e) => panic!("fakehttp: {e}"),
        }
    }

    /// Like [`wait_requests`](Server::wait_requests), returning the timeout as
    /// an error. Requests taken before the timeout are not returned.
    pub fn try_wait_requests(&self, n: usize) -> Result<Vec<RecordedRequest>> {
        let running = self.running()?;
        running.channels.recv_requests(&running.runtime, n, self.timeout())
    }

    /// Every request received so far, in arrival order, whether or not it has
    /// been taken with `wait_request`.
    pub fn saved_requests(&self) -> Vec<RecordedRequest> {
        self.history.snapshot()
    }
}
