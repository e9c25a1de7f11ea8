// Configuration loading and validation
use serde::Deserialize;
use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_PORT: u16 = 4444;

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    /// Bound on every blocking wait, handler and driver side alike.
    pub timeout_ms: u64,
    pub queue_capacity: usize,
    pub buffer_size: usize,
    pub max_header_size: usize,
    pub max_body_size: usize,
    /// Form bodies above this size are kept as raw bytes only.
    pub max_form_memory: usize,
    pub ready_attempts: u32,
    pub ready_interval_ms: u64,
    pub logging: bool,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: format!("127.0.0.1:{DEFAULT_PORT}"),
            timeout_ms: 25_000,
            queue_capacity: 1024,
            buffer_size: 8192,
            max_header_size: 65_536,
            max_body_size: 16 * 1024 * 1024,
            max_form_memory: 1_000_000,
            ready_attempts: 100,
            ready_interval_ms: 100,
            logging: false,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn with_port(port: u16) -> Self {
        Config { listen_addr: format!("127.0.0.1:{port}"), ..Config::default() }
    }

    pub fn from_toml_str(txt: &str) -> Result<Self> {
        Ok(toml::from_str(txt)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let p = path.as_ref();
        let txt = fs::read_to_string(p)?;
        let cfg = Self::from_toml_str(&txt)?;
        crate::log::info(&format!("Loaded {}", p.display()));
        Ok(cfg)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn ready_interval(&self) -> Duration {
        Duration::from_millis(self.ready_interval_ms)
    }

    /// Resolve `listen_addr` (`host:port`, host may be a name). IPv4 is
    /// preferred when a name resolves to both families.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let invalid = || Error::InvalidAddress(self.listen_addr.clone());
        let addrs: Vec<SocketAddr> = self.listen_addr.to_socket_addrs().map_err(|_| invalid())?.collect();
        addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(invalid)
    }

    /// Fix up out-of-range values in place. Returns false when something
    /// cannot be repaired (an unparseable address).
    pub fn validate(&mut self) -> bool {
        let mut valid = true;

        if self.socket_addr().is_err() {
            crate::log::error(&format!("listen_addr '{}' is not a valid address (expected host:port)", self.listen_addr));
            valid = false;
        }
        if self.timeout_ms == 0 {
            crate::log::warn("timeout_ms is 0, using 25000");
            self.timeout_ms = 25_000;
        }
        if self.queue_capacity == 0 {
            crate::log::warn("queue_capacity is 0, using 1024");
            self.queue_capacity = 1024;
        }
        if self.buffer_size < 1024 {
            crate::log::warn(&format!("buffer_size too small ({}), using 1024", self.buffer_size));
            self.buffer_size = 1024;
        }
        if self.max_header_size == 0 {
            self.max_header_size = 65_536;
        }
        if self.max_body_size == 0 {
            self.max_body_size = 16 * 1024 * 1024;
        }
        if self.max_form_memory > self.max_body_size {
            crate::log::warn(&format!(
                "max_form_memory ({}) > max_body_size ({}), forms are capped by the body limit",
                self.max_form_memory, self.max_body_size
            ));
        }
        if self.ready_attempts == 0 {
            crate::log::warn("ready_attempts is 0, using 100");
            self.ready_attempts = 100;
        }
        if self.ready_interval_ms == 0 {
            self.ready_interval_ms = 100;
        }
        if !crate::log::is_valid_level(&self.log_level) {
            crate::log::warn(&format!("unknown log_level '{}', using info", self.log_level));
            self.log_level = "info".to_string();
        }

        valid
    }
}
