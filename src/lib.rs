//! A programmable HTTP test double.
//!
//! [`Server`] binds a local listener and queues every request it receives for
//! the test to inspect. The test decides, in its own time, what each request
//! gets back: a fixed response, a path-keyed table, or a function of the path.
//! A request nobody answers in time gets a 500 instead of hanging the client.
//!
//! ```no_run
//! use std::collections::HashMap;
//! use fakehttp::{Response, Server};
//!
//! let mut server = Server::with_port(0);
//! server.start();
//!
//! let mut map = HashMap::new();
//! map.insert("/a".to_string(), Response::new(200, None, "A"));
//! server.response_map(1, map);
//!
//! // client under test calls GET {server.url()}/a
//! let req = server.wait_request();
//! assert_eq!(req.method(), "GET");
//! ```

mod channels;
mod client;
mod colors;
pub mod config;
pub mod error;
pub mod form;
mod handler;
mod http;
mod log;
mod recorded;
mod response;
mod server;

pub use config::Config;
pub use error::{Error, Result};
pub use form::{Form, FormFile};
pub use recorded::RecordedRequest;
pub use response::{Response, ResponseFunc, ResponseMap, TIMEOUT_MESSAGE};
pub use server::Server;
