//! rwhttpd - concurrent file server with per-path reader-writer locking
//!
//! Serves `GET` and `PUT` on the files of one directory. Each accepted
//! connection is queued for a fixed pool of worker threads and carries
//! exactly one request. Access to a file is arbitrated by a reader-writer
//! lock owned by its path, so requests for different files never wait for
//! each other while requests for the same file are ordered by the lock's
//! [`Priority`](limits::Priority).
//!
//! # Protocol Support
//!
//! - **HTTP/1.1 only**: other versions are answered with `505`
//! - **`GET`**: file contents with a `Content-Length` head
//! - **`PUT`**: creates (`201`) or replaces (`200`) a file, `Content-Length` required
//! - **`Request-Id`**: echoed into the access log, `0` when absent
//!
//! # Examples
//!
//! Quick start:
//! ```no_run
//! use rwhttpd::Server;
//!
//! fn main() -> Result<(), rwhttpd::Error> {
//!     Server::builder()
//!         .listener(rwhttpd::bind(8080)?)
//!         .build()
//!         .launch()
//! }
//! ```
//! Advanced configuration:
//! ```no_run
//! use rwhttpd::{limits::{LockLimits, Priority, ServerLimits}, AccessLog, Server};
//! use std::{fs::File, time::Duration};
//!
//! fn main() -> Result<(), rwhttpd::Error> {
//!     Server::builder()
//!         .listener(rwhttpd::bind(8080)?)
//!         .root("/srv/files")
//!         .access_log(AccessLog::new(File::create("access.log")?))
//!         .server_limits(ServerLimits {
//!             workers: 16,
//!             accept_poll_interval: Duration::from_millis(250),
//!             ..ServerLimits::default()
//!         })
//!         .lock_limits(LockLimits {
//!             priority: Priority::Writers,
//!             ..LockLimits::default()
//!         })
//!         .build()
//!         .launch()
//! }
//! ```
//!
//! The synchronization primitives the server is built from are public in
//! [`sync`].

pub(crate) mod http {
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod server {
    pub(crate) mod access_log;
    pub(crate) mod connection;
    pub(crate) mod io;
    pub(crate) mod listener;
    pub(crate) mod server_impl;
}
pub mod sync {
    //! Blocking primitives: a bounded MPMC queue, a reader-writer lock with
    //! selectable priority and a registry handing out one lock per path.

    pub(crate) mod queue;
    pub(crate) mod registry;
    pub(crate) mod rwlock;
    mod semaphore;

    pub use self::{
        queue::BoundedQueue,
        registry::{LockHandle, LockRegistry},
        rwlock::{Holder, LockState, PriorityRwLock, ReadGuard, WriteGuard},
    };
}
pub(crate) mod errors;
pub mod limits;

pub use crate::{
    errors::Error,
    http::types::{Method, StatusCode},
    server::{
        access_log::AccessLog,
        io::{copy_exact, write_exact},
        listener::bind,
        server_impl::{Server, ServerBuilder},
    },
};
