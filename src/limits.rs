//! Server configuration limits and lock policy
//!
//! # Conservative Defaults
//!
//! Every limit has a default matching the wire format the server speaks:
//! - One head buffer of `4 KB` per connection
//! - Short flat resource names (`63` characters)
//! - Bounded header lines, so a single request can never grow unbounded
//!
//! # Memory Consumption
//!
//! Each worker holds at most one connection at a time and consumes:
//!
//! `Total` = [`Head Buffer`](crate::limits::ReqLimits::head_size) +
//!           `Copy Buffer (8 KB)` + `Thread Stack`
//!
//! # Examples
//!
//! ```no_run
//! use rwhttpd::{Server, limits::{LockLimits, Priority, ServerLimits}};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), rwhttpd::Error> {
//!     Server::builder()
//!         .listener(rwhttpd::bind(8080)?)
//!         .root("/srv/files")
//!         .server_limits(ServerLimits {
//!             workers: 16, // More concurrent requests
//!             ..ServerLimits::default()
//!         })
//!         .lock_limits(LockLimits {
//!             priority: Priority::Writers, // Uploads go ahead of queued downloads
//!             ..LockLimits::default()
//!         })
//!         .build()
//!         .launch()
//! }
//! ```

use std::time::Duration;

/// Controls the worker pool and the accept loop.
///
/// # Connection management
/// ```text
///              [------------]
///              [ Tcp accept ] <=========================\\
///              [------------]                           ||
///                    ||                                 ||
///                    || TCP_STREAM                      ||
///                    \/                                 ||
/// [--------]   Yes  /----------------\   No   [-------------------]
/// [ Wait   ] <===== | Is queue full? | =====> [ Push to the queue ]
/// [--------]        \----------------/        [-------------------]
///                                                       ||
///                                                       \/
///                                            [---------------------]
///                                            [ Worker pops & serves ]
///                                            [---------------------]
/// ```
///
/// The queue holds at most `workers` connections, so the accept loop stops
/// accepting while every worker is busy and the queue is full.
///
/// # Worker
/// A worker is an OS thread created once during startup. It runs in a loop,
/// taking connections from the shared queue until shutdown is requested.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Number of worker threads and capacity of the connection queue (default: `4`).
    pub workers: usize,

    /// How long one blocking `accept` waits before the shutdown flag is
    /// re-checked (default: `100 ms`).
    ///
    /// A smaller value makes shutdown more responsive at the cost of more
    /// wakeups while idle.
    pub accept_poll_interval: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            workers: 4,
            accept_poll_interval: Duration::from_millis(100),

            _priv: (),
        }
    }
}

/// Request parsing limits
///
/// Lengths are measured in bytes. Anything longer is rejected with
/// `400 Bad Request`.
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Size of the buffer the request head is read into (default: `4 KB`)
    ///
    /// The request line, all headers and the blank line must fit. Body bytes
    /// arriving in the same read are kept and written before the rest of the
    /// body is copied from the socket.
    pub head_size: usize,

    /// Maximum method length (default: `8`)
    pub method_size: usize,
    /// Maximum resource name length, without the leading `/` (default: `63`)
    pub path_size: usize,

    /// Maximum header name length (default: `128`)
    pub header_name_size: usize,
    /// Maximum header value length (default: `128`)
    pub header_value_size: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ReqLimits {
    #[inline(always)]
    fn default() -> Self {
        Self {
            head_size: 4096,
            method_size: 8,
            path_size: 63,
            header_name_size: 128,
            header_value_size: 128,

            _priv: (),
        }
    }
}

/// Admission policy applied to each per-path lock
#[derive(Debug, Clone)]
pub struct LockLimits {
    /// Policy of every lock the registry creates (default: `NWay(4)`)
    pub priority: Priority,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for LockLimits {
    #[inline(always)]
    fn default() -> Self {
        Self {
            priority: Priority::NWay(4),

            _priv: (),
        }
    }
}

/// Which side a [`PriorityRwLock`](crate::sync::PriorityRwLock) favours
/// when both readers and writers are waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    /// New readers are admitted as long as no writer holds the lock.
    ///
    /// Writers may starve under sustained reads.
    Readers,
    /// A waiting writer blocks every new reader.
    ///
    /// Readers may starve under sustained writes.
    Writers,
    /// Readers and writers take turns.
    ///
    /// While a writer waits, at most `n` readers are admitted per round; a
    /// writer leaving the lock lets waiting readers go before the next writer.
    NWay(usize),
}
