//! One line per handled request: `METHOD,/path,STATUS,ID`.

use std::{
    fmt,
    io::{self, Write},
    sync::{Mutex, PoisonError},
};
use tracing::warn;

/// Serialized request log shared by all workers.
///
/// Lines are written under one mutex, so concurrent requests never produce
/// interleaved output. The default sink is standard error.
///
/// # Examples
/// ```
/// use rwhttpd::AccessLog;
///
/// let log = AccessLog::new(Vec::new());
/// log.record("GET", "index.html", 200, 7);
/// ```
pub struct AccessLog {
    sink: Mutex<Box<dyn Write + Send>>,
}

impl AccessLog {
    #[inline]
    pub fn new<W: Write + Send + 'static>(sink: W) -> Self {
        Self {
            sink: Mutex::new(Box::new(sink)),
        }
    }

    #[inline]
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// Appends the entry for one request. `path` is given without the
    /// leading `/`.
    pub fn record(&self, method: &str, path: &str, status: u16, request_id: i64) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);

        let result = writeln!(sink, "{method},/{path},{status},{request_id}").and_then(|_| sink.flush());

        if let Err(err) = result {
            warn!(%err, method, path, status, request_id, "access log write failed");
        }
    }
}

impl Default for AccessLog {
    #[inline]
    fn default() -> Self {
        Self::stderr()
    }
}

impl fmt::Debug for AccessLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessLog").finish_non_exhaustive()
    }
}
