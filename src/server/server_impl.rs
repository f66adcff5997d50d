use crate::{
    errors::Error,
    limits::{LockLimits, ReqLimits, ServerLimits},
    server::{access_log::AccessLog, connection::HttpConnection},
    sync::{BoundedQueue, LockRegistry},
};
use socket2::SockRef;
use std::{
    io,
    net::{SocketAddr, TcpListener, TcpStream},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{debug, info, trace, warn};

/// Work item handed from the accept loop to the workers.
pub(crate) enum Task {
    Serve(TcpStream, SocketAddr),
    /// Posted at shutdown to release workers parked in `pop`
    Wake,
}

/// Everything the accept loop and the workers share.
///
/// Created once before the workers start and dropped after the last of them
/// has been joined, taking the queue, the registry and every path lock with it.
pub(crate) struct ServerContext {
    pub(crate) queue: BoundedQueue<Task>,
    pub(crate) registry: LockRegistry,
    pub(crate) access_log: AccessLog,
    pub(crate) shutdown: Arc<AtomicBool>,

    pub(crate) root: PathBuf,
    pub(crate) server_limits: ServerLimits,
    pub(crate) req_limits: ReqLimits,
}

impl ServerContext {
    #[track_caller]
    pub(crate) fn new(
        root: PathBuf,
        server_limits: ServerLimits,
        req_limits: ReqLimits,
        lock_limits: LockLimits,
        access_log: AccessLog,
    ) -> Self {
        Self {
            queue: BoundedQueue::new(server_limits.workers),
            registry: LockRegistry::new(lock_limits),
            access_log,
            shutdown: Arc::new(AtomicBool::new(false)),

            root,
            server_limits,
            req_limits,
        }
    }

    #[inline(always)]
    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// A file server handing each accepted connection to a fixed pool of
/// worker threads.
///
/// `GET` reads a file below the root directory, `PUT` creates or replaces
/// one. Requests for the same path are ordered by that path's reader-writer
/// lock; requests for different paths never wait for each other.
///
/// # Examples
///
/// ```no_run
/// use rwhttpd::Server;
///
/// fn main() -> Result<(), rwhttpd::Error> {
///     Server::builder()
///         .listener(rwhttpd::bind(8080)?)
///         .root("/srv/files")
///         .build()
///         .launch()
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
}

impl Server {
    /// Creates a new builder for configuring the server instance.
    #[inline]
    pub fn builder() -> ServerBuilder {
        ServerBuilder {
            listener: None,
            root: None,
            access_log: None,
            shutdown: None,

            server_limits: None,
            request_limits: None,
            lock_limits: None,
        }
    }

    /// Flag that stops the server once set.
    ///
    /// The accept loop notices it within
    /// [`accept_poll_interval`](ServerLimits::accept_poll_interval).
    #[inline]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.ctx.shutdown.clone()
    }

    #[inline]
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Starts the workers and accepts connections until the shutdown flag
    /// is set.
    ///
    /// On shutdown, requests in flight run to completion while connections
    /// still queued are closed unserved. The call returns once every worker
    /// has exited.
    ///
    /// # Errors
    /// Fails when the listener cannot be configured or a worker thread
    /// cannot be started. Workers started before the failure are stopped
    /// and joined first.
    pub fn launch(self) -> Result<(), Error> {
        let Server { listener, ctx } = self;

        SockRef::from(&listener).set_read_timeout(Some(ctx.server_limits.accept_poll_interval))?;

        let mut workers = Vec::with_capacity(ctx.server_limits.workers);
        for id in 0..ctx.server_limits.workers {
            match spawn_worker(id, &ctx) {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    ctx.shutdown.store(true, Ordering::Release);
                    stop_workers(&ctx, workers);
                    return Err(Error::Spawn(err));
                }
            }
        }

        info!(
            addr = ?listener.local_addr().ok(),
            root = %ctx.root.display(),
            workers = ctx.server_limits.workers,
            "listening"
        );

        while !ctx.is_shutting_down() {
            match listener.accept() {
                Ok((stream, addr)) => {
                    // Accepted sockets may inherit the accept timeout.
                    if let Err(err) = stream.set_read_timeout(None) {
                        warn!(%err, %addr, "dropping connection");
                        continue;
                    }

                    trace!(%addr, "accepted");
                    enqueue(&ctx, stream, addr);
                }
                Err(err) => {
                    let interval = ctx.server_limits.accept_poll_interval;
                    if let Some(pause) = accept_backoff(&err, interval) {
                        warn!(%err, ?pause, "accept failed");
                        thread::sleep(pause);
                    }
                }
            }
        }

        info!(dropped = ctx.queue.len(), "shutting down");
        stop_workers(&ctx, workers);
        debug!(paths = ctx.registry.len(), "all workers stopped");

        Ok(())
    }
}

fn spawn_worker(id: usize, ctx: &Arc<ServerContext>) -> io::Result<JoinHandle<()>> {
    let mut conn = HttpConnection::new(ctx.clone());
    let ctx = ctx.clone();

    thread::Builder::new()
        .name(format!("rwhttpd-worker-{id}"))
        .spawn(move || {
            trace!(id, "worker started");

            while !ctx.is_shutting_down() {
                if let Task::Serve(mut stream, addr) = ctx.queue.pop() {
                    trace!(%addr, "serving");
                    conn.run(&mut stream);
                }
            }

            trace!(id, "worker stopped");
        })
}

/// How long to wait before accepting again after `err`.
///
/// Timeouts and interrupts just mean "nothing yet". Anything else, like
/// EMFILE, tends to persist until a connection closes.
fn accept_backoff(err: &io::Error, poll_interval: Duration) -> Option<Duration> {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => None,
        _ => Some(poll_interval),
    }
}

/// Hands `stream` to the workers, waiting for a free slot until shutdown.
fn enqueue(ctx: &ServerContext, stream: TcpStream, addr: SocketAddr) {
    let wait = ctx.server_limits.accept_poll_interval;
    let mut task = Task::Serve(stream, addr);

    while let Err(rejected) = ctx.queue.push_timeout(task, wait) {
        if ctx.is_shutting_down() {
            debug!(%addr, "shutting down, connection dropped");
            return;
        }
        task = rejected;
    }
}

/// Wakes the workers parked in `pop` and joins them all. The flag must
/// already be set.
///
/// A token only fails to fit when the queue is full, and then no worker is
/// parked: each one finds an item on its next `pop` and sees the flag.
fn stop_workers(ctx: &ServerContext, workers: Vec<JoinHandle<()>>) {
    for _ in 0..workers.len() {
        if ctx.queue.try_push(Task::Wake).is_err() {
            break;
        }
    }

    for handle in workers {
        if handle.join().is_err() {
            warn!("worker panicked");
        }
    }
}

//

/// Builder for configuring and creating [`Server`] instances.
#[derive(Debug, Default)]
pub struct ServerBuilder {
    listener: Option<TcpListener>,
    root: Option<PathBuf>,
    access_log: Option<AccessLog>,
    shutdown: Option<Arc<AtomicBool>>,

    server_limits: Option<ServerLimits>,
    request_limits: Option<ReqLimits>,
    lock_limits: Option<LockLimits>,
}

impl ServerBuilder {
    /// Sets the TCP listener that the server will use to accept connections.
    ///
    /// **This is a required component.**
    #[inline(always)]
    pub fn listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Directory the request paths are resolved in (default: the current
    /// directory).
    #[inline(always)]
    pub fn root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Where request lines are logged (default: standard error).
    #[inline(always)]
    pub fn access_log(mut self, log: AccessLog) -> Self {
        self.access_log = Some(log);
        self
    }

    /// Uses an existing flag, e.g. one registered with a signal handler, as
    /// the shutdown trigger.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rwhttpd::Server;
    /// use signal_hook::consts::SIGTERM;
    /// use std::sync::{atomic::AtomicBool, Arc};
    ///
    /// let flag = Arc::new(AtomicBool::new(false));
    /// signal_hook::flag::register(SIGTERM, flag.clone()).unwrap();
    ///
    /// let server = Server::builder()
    ///     .listener(rwhttpd::bind(8080).unwrap())
    ///     .shutdown_flag(flag)
    ///     .build();
    /// ```
    #[inline(always)]
    pub fn shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    /// Configures the worker pool and the accept loop.
    #[inline(always)]
    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.server_limits = Some(limits);
        self
    }

    /// Configures request parsing limits.
    #[inline(always)]
    pub fn request_limits(mut self, limits: ReqLimits) -> Self {
        self.request_limits = Some(limits);
        self
    }

    /// Configures the policy of the per-path locks.
    #[inline(always)]
    pub fn lock_limits(mut self, limits: LockLimits) -> Self {
        self.lock_limits = Some(limits);
        self
    }

    /// Finalizes the builder and constructs a [`Server`] instance.
    ///
    /// # Panics
    ///
    /// Error messages:
    /// - ``The `listener` method must be called to create``
    /// - ``BoundedQueue capacity must be non-zero``
    ///
    /// Panics when:
    /// - The `listener` method was not called.
    /// - [`ServerLimits::workers`] is `0`.
    #[inline]
    #[track_caller]
    pub fn build(self) -> Server {
        let listener = self
            .listener
            .expect("The `listener` method must be called to create");

        let mut ctx = ServerContext::new(
            self.root.unwrap_or_else(|| PathBuf::from(".")),
            self.server_limits.unwrap_or_default(),
            self.request_limits.unwrap_or_default(),
            self.lock_limits.unwrap_or_default(),
            self.access_log.unwrap_or_default(),
        );
        if let Some(flag) = self.shutdown {
            ctx.shutdown = flag;
        }

        Server {
            listener,
            ctx: Arc::new(ctx),
        }
    }
}

#[cfg(test)]
mod server_tests {
    use super::*;
    use crate::{
        server::{access_log::test_sink::SharedBuf, listener::bind_addr},
        StatusCode,
    };
    use std::{
        fs,
        io::{Read, Write},
        net::Shutdown,
    };

    struct Running {
        addr: SocketAddr,
        flag: Arc<AtomicBool>,
        log: SharedBuf,
        dir: tempfile::TempDir,
        handle: Option<JoinHandle<Result<(), Error>>>,
    }

    impl Running {
        fn start(workers: usize) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let log = SharedBuf::default();

            let server = Server::builder()
                .listener(bind_addr("127.0.0.1:0".parse().unwrap()).unwrap())
                .root(dir.path())
                .access_log(AccessLog::new(log.clone()))
                .server_limits(ServerLimits {
                    workers,
                    accept_poll_interval: Duration::from_millis(20),
                    ..ServerLimits::default()
                })
                .build();

            Self {
                addr: server.local_addr().unwrap(),
                flag: server.shutdown_flag(),
                log,
                dir,
                handle: Some(thread::spawn(move || server.launch())),
            }
        }

        fn connect(&self) -> TcpStream {
            TcpStream::connect(self.addr).unwrap()
        }

        fn request(&self, request: &[u8]) -> Vec<u8> {
            let mut stream = self.connect();
            stream.write_all(request).unwrap();

            let mut response = Vec::new();
            stream.read_to_end(&mut response).unwrap();
            response
        }

        fn stop(&mut self) {
            self.flag.store(true, Ordering::Release);
            if let Some(handle) = self.handle.take() {
                handle.join().unwrap().unwrap();
            }
        }
    }

    impl Drop for Running {
        fn drop(&mut self) {
            self.flag.store(true, Ordering::Release);
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }

    #[test]
    fn round_trip() {
        let server = Running::start(2);

        #[rustfmt::skip]
        let cases = [
            ("PUT /f.txt HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc", "HTTP/1.1 201 Created\r\nContent-Length: 8\r\n\r\nCreated\n"),
            ("GET /f.txt HTTP/1.1\r\n\r\n",                         "HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabc"),
            ("PUT /f.txt HTTP/1.1\r\nContent-Length: 2\r\n\r\nxy",  "HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nOK\n"),
            ("GET /f.txt HTTP/1.1\r\n\r\n",                         "HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nxy"),
            ("GET /none HTTP/1.1\r\n\r\n",                          "HTTP/1.1 404 Not Found\r\nContent-Length: 10\r\n\r\nNot Found\n"),
            ("FOO /f.txt HTTP/1.1\r\n\r\n",                         "HTTP/1.1 501 Not Implemented\r\nContent-Length: 16\r\n\r\nNot Implemented\n"),
            ("GET /f.txt\r\n\r\n",                                  "HTTP/1.1 400 Bad Request\r\nContent-Length: 12\r\n\r\nBad Request\n"),
            ("PUT /f.txt HTTP/1.1\r\n\r\n",                         "HTTP/1.1 400 Bad Request\r\nContent-Length: 12\r\n\r\nBad Request\n"),
            ("PUT /new.txt HTTP/1.1\r\n\r\n",                       "HTTP/1.1 400 Bad Request\r\nContent-Length: 12\r\n\r\nBad Request\n"),
        ];

        for (request, response) in cases {
            assert_eq!(server.request(request.as_bytes()), response.as_bytes(), "{request:?}");
        }

        // PUTs without a Content-Length leave the target alone.
        assert_eq!(fs::read(server.dir.path().join("f.txt")).unwrap(), b"xy");
        assert!(!server.dir.path().join("new.txt").exists());
        assert_eq!(server.log.lines().len(), cases.len());
    }

    #[test]
    fn body_sent_after_head() {
        let server = Running::start(1);
        let mut stream = server.connect();

        stream.write_all(b"PUT /slow HTTP/1.1\r\nContent-Length: 6\r\n\r\n").unwrap();
        thread::sleep(Duration::from_millis(50));
        stream.write_all(b"abc").unwrap();
        thread::sleep(Duration::from_millis(50));
        stream.write_all(b"def").unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();

        assert_eq!(response, "HTTP/1.1 201 Created\r\nContent-Length: 8\r\n\r\nCreated\n");
        assert_eq!(fs::read(server.dir.path().join("slow")).unwrap(), b"abcdef");
    }

    #[test]
    fn distinct_paths_do_not_block() {
        #[rustfmt::skip]
        let cases: [(&[u8], &[u8]); 2] = [
            (b"PUT /other HTTP/1.1\r\nContent-Length: 1\r\n\r\nz", b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nOK\n"),
            (b"GET /other HTTP/1.1\r\n\r\n",                         b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nzz"),
        ];

        for (request, response) in cases {
            let server = Running::start(2);
            fs::write(server.dir.path().join("other"), "zz").unwrap();

            // Holds the write lock on "stuck" until its body completes.
            let mut stuck = server.connect();
            stuck
                .write_all(b"PUT /stuck HTTP/1.1\r\nContent-Length: 4\r\n\r\nab")
                .unwrap();
            thread::sleep(Duration::from_millis(50));

            assert_eq!(server.request(request), response);

            stuck.write_all(b"cd").unwrap();
            stuck.shutdown(Shutdown::Write).unwrap();
            let mut stuck_response = Vec::new();
            stuck.read_to_end(&mut stuck_response).unwrap();
            assert_eq!(stuck_response, StatusCode::Created.canned_response());
        }
    }

    #[test]
    fn readers_of_one_path_overlap() {
        const LEN: usize = 32 << 20;
        const HEAD: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 33554432\r\n\r\n";

        let server = Running::start(2);
        fs::write(server.dir.path().join("big"), vec![b'r'; LEN]).unwrap();

        // Never reads, so its worker stalls mid-transfer holding the read lock.
        let mut stalled = server.connect();
        stalled.write_all(b"GET /big HTTP/1.1\r\n\r\n").unwrap();
        thread::sleep(Duration::from_millis(100));

        let response = server.request(b"GET /big HTTP/1.1\r\n\r\n");
        assert!(response.starts_with(HEAD));
        assert_eq!(response.len(), HEAD.len() + LEN);

        let mut stalled_response = Vec::new();
        stalled.read_to_end(&mut stalled_response).unwrap();
        assert_eq!(stalled_response.len(), HEAD.len() + LEN);
    }

    #[test]
    fn same_path_writers_serialize() {
        let server = Running::start(4);

        crossbeam::scope(|s| {
            for i in 0..8u8 {
                let server = &server;
                s.spawn(move |_| {
                    let body = [b'a' + i; 64];
                    let mut request = b"PUT /shared HTTP/1.1\r\nContent-Length: 64\r\n\r\n".to_vec();
                    request.extend_from_slice(&body);
                    server.request(&request);
                });
            }
        })
        .unwrap();

        // Whole-file writes never mix: the content is one writer's body.
        let content = fs::read(server.dir.path().join("shared")).unwrap();
        assert_eq!(content.len(), 64);
        assert!(content.iter().all(|&b| b == content[0]));
    }

    #[test]
    fn shutdown_with_idle_workers() {
        let mut server = Running::start(3);
        server.stop();

        assert!(TcpStream::connect_timeout(&server.addr, Duration::from_millis(200)).is_err());
    }

    #[test]
    fn shutdown_closes_queued_connections() {
        let mut server = Running::start(1);

        // Occupies the only worker until the rest of its body arrives.
        let mut in_flight = server.connect();
        in_flight
            .write_all(b"PUT /a HTTP/1.1\r\nContent-Length: 4\r\n\r\nab")
            .unwrap();
        thread::sleep(Duration::from_millis(50));

        // Complete, but waits in the queue behind the busy worker.
        let mut queued = server.connect();
        queued
            .write_all(b"PUT /b HTTP/1.1\r\nContent-Length: 1\r\n\r\nz")
            .unwrap();
        thread::sleep(Duration::from_millis(50));

        server.flag.store(true, Ordering::Release);
        thread::sleep(Duration::from_millis(100));

        in_flight.write_all(b"cd").unwrap();
        let mut response = Vec::new();
        in_flight.read_to_end(&mut response).unwrap();
        assert_eq!(response, StatusCode::Created.canned_response());

        server.stop();

        // Closed without an answer; a reset is fine as its request was never read.
        let mut unanswered = Vec::new();
        let _ = queued.read_to_end(&mut unanswered);
        assert!(unanswered.is_empty());

        assert_eq!(fs::read(server.dir.path().join("a")).unwrap(), b"abcd");
        assert!(!server.dir.path().join("b").exists());
        assert_eq!(server.log.lines(), ["PUT,/a,201,0"]);
    }

    #[test]
    fn accept_waits_for_queue_room_until_shutdown() {
        let mut server = Running::start(1);

        let mut in_flight = server.connect();
        in_flight
            .write_all(b"PUT /a HTTP/1.1\r\nContent-Length: 2\r\n\r\na")
            .unwrap();
        thread::sleep(Duration::from_millis(50));

        // One fills the queue, the next leaves the accept loop waiting for room.
        let _queued = server.connect();
        let _waiting = server.connect();
        thread::sleep(Duration::from_millis(50));

        server.flag.store(true, Ordering::Release);
        thread::sleep(Duration::from_millis(100));

        in_flight.write_all(b"b").unwrap();
        server.stop();

        assert_eq!(fs::read(server.dir.path().join("a")).unwrap(), b"ab");
    }

    #[test]
    fn accept_errors() {
        let interval = Duration::from_millis(20);

        #[rustfmt::skip]
        let cases = [
            (io::Error::from(io::ErrorKind::WouldBlock),        None),
            (io::Error::from(io::ErrorKind::TimedOut),          None),
            (io::Error::from(io::ErrorKind::Interrupted),       None),
            (io::Error::from_raw_os_error(24),                  Some(interval)), // EMFILE
            (io::Error::from(io::ErrorKind::ConnectionAborted), Some(interval)),
        ];

        for (err, pause) in cases {
            assert_eq!(accept_backoff(&err, interval), pause, "{err}");
        }
    }

    #[test]
    #[should_panic(expected = "The `listener` method must be called to create")]
    fn build_without_listener() {
        Server::builder().build();
    }
}
