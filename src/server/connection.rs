use crate::{
    errors::ErrorKind,
    http::{request::Request, response::Response},
    server::{
        io::{copy_exact, read_head, write_exact},
        server_impl::ServerContext,
    },
    Method, StatusCode,
};
use std::{
    fs::{self, File, OpenOptions},
    io::{self, Read, Write},
    sync::Arc,
};
use tracing::{debug, warn};

/// Serves connections one at a time on behalf of a worker.
///
/// Each connection carries exactly one request. The head buffer is
/// allocated once and reused for every connection the worker takes.
pub(crate) struct HttpConnection {
    ctx: Arc<ServerContext>,
    head: Box<[u8]>,
}

impl HttpConnection {
    #[inline]
    pub(crate) fn new(ctx: Arc<ServerContext>) -> Self {
        let head = vec![0; ctx.req_limits.head_size].into_boxed_slice();
        Self { ctx, head }
    }

    /// Reads, handles and answers one request, then logs its outcome.
    pub(crate) fn run<S: Read + Write>(&mut self, stream: &mut S) {
        let ctx = &*self.ctx;

        let len = match read_head(stream, &mut self.head) {
            Ok(len) => len,
            Err(err) => {
                debug!(%err, "reading request head failed");
                let status = reply(stream, Err(ErrorKind::MissingHeadersEnd));
                ctx.access_log.record("", "", status.as_u16(), 0);
                return;
            }
        };

        match Request::parse(&self.head[..len], &ctx.req_limits) {
            Ok(request) => serve(ctx, &request, stream),
            Err(err) => {
                let status = reply(stream, Err(err.kind));
                ctx.access_log
                    .record(err.method, err.path, status.as_u16(), err.request_id);
            }
        }
    }
}

/// Takes the path lock in the mode the method needs and performs the
/// request under it. The outcome is answered and logged before the lock is
/// released.
fn serve<S: Read + Write>(ctx: &ServerContext, req: &Request, stream: &mut S) {
    let lock = ctx.registry.resolve_or_create(req.path());

    let status = match req.method() {
        _ if !req.is_http11() => reply(stream, Err(ErrorKind::UnsupportedVersion)),
        Method::Get => {
            let _guard = lock.read();
            let status = get(ctx, req, stream);
            log(ctx, req, status);
            return;
        }
        Method::Put => {
            let _guard = lock.write();
            let result = put(ctx, req, stream);
            let status = reply(stream, result);
            log(ctx, req, status);
            return;
        }
        Method::Other if Method::is_misspelled_get(req.method_str().as_bytes()) => {
            reply(stream, Err(ErrorKind::MisspelledMethod))
        }
        Method::Other => reply(stream, Err(ErrorKind::UnsupportedMethod)),
    };

    log(ctx, req, status);
}

fn get<S: Write>(ctx: &ServerContext, req: &Request, stream: &mut S) -> StatusCode {
    let (mut file, len) = match open_for_read(ctx, req) {
        Ok(found) => found,
        Err(kind) => return reply(stream, Err(kind)),
    };

    let sent = Response::File { len }
        .write_head(stream)
        .and_then(|()| copy_exact(&mut file, stream, len))
        .and_then(|_| stream.flush());

    // The head is already out, nothing can be sent in place of the body.
    match sent {
        Ok(()) => StatusCode::Ok,
        Err(err) => {
            warn!(%err, path = req.path(), len, "file transfer failed");
            StatusCode::InternalServerError
        }
    }
}

fn open_for_read(ctx: &ServerContext, req: &Request) -> Result<(File, u64), ErrorKind> {
    if req.content_length().is_some() || !req.body().is_empty() {
        return Err(ErrorKind::UnexpectedBody);
    }

    let file = File::open(ctx.root.join(req.path())).map_err(ErrorKind::on_open)?;
    let meta = file.metadata()?;

    if meta.is_dir() {
        return Err(ErrorKind::Forbidden);
    }

    Ok((file, meta.len()))
}

fn put<S: Read>(ctx: &ServerContext, req: &Request, stream: &mut S) -> Result<StatusCode, ErrorKind> {
    let Some(declared) = req.content_length() else {
        return Err(ErrorKind::MissingContentLength);
    };

    let path = ctx.root.join(req.path());

    let (mut file, status) = match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(file) => (file, StatusCode::Created),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            if fs::metadata(&path).is_ok_and(|meta| meta.is_dir()) {
                return Err(ErrorKind::Forbidden);
            }

            let file = OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(&path)
                .map_err(ErrorKind::on_create)?;

            (file, StatusCode::Ok)
        }
        Err(err) => return Err(ErrorKind::on_create(err)),
    };

    write_exact(&mut file, req.buffered_body())?;
    copy_exact(stream, &mut file, req.remaining_body())?;

    debug!(path = req.path(), declared, status = status.as_u16(), "stored");
    Ok(status)
}

/// Sends the canned response for `result` and returns its status.
fn reply<S: Write>(stream: &mut S, result: Result<StatusCode, ErrorKind>) -> StatusCode {
    let status = match result {
        Ok(status) => status,
        Err(ErrorKind::Io(err)) => {
            warn!(err = %err.0, "request failed");
            StatusCode::InternalServerError
        }
        Err(kind) => {
            debug!(?kind, "request rejected");
            kind.status()
        }
    };

    if let Err(err) = Response::Status(status).write_head(stream) {
        debug!(%err, status = status.as_u16(), "response not delivered");
    }

    status
}

#[inline]
fn log(ctx: &ServerContext, req: &Request, status: StatusCode) {
    ctx.access_log
        .record(req.method_str(), req.path(), status.as_u16(), req.request_id());
}
