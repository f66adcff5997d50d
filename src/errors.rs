use crate::StatusCode;
use std::{error, fmt, io};

/// Why a request could not be served.
///
/// Every variant maps onto one canned response, see [`ErrorKind::status`].
#[derive(Debug, PartialEq)]
pub(crate) enum ErrorKind {
    InvalidRequestLine,
    InvalidHeader,
    InvalidContentLength,
    MissingHeadersEnd,
    /// A method that looks like `GET` but is not exactly it
    MisspelledMethod,
    /// GET carrying a `Content-Length` or body bytes
    UnexpectedBody,
    /// PUT without a `Content-Length`
    MissingContentLength,

    UnsupportedVersion,
    UnsupportedMethod,

    Forbidden,
    NotFound,
    Io(IoError),
}

macro_rules! http_errors {
    ($($name:ident => $status:ident;)*) => {
        #[inline]
        pub(crate) const fn status(&self) -> StatusCode {
            match self { $(
                Self::$name { .. } => StatusCode::$status,
            )* }
        }
    };
}

impl ErrorKind {
    http_errors! {
        InvalidRequestLine => BadRequest;
        InvalidHeader => BadRequest;
        InvalidContentLength => BadRequest;
        MissingHeadersEnd => BadRequest;
        MisspelledMethod => BadRequest;
        UnexpectedBody => BadRequest;
        MissingContentLength => BadRequest;

        UnsupportedVersion => HttpVersionNotSupported;
        UnsupportedMethod => NotImplemented;

        Forbidden => Forbidden;
        NotFound => NotFound;
        Io => InternalServerError;
    }

    /// Full response, status line to body.
    #[cfg(test)]
    pub(crate) const fn as_http(&self) -> &'static [u8] {
        self.status().canned_response()
    }

    /// Failure to open an existing resource for reading.
    pub(crate) fn on_open(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::Forbidden,
            _ => Self::Io(IoError(err)),
        }
    }

    /// Failure to create or truncate a resource for writing.
    pub(crate) fn on_create(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::Forbidden,
            _ => Self::Io(IoError(err)),
        }
    }
}

impl error::Error for ErrorKind {}
impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        ErrorKind::Io(IoError(err))
    }
}

#[derive(Debug)]
pub(crate) struct IoError(pub(crate) io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

/// Failure that stops the server from starting or running.
#[derive(Debug)]
pub enum Error {
    /// The listening socket could not be set up
    Bind { port: u16, source: io::Error },
    /// A shutdown signal handler could not be installed
    Signal(io::Error),
    /// A worker thread could not be started
    Spawn(io::Error),
    /// Any other I/O failure of the accept loop
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bind { port, source } => write!(f, "cannot listen on port {port}: {source}"),
            Error::Signal(err) => write!(f, "cannot install signal handler: {err}"),
            Error::Spawn(err) => write!(f, "cannot start worker thread: {err}"),
            Error::Io(err) => write!(f, "{err}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Bind { source, .. } => Some(source),
            Error::Signal(err) | Error::Spawn(err) | Error::Io(err) => Some(err),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
