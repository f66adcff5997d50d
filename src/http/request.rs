use crate::{
    errors::ErrorKind,
    http::types::{self, is_name_byte, is_value_byte},
    limits::ReqLimits,
    Method,
};
use memchr::memmem;

/// Parsed HTTP request head.
///
/// All data is borrowed from the head buffer the request was read into.
///
/// # Input data requirements
///
/// The head must match the templates below exactly. Anything else is answered
/// with `400 Bad Request`.
///
/// #### General designations
/// - `SP`: ASCII space (0x20)
/// - `CRLF`: Carriage return + line feed (`"\r\n"`), **exactly this sequence required**
///
/// ## First line
/// ```text
/// [METHOD] SP "/" [PATH] SP "HTTP/" DIGIT "." DIGIT CRLF
/// ```
/// Where:
/// - `[METHOD]`: 1 to [`method_size`](ReqLimits::method_size) ASCII letters
/// - `[PATH]`: 1 to [`path_size`](ReqLimits::path_size) characters of `[A-Za-z0-9.-]`
///
/// Any `HTTP/d.d` version is syntactically accepted; only `HTTP/1.1` is served.
///
/// ## Header
/// ```text
/// [NAME] ":" SP [VALUE] CRLF
/// ```
/// Where:
/// - `[NAME]`: 1 to [`header_name_size`](ReqLimits::header_name_size) characters of
///   `[A-Za-z0-9.-]`, case-insensitive
/// - `[VALUE]`: 1 to [`header_value_size`](ReqLimits::header_value_size) printable
///   ASCII characters
///
/// Two headers are interpreted:
///
/// | Header           | Values                                                       |
/// |------------------|--------------------------------------------------------------|
/// | `Content-Length` | Decimal digits only                                          |
/// | `Request-Id`     | Leading decimal integer, the rest is ignored (default: `0`)  |
///
/// ## End of headings
/// ```text
/// CRLF
/// ```
///
/// ## Body
/// Bytes following the blank line in the same read are kept as the start of
/// the body. The remainder, up to `Content-Length`, is read from the socket by
/// the handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Request<'b> {
    method: Method,
    method_str: &'b str,
    path: &'b str,
    version: &'b str,

    content_length: Option<usize>,
    request_id: i64,

    body: &'b [u8],
}

/// A request that failed to parse, with what could be identified before the
/// failure so it can still be logged.
#[derive(Debug, PartialEq)]
pub(crate) struct ParseError<'b> {
    pub(crate) kind: ErrorKind,
    pub(crate) method: &'b str,
    pub(crate) path: &'b str,
    pub(crate) request_id: i64,
}

// Public API
impl<'b> Request<'b> {
    #[inline(always)]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// The method token as sent, e.g. `"GET"` or `"FOO"`.
    #[inline(always)]
    pub const fn method_str(&self) -> &'b str {
        self.method_str
    }

    /// The resource name, without the leading `/`.
    #[inline(always)]
    pub const fn path(&self) -> &'b str {
        self.path
    }

    #[inline(always)]
    pub const fn version(&self) -> &'b str {
        self.version
    }

    #[inline(always)]
    pub fn is_http11(&self) -> bool {
        self.version == "HTTP/1.1"
    }

    #[inline(always)]
    pub const fn content_length(&self) -> Option<usize> {
        self.content_length
    }

    #[inline(always)]
    pub const fn request_id(&self) -> i64 {
        self.request_id
    }

    /// Bytes that followed the head in the same read.
    #[inline(always)]
    pub const fn body(&self) -> &'b [u8] {
        self.body
    }

    /// The part of [`body`](Self::body) that belongs to the declared
    /// `Content-Length`.
    #[inline]
    pub fn buffered_body(&self) -> &'b [u8] {
        match self.content_length {
            Some(len) => &self.body[..self.body.len().min(len)],
            None => self.body,
        }
    }

    /// Body bytes still expected from the socket.
    #[inline]
    pub fn remaining_body(&self) -> u64 {
        let declared = self.content_length.unwrap_or(0);
        declared.saturating_sub(self.body.len()) as u64
    }
}

impl<'b> Request<'b> {
    /// Parses the head at the start of `buf`.
    pub(crate) fn parse(buf: &'b [u8], limits: &ReqLimits) -> Result<Self, ParseError<'b>> {
        let mut request = Request {
            method: Method::Other,
            method_str: "",
            path: "",
            version: "",
            content_length: None,
            request_id: 0,
            body: &[],
        };

        let mut cursor = Cursor::new(valid_head(buf));

        if let Err(kind) = request.parse_first_line(&mut cursor, limits) {
            return Err(request.fail(kind));
        }
        if let Err(kind) = request.parse_headers(&mut cursor, limits) {
            return Err(request.fail(kind));
        }

        request.body = &buf[cursor.pos..];
        Ok(request)
    }

    #[inline]
    fn fail(&self, kind: ErrorKind) -> ParseError<'b> {
        ParseError {
            kind,
            method: self.method_str,
            path: self.path,
            request_id: self.request_id,
        }
    }
}

// Parse first line
impl<'b> Request<'b> {
    fn parse_first_line(
        &mut self,
        cursor: &mut Cursor<'b>,
        limits: &ReqLimits,
    ) -> Result<(), ErrorKind> {
        let method = cursor
            .take_while(limits.method_size, |b| b.is_ascii_alphabetic())
            .ok_or(ErrorKind::InvalidRequestLine)?;
        self.method_str = method;
        self.method = Method::from_bytes(method.as_bytes());

        cursor.expect(b" /").ok_or(ErrorKind::InvalidRequestLine)?;

        self.path = cursor
            .take_while(limits.path_size, is_name_byte)
            .ok_or(ErrorKind::InvalidRequestLine)?;

        cursor.expect(b" ").ok_or(ErrorKind::InvalidRequestLine)?;

        self.version = match cursor.rest().as_bytes() {
            [b'H', b'T', b'T', b'P', b'/', major, b'.', minor, b'\r', b'\n', ..]
                if major.is_ascii_digit() && minor.is_ascii_digit() =>
            {
                cursor.take(8).ok_or(ErrorKind::InvalidRequestLine)?
            }
            _ => return Err(ErrorKind::InvalidRequestLine),
        };

        cursor.expect(b"\r\n").ok_or(ErrorKind::InvalidRequestLine)?;
        Ok(())
    }
}

// Parse headers
impl<'b> Request<'b> {
    fn parse_headers(&mut self, cursor: &mut Cursor<'b>, limits: &ReqLimits) -> Result<(), ErrorKind> {
        loop {
            if cursor.expect(b"\r\n").is_some() {
                return Ok(());
            }
            if cursor.rest().is_empty() {
                return Err(ErrorKind::MissingHeadersEnd);
            }

            let name = cursor
                .take_while(limits.header_name_size, is_name_byte)
                .ok_or(ErrorKind::InvalidHeader)?;

            cursor.expect(b": ").ok_or(ErrorKind::InvalidHeader)?;

            let value = cursor
                .take_while(limits.header_value_size, is_value_byte)
                .ok_or(ErrorKind::InvalidHeader)?;

            cursor.expect(b"\r\n").ok_or(ErrorKind::InvalidHeader)?;

            self.parse_header(name, value)?;
        }
    }

    #[inline]
    fn parse_header(&mut self, name: &str, value: &str) -> Result<(), ErrorKind> {
        if name.eq_ignore_ascii_case("content-length") {
            let len = types::slice_to_usize(value.as_bytes())
                .ok_or(ErrorKind::InvalidContentLength)?;
            self.content_length = Some(len);
        } else if name.eq_ignore_ascii_case("request-id") {
            self.request_id = types::leading_i64(value.as_bytes());
        }

        Ok(())
    }
}

/// The longest UTF-8 prefix of the head region, ending after the blank line
/// when there is one.
#[inline]
fn valid_head(buf: &[u8]) -> &str {
    let end = memmem::find(buf, b"\r\n\r\n").map_or(buf.len(), |i| i + 4);
    let region = &buf[..end];

    match simdutf8::compat::from_utf8(region) {
        Ok(head) => head,
        Err(err) => simdutf8::basic::from_utf8(&region[..err.valid_up_to()]).unwrap_or(""),
    }
}

//

#[derive(Debug)]
struct Cursor<'b> {
    head: &'b str,
    pos: usize,
}

impl<'b> Cursor<'b> {
    #[inline(always)]
    fn new(head: &'b str) -> Self {
        Cursor { head, pos: 0 }
    }

    #[inline(always)]
    fn rest(&self) -> &'b str {
        self.head.get(self.pos..).unwrap_or("")
    }

    /// Takes 1 to `max` bytes matching `pred`.
    #[inline]
    fn take_while<P: Fn(u8) -> bool>(&mut self, max: usize, pred: P) -> Option<&'b str> {
        let len = self
            .rest()
            .bytes()
            .position(|b| !pred(b))
            .unwrap_or(self.rest().len());

        if len == 0 || len > max {
            return None;
        }
        self.take(len)
    }

    #[inline]
    fn take(&mut self, len: usize) -> Option<&'b str> {
        let slice = self.head.get(self.pos..self.pos + len)?;
        self.pos += len;
        Some(slice)
    }

    #[inline]
    fn expect(&mut self, token: &[u8]) -> Option<()> {
        if !self.rest().as_bytes().starts_with(token) {
            return None;
        }
        self.pos += token.len();
        Some(())
    }
}
