//! Fixed-shape HTTP responses.
//!
//! The server only ever answers with a status line, a `Content-Length`
//! header and a body. Status responses carry a one-line body naming the
//! status; a file response carries the file, which is streamed after the head.

use crate::{server::io::write_exact, StatusCode};
use std::io::{self, Write};

const FILE_HEAD_PREFIX: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: ";
const HEAD_END: &[u8] = b"\r\n\r\n";

/// Response sent for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Response {
    /// Canned response for `StatusCode`, body included
    Status(StatusCode),
    /// `200 OK` head announcing `len` bytes of file content
    File { len: u64 },
}

impl Response {
    #[cfg(test)]
    pub(crate) const fn status(&self) -> StatusCode {
        match self {
            Response::Status(status) => *status,
            Response::File { .. } => StatusCode::Ok,
        }
    }

    /// Writes the complete response for `Status`, or only the head for `File`.
    pub(crate) fn write_head<W: Write>(&self, dst: &mut W) -> io::Result<()> {
        match self {
            Response::Status(status) => {
                write_exact(dst, status.canned_response())?;
            }
            Response::File { len } => {
                let (digits, start) = number_to_bytes(*len);

                let mut head = [0u8; FILE_HEAD_PREFIX.len() + 20 + HEAD_END.len()];
                let mut n = 0;
                for part in [FILE_HEAD_PREFIX, &digits[start..], HEAD_END] {
                    head[n..n + part.len()].copy_from_slice(part);
                    n += part.len();
                }

                write_exact(dst, &head[..n])?;
            }
        }

        dst.flush()
    }
}

#[inline]
const fn number_to_bytes(mut n: u64) -> ([u8; 20], usize) {
    let mut buffer = [b'0'; 20];
    let mut i = 20;

    if n == 0 {
        return (buffer, 19);
    }

    while n > 0 {
        i -= 1;
        buffer[i] = b'0' + (n % 10) as u8;
        n /= 10;
    }

    (buffer, i)
}
