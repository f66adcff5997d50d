//! Exact-length transfers between sockets and files.

use memchr::memmem;
use std::io::{self, ErrorKind, Read, Write};

const COPY_BUFFER_SIZE: usize = 8 * 1024;

/// Sequences that end a request head. Only `\r\n\r\n` is valid, the others
/// just stop the read early so the parser can reject the request.
const HEAD_TERMINATORS: [&[u8]; 3] = [b"\r\n\r\n", b"\n\n", b"\r\r"];

/// Writes all of `buf`, returning its length.
///
/// A sink that stops accepting bytes is reported as [`ErrorKind::WriteZero`].
pub fn write_exact<W: Write + ?Sized>(dst: &mut W, buf: &[u8]) -> io::Result<usize> {
    let mut written = 0;

    while written < buf.len() {
        match dst.write(&buf[written..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    format!("wrote {written} of {} bytes", buf.len()),
                ))
            }
            Ok(n) => written += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }

    Ok(written)
}

/// Moves exactly `n` bytes from `src` to `dst`.
///
/// A source that ends early is reported as [`ErrorKind::UnexpectedEof`].
pub fn copy_exact<R, W>(src: &mut R, dst: &mut W, n: u64) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buffer = [0u8; COPY_BUFFER_SIZE];
    let mut copied = 0;

    while copied < n {
        let want = (n - copied).min(COPY_BUFFER_SIZE as u64) as usize;

        let read = match src.read(&mut buffer[..want]) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("copied {copied} of {n} bytes"),
                ))
            }
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };

        write_exact(dst, &buffer[..read])?;
        copied += read as u64;
    }

    Ok(copied)
}

/// Reads into `buf` until a head terminator shows up, `buf` is full, or
/// the peer stops sending. Returns the number of bytes read.
///
/// Bytes after the terminator that arrived in the same read stay in `buf`.
pub(crate) fn read_head<R: Read + ?Sized>(src: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut len = 0;

    while len < buf.len() {
        let read = match src.read(&mut buf[len..]) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };

        // A terminator may straddle two reads.
        let from = len.saturating_sub(3);
        len += read;

        if has_terminator(&buf[from..len]) {
            break;
        }
    }

    Ok(len)
}

#[inline]
fn has_terminator(window: &[u8]) -> bool {
    HEAD_TERMINATORS
        .iter()
        .any(|term| memmem::find(window, term).is_some())
}
