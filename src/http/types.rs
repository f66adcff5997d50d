//! Core HTTP protocol types and utilities

use memchr::memmem;

#[inline(always)]
pub(crate) fn slice_to_usize(bytes: &[u8]) -> Option<usize> {
    if bytes.is_empty() {
        return None;
    }

    let mut result: usize = 0;

    for &byte in bytes {
        if !byte.is_ascii_digit() {
            return None;
        }

        result = result
            .checked_mul(10)?
            .checked_add((byte - b'0') as usize)?;
    }

    Some(result)
}

/// Reads the leading decimal integer of `bytes`, `0` if there is none.
///
/// Leading spaces and one sign are accepted, anything after the digits is
/// ignored and out-of-range values saturate.
#[inline]
pub(crate) fn leading_i64(bytes: &[u8]) -> i64 {
    let mut rest = bytes;
    while let [b' ' | b'\t', tail @ ..] = rest {
        rest = tail;
    }

    let negative = match rest {
        [b'-', tail @ ..] => {
            rest = tail;
            true
        }
        [b'+', tail @ ..] => {
            rest = tail;
            false
        }
        _ => false,
    };

    let mut result: i64 = 0;
    for &byte in rest.iter().take_while(|b| b.is_ascii_digit()) {
        let digit = (byte - b'0') as i64;
        result = if negative {
            result.saturating_mul(10).saturating_sub(digit)
        } else {
            result.saturating_mul(10).saturating_add(digit)
        };
    }

    result
}

/// `[A-Za-z0-9.-]`, the alphabet of resource names and header names.
#[inline(always)]
pub(crate) const fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'.' || byte == b'-'
}

/// Printable ASCII, `0x20..=0x7E`.
#[inline(always)]
pub(crate) const fn is_value_byte(byte: u8) -> bool {
    matches!(byte, b' '..=b'~')
}

// METHOD

/// HTTP request methods the server tells apart.
///
/// Only `GET` and `PUT` are served. Anything else that is still a
/// well-formed method token is answered with `501 Not Implemented`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// Transfer the current content of the resource
    Get,
    /// Replace the content of the resource with the request payload
    Put,
    /// Any other method
    Other,
}

impl Method {
    #[inline(always)]
    pub(crate) fn from_bytes(src: &[u8]) -> Self {
        match src {
            b"GET" => Method::Get,
            b"PUT" => Method::Put,
            _ => Method::Other,
        }
    }

    /// Method tokens like `GETS` or `XGET` are treated as a mangled `GET`
    /// rather than as an unknown method.
    #[inline]
    pub(crate) fn is_misspelled_get(src: &[u8]) -> bool {
        src != b"GET" && memmem::find(src, b"GET").is_some()
    }
}

// STATUS_CODE

macro_rules! set_status_codes {
    ($(
        $(#[$docs:meta])+
        $name:ident = ($num:literal, $str:literal, $len:literal);
    )+) => {
        /// HTTP status codes produced by the server
        ///
        /// Every response carries a one-line body naming the status, except a
        /// successful `GET` which carries the file.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum StatusCode { $(
            #[doc = concat!(stringify!($num), " ", $str)]
            $(#[$docs])+
            $name = $num,
        )+ }

        impl StatusCode {
            #[inline]
            pub const fn as_u16(&self) -> u16 {
                *self as u16
            }

            #[inline]
            pub const fn reason(&self) -> &'static str {
                match self { $(
                    StatusCode::$name => $str,
                )+ }
            }

            // The complete response, e.g. `b"HTTP/1.1 201 Created\r\n...Created\n"`.
            #[inline]
            pub(crate) const fn canned_response(&self) -> &'static [u8] {
                match self { $(
                    StatusCode::$name => concat!(
                        "HTTP/1.1 ", $num, " ", $str, "\r\n",
                        "Content-Length: ", $len, "\r\n",
                        "\r\n",
                        $str, "\n"
                    ).as_bytes(),
                )+ }
            }
        }
    }
}

set_status_codes! {
    /// [[RFC9110, Section 15.3.1](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.1)]
    Ok = (200, "OK", 3);
    /// [[RFC9110, Section 15.3.2](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.2)]
    Created = (201, "Created", 8);

    /// [[RFC9110, Section 15.5.1](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.1)]
    BadRequest = (400, "Bad Request", 12);
    /// [[RFC9110, Section 15.5.4](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.4)]
    Forbidden = (403, "Forbidden", 10);
    /// [[RFC9110, Section 15.5.5](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.5)]
    NotFound = (404, "Not Found", 10);

    /// [[RFC9110, Section 15.6.1](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.1)]
    InternalServerError = (500, "Internal Server Error", 22);
    /// [[RFC9110, Section 15.6.2](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.2)]
    NotImplemented = (501, "Not Implemented", 16);
    /// [[RFC9110, Section 15.6.6](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.6)]
    HttpVersionNotSupported = (505, "Version Not Supported", 22);
}
