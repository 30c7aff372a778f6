//! Percent-encoding for source map URLs.

use std::fmt::Write;

use crate::Error;

/// Bytes kept as-is in a URL path. `#` and `?` are escaped since they would end the path.
fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b";,/:@&=+$-_.!~*'()".contains(&b)
}

/// Encode a file path for use in a map's `sources` or annotation.
pub(crate) fn encode(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for &b in path.as_bytes() {
        if is_unreserved(b) {
            out.push(char::from(b));
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    out
}

/// Decode `%XX` escapes; the result must be UTF-8.
pub(crate) fn decode(s: &str) -> Result<String, Error> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            if let Some(b) = hex {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).map_err(Error::other)
}
