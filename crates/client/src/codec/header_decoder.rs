//! Rebuilds received header lines into a [`Headers`] layer.
//!
//! Lines arrive one at a time from the transfer engine and are stored verbatim
//! on the response (see [`strip_line_ending`]). Decoding happens on demand when
//! the caller asks for structured headers: status lines are skipped, lines
//! `httparse` cannot parse are skipped, and a later duplicate replaces an
//! earlier one.

use httparse::Status;
use tracing::trace;

use crate::protocol::Headers;

/// Trailer `httparse::parse_headers` needs to see a complete single-line block.
const LINE_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Removes every trailing CR and LF byte.
pub fn strip_line_ending(line: &[u8]) -> &[u8] {
    let end = line.iter().rposition(|&b| b != b'\r' && b != b'\n').map_or(0, |i| i + 1);
    &line[..end]
}

pub fn decode_header_lines<S: AsRef<str>>(lines: &[S]) -> Headers {
    let headers = Headers::new();
    let mut buf = Vec::with_capacity(128);

    for line in lines {
        let line = line.as_ref();
        if line.is_empty() || line.starts_with("HTTP/") {
            continue;
        }

        buf.clear();
        buf.extend_from_slice(line.as_bytes());
        buf.extend_from_slice(LINE_TERMINATOR);

        let mut parsed = [httparse::EMPTY_HEADER; 1];
        match httparse::parse_headers(&buf, &mut parsed) {
            Ok(Status::Complete((_, [header]))) => {
                headers.set(header.name, String::from_utf8_lossy(header.value).into_owned());
            }
            Ok(_) => trace!(line, "skipping header line without a header"),
            Err(e) => trace!(line, cause = %e, "skipping malformed header line"),
        }
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn strip_endings() {
        assert_eq!(strip_line_ending(b"Accept: */*\r\n"), b"Accept: */*");
        assert_eq!(strip_line_ending(b"Accept: */*\n\r\n"), b"Accept: */*");
        assert_eq!(strip_line_ending(b"no ending"), b"no ending");
        assert_eq!(strip_line_ending(b"\r\n"), b"");
        assert_eq!(strip_line_ending(b""), b"");
    }

    #[test]
    fn decode_response_lines() {
        let block = indoc! {r##"
        HTTP/1.1 200 OK
        Content-Type: text/html
        Content-Length: 12
        this line is not a header
        X-Trace: first
        x-trace: second
        "##};
        let lines: Vec<&str> = block.lines().collect();

        let headers = decode_header_lines(lines.as_slice());
        assert_eq!(headers.header_count(), 3);
        assert_eq!(headers.get("content-type").as_deref(), Some("text/html"));
        assert_eq!(headers.get("Content-Length").as_deref(), Some("12"));
        assert_eq!(headers.get("X-TRACE").as_deref(), Some("second"));
    }

    #[test]
    fn decode_nothing() {
        let headers = decode_header_lines::<String>(&[]);
        assert!(headers.is_empty());
    }
}
