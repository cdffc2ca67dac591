use crate::http::host_rewrite::is_space;

/// Method and path seen at the start of a chunk from the relay.
///
/// Informational only. Nothing is routed or validated on the basis of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub path: String,
}

/// Best-effort match of `METHOD path` at the very start of `chunk`.
///
/// The method is one or more of `[A-Za-z0-9_]`, followed by exactly one
/// space and a non-empty run of non-whitespace bytes.
///
/// ```
/// # use porthole::http::request_line::sniff_request_line;
/// let line = sniff_request_line(b"GET /foo HTTP/1.1\r\n").unwrap();
/// assert_eq!(line.method, "GET");
/// assert_eq!(line.path, "/foo");
/// assert!(sniff_request_line(b"\x16\x03\x01").is_none());
/// ```
pub fn sniff_request_line(chunk: &[u8]) -> Option<RequestLine> {
    let method_len = chunk
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
        .count();
    if method_len == 0 || chunk.get(method_len) != Some(&b' ') {
        return None;
    }

    let path_start = method_len + 1;
    let path_len = chunk[path_start..]
        .iter()
        .take_while(|b| !is_space(**b))
        .count();
    if path_len == 0 {
        return None;
    }

    Some(RequestLine {
        method: String::from_utf8_lossy(&chunk[..method_len]).into_owned(),
        path: String::from_utf8_lossy(&chunk[path_start..path_start + path_len]).into_owned(),
    })
}
