// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! HTTP/1.1 message codec over buffered streams.
//!
//! Supports Content-Length and chunked bodies on both sides. Bodies are
//! capped; a peer announcing more is cut off with an error rather than
//! buffered.

use std::io::{self, BufRead, Write};

/// Upper bound for one message body (a full MDIB of a large device fits
/// comfortably; anything bigger is hostile or broken).
const MAX_BODY: usize = 16 * 1024 * 1024;

/// Upper bound for one header line.
const MAX_LINE: usize = 16 * 1024;

/// One HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// One HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// 200 response with a typed body.
    #[must_use]
    pub fn ok(content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            reason: "OK".to_string(),
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body,
        }
    }

    /// Bodyless response with an arbitrary status.
    #[must_use]
    pub fn status(status: u16, reason: &str) -> Self {
        Self { status, reason: reason.to_string(), headers: Vec::new(), body: Vec::new() }
    }

    /// Header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True when the connection may be reused after this response.
    #[must_use]
    pub fn keep_alive(&self) -> bool {
        !self
            .header("Connection")
            .map(|v| v.eq_ignore_ascii_case("close"))
            .unwrap_or(false)
    }
}

fn read_line<R: BufRead>(r: &mut R) -> io::Result<Option<String>> {
    let mut line = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        match r.read(&mut byte)? {
            0 => {
                if line.is_empty() {
                    return Ok(None);
                }
                break;
            }
            _ => {
                if byte[0] == b'\n' {
                    break;
                }
                if byte[0] != b'\r' {
                    line.push(byte[0]);
                }
                if line.len() > MAX_LINE {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "header line too long"));
                }
            }
        }
    }
    String::from_utf8(line)
        .map(Some)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "non-UTF-8 header line"))
}

fn read_headers<R: BufRead>(r: &mut R) -> io::Result<Vec<(String, String)>> {
    let mut headers = Vec::new();
    loop {
        let line = read_line(r)?
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "EOF in headers"))?;
        if line.is_empty() {
            return Ok(headers);
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "malformed header line"));
        };
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn read_body<R: BufRead>(r: &mut R, headers: &[(String, String)]) -> io::Result<Vec<u8>> {
    if header_value(headers, "Transfer-Encoding")
        .map(|v| v.eq_ignore_ascii_case("chunked"))
        .unwrap_or(false)
    {
        return read_chunked(r);
    }
    let len: usize = match header_value(headers, "Content-Length") {
        None => return Ok(Vec::new()),
        Some(v) => v
            .parse()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad Content-Length"))?,
    };
    if len > MAX_BODY {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "body exceeds limit"));
    }
    let mut body = vec![0u8; len];
    r.read_exact(&mut body)?;
    Ok(body)
}

fn read_chunked<R: BufRead>(r: &mut R) -> io::Result<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let line = read_line(r)?
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "EOF in chunk size"))?;
        let size_part = line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_part, 16)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad chunk size"))?;
        if size == 0 {
            // Trailer section up to the final blank line.
            while let Some(trailer) = read_line(r)? {
                if trailer.is_empty() {
                    break;
                }
            }
            return Ok(body);
        }
        if body.len() + size > MAX_BODY {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "body exceeds limit"));
        }
        let start = body.len();
        body.resize(start + size, 0);
        r.read_exact(&mut body[start..])?;
        let mut crlf = [0u8; 2];
        r.read_exact(&mut crlf)?;
    }
}

/// Read one request; `None` on a clean EOF before the request line
/// (keep-alive connection closed by the peer).
pub fn read_request<R: BufRead>(r: &mut R) -> io::Result<Option<HttpRequest>> {
    let Some(line) = read_line(r)? else {
        return Ok(None);
    };
    let mut parts = line.split_ascii_whitespace();
    let (method, path, version) = match (parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(p), Some(v)) => (m, p, v),
        _ => return Err(io::Error::new(io::ErrorKind::InvalidData, "malformed request line")),
    };
    if !version.starts_with("HTTP/1.") {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "unsupported HTTP version"));
    }
    let headers = read_headers(r)?;
    let body = read_body(r, &headers)?;
    Ok(Some(HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        headers,
        body,
    }))
}

/// Read one response.
pub fn read_response<R: BufRead>(r: &mut R) -> io::Result<HttpResponse> {
    let line = read_line(r)?
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "EOF before status line"))?;
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or("");
    if !version.starts_with("HTTP/1.") {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "unsupported HTTP version"));
    }
    let status: u16 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed status line"))?;
    let reason = parts.next().unwrap_or("").to_string();
    let headers = read_headers(r)?;
    let body = read_body(r, &headers)?;
    Ok(HttpResponse { status, reason, headers, body })
}

/// Write one POST request. `chunked` switches the body to chunked transfer
/// encoding (single chunk), which some SDC peers require for streaming.
pub fn write_request<W: Write>(
    w: &mut W,
    host: &str,
    path: &str,
    content_type: &str,
    body: &[u8],
    chunked: bool,
) -> io::Result<()> {
    write!(w, "POST {} HTTP/1.1\r\n", path)?;
    write!(w, "Host: {}\r\n", host)?;
    write!(w, "Content-Type: {}\r\n", content_type)?;
    write!(w, "User-Agent: rsdc/{}\r\n", crate::VERSION)?;
    if chunked {
        write!(w, "Transfer-Encoding: chunked\r\n\r\n")?;
        if !body.is_empty() {
            write!(w, "{:x}\r\n", body.len())?;
            w.write_all(body)?;
            write!(w, "\r\n")?;
        }
        write!(w, "0\r\n\r\n")?;
    } else {
        write!(w, "Content-Length: {}\r\n\r\n", body.len())?;
        w.write_all(body)?;
    }
    w.flush()
}

/// Write one response.
pub fn write_response<W: Write>(w: &mut W, resp: &HttpResponse, keep_alive: bool) -> io::Result<()> {
    write!(w, "HTTP/1.1 {} {}\r\n", resp.status, resp.reason)?;
    for (name, value) in &resp.headers {
        write!(w, "{}: {}\r\n", name, value)?;
    }
    write!(w, "Content-Length: {}\r\n", resp.body.len())?;
    if !keep_alive {
        write!(w, "Connection: close\r\n")?;
    }
    write!(w, "\r\n")?;
    w.write_all(&resp.body)?;
    w.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    #[test]
    fn request_roundtrip_content_length() {
        let mut wire = Vec::new();
        write_request(&mut wire, "dev:8080", "/svc", "application/soap+xml", b"<x/>", false)
            .expect("write succeeds");
        let mut r = BufReader::new(wire.as_slice());
        let req = read_request(&mut r).expect("reads").expect("present");
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/svc");
        assert_eq!(req.body, b"<x/>");
        assert_eq!(req.header("host"), Some("dev:8080"));
    }

    #[test]
    fn request_roundtrip_chunked() {
        let mut wire = Vec::new();
        write_request(&mut wire, "dev", "/svc", "application/soap+xml", b"<payload/>", true)
            .expect("write succeeds");
        let mut r = BufReader::new(wire.as_slice());
        let req = read_request(&mut r).expect("reads").expect("present");
        assert_eq!(req.body, b"<payload/>");
    }

    #[test]
    fn response_roundtrip() {
        let resp = HttpResponse::ok("application/soap+xml", b"<ok/>".to_vec());
        let mut wire = Vec::new();
        write_response(&mut wire, &resp, true).expect("write succeeds");
        let mut r = BufReader::new(wire.as_slice());
        let back = read_response(&mut r).expect("reads");
        assert_eq!(back.status, 200);
        assert_eq!(back.body, b"<ok/>");
        assert!(back.keep_alive());
    }

    #[test]
    fn clean_eof_yields_none() {
        let mut r = BufReader::new(&b""[..]);
        assert!(read_request(&mut r).expect("no error").is_none());
    }

    #[test]
    fn oversized_content_length_is_rejected() {
        let wire = format!("POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n", usize::MAX);
        let mut r = BufReader::new(wire.as_bytes());
        assert!(read_request(&mut r).is_err());
    }

    #[test]
    fn multi_chunk_body_reassembles() {
        let wire = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n4\r\ndefg\r\n0\r\n\r\n";
        let mut r = BufReader::new(&wire[..]);
        let resp = read_response(&mut r).expect("reads");
        assert_eq!(resp.body, b"abcdefg");
    }
}
