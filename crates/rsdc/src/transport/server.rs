// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Thread-per-connection HTTP server with per-path dispatch.
//!
//! Accepts on a non-blocking listener polled by one background thread;
//! each connection gets its own handler thread and serves keep-alive
//! request/response exchanges until the peer closes or shutdown is
//! signalled.

use super::codec::{read_request, write_response, HttpRequest, HttpResponse};
use super::tls::{check_peer, TlsServerContext};
use parking_lot::RwLock;
use rustls::{ServerConnection, StreamOwned};
use std::collections::HashMap;
use std::io::{self, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A path handler. Handlers run on connection threads and must be
/// re-entrant; blocking work holds only that one connection.
pub type Handler = Arc<dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync>;

trait ReadWrite: Read + Write + Send {}
impl<T: Read + Write + Send> ReadWrite for T {}

/// HTTP(S) server bound to one socket.
pub struct HttpServer {
    local_addr: SocketAddr,
    routes: Arc<RwLock<HashMap<String, Handler>>>,
    shutdown: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
}

impl HttpServer {
    /// Bind and start accepting. Port 0 picks a free port; the effective
    /// address is [`HttpServer::local_addr`].
    pub fn bind(addr: SocketAddr, tls: Option<Arc<TlsServerContext>>) -> io::Result<Self> {
        let socket = socket2::Socket::new(
            socket2::Domain::for_address(addr),
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        )?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(128)?;
        let listener: TcpListener = socket.into();
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let routes: Arc<RwLock<HashMap<String, Handler>>> = Arc::new(RwLock::new(HashMap::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let accept_thread = {
            let routes = Arc::clone(&routes);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || accept_loop(listener, routes, shutdown, tls))
        };

        log::debug!("[http] server listening on {}", local_addr);
        Ok(Self { local_addr, routes, shutdown, accept_thread: Some(accept_thread) })
    }

    /// Effective bind address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Register a handler for an exact request path.
    pub fn register(&self, path: &str, handler: Handler) {
        self.routes.write().insert(path.to_string(), handler);
    }

    /// Remove a handler.
    pub fn unregister(&self, path: &str) {
        self.routes.write().remove(path);
    }

    /// Signal shutdown; the accept loop exits within its poll interval.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
    }
}

fn accept_loop(
    listener: TcpListener,
    routes: Arc<RwLock<HashMap<String, Handler>>>,
    shutdown: Arc<AtomicBool>,
    tls: Option<Arc<TlsServerContext>>,
) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let routes = Arc::clone(&routes);
                let shutdown = Arc::clone(&shutdown);
                let tls = tls.clone();
                thread::spawn(move || {
                    if let Err(e) = handle_connection(stream, peer, routes, shutdown, tls) {
                        log::debug!("[http] connection from {} ended: {}", peer, e);
                    }
                });
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                log::debug!("[http] accept failed: {}", e);
            }
        }
    }
}

fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    routes: Arc<RwLock<HashMap<String, Handler>>>,
    shutdown: Arc<AtomicBool>,
    tls: Option<Arc<TlsServerContext>>,
) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    // Bounded read so a idle keep-alive connection re-checks shutdown.
    stream.set_read_timeout(Some(Duration::from_millis(500)))?;

    let boxed: Box<dyn ReadWrite> = match &tls {
        None => Box::new(stream),
        Some(ctx) => {
            let mut conn = ServerConnection::new(Arc::clone(&ctx.config))
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            let mut sock = stream;
            while conn.is_handshaking() {
                conn.complete_io(&mut sock)?;
            }
            if let Err(e) = check_peer(ctx.predicate.as_ref(), conn.peer_certificates(), ctx.mutual)
            {
                log::debug!("[http] peer {} rejected: {}", peer, e);
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, e.to_string()));
            }
            Box::new(StreamOwned::new(conn, sock))
        }
    };

    let mut reader = BufReader::new(boxed);
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return Ok(());
        }
        let request = match read_request(&mut reader) {
            Ok(Some(r)) => r,
            Ok(None) => return Ok(()), // peer closed between requests
            Err(ref e)
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                continue; // idle poll tick
            }
            Err(e) => return Err(e),
        };

        let close_requested = request
            .header("Connection")
            .map(|v| v.eq_ignore_ascii_case("close"))
            .unwrap_or(false);

        let response = {
            let handler = routes.read().get(&request.path).cloned();
            match handler {
                Some(h) => h(&request),
                None => {
                    log::debug!("[http] {} {} -> 404", request.method, request.path);
                    HttpResponse::status(404, "Not Found")
                }
            }
        };

        write_response(reader.get_mut(), &response, !close_requested)?;
        if close_requested {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::codec::read_response;
    use std::io::BufReader as StdBufReader;

    fn post_raw(addr: SocketAddr, path: &str, body: &[u8]) -> HttpResponse {
        let mut stream = TcpStream::connect(addr).expect("connect to test server");
        crate::transport::codec::write_request(
            &mut stream,
            &addr.to_string(),
            path,
            "text/plain",
            body,
            false,
        )
        .expect("request written");
        let mut reader = StdBufReader::new(stream);
        read_response(&mut reader).expect("response read")
    }

    #[test]
    fn routes_by_exact_path() {
        let server =
            HttpServer::bind("127.0.0.1:0".parse().expect("literal addr"), None).expect("bind");
        server.register(
            "/svc",
            Arc::new(|req: &HttpRequest| {
                HttpResponse::ok("text/plain", format!("len={}", req.body.len()).into_bytes())
            }),
        );
        let addr = server.local_addr();

        let ok = post_raw(addr, "/svc", b"12345");
        assert_eq!(ok.status, 200);
        assert_eq!(ok.body, b"len=5");

        let missing = post_raw(addr, "/other", b"");
        assert_eq!(missing.status, 404);
    }

    #[test]
    fn keep_alive_serves_multiple_requests() {
        let server =
            HttpServer::bind("127.0.0.1:0".parse().expect("literal addr"), None).expect("bind");
        server.register(
            "/echo",
            Arc::new(|req: &HttpRequest| HttpResponse::ok("text/plain", req.body.clone())),
        );
        let addr = server.local_addr();

        let stream = TcpStream::connect(addr).expect("connect");
        let mut reader = StdBufReader::new(stream.try_clone().expect("clone"));
        let mut write_half = stream;
        for payload in [b"one".as_slice(), b"two".as_slice()] {
            crate::transport::codec::write_request(
                &mut write_half,
                &addr.to_string(),
                "/echo",
                "text/plain",
                payload,
                false,
            )
            .expect("request written");
            let resp = read_response(&mut reader).expect("response read");
            assert_eq!(resp.body, payload);
        }
    }
}
