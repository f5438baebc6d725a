// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Keep-alive HTTP client pool.
//!
//! One bucket per (scheme, host, port) with a bounded number of concurrent
//! exchanges; idle connections are reused. Every request carries a deadline
//! that bounds connect, write, and read together. The pool does not retry
//! requests; the single transparent reconnect below only covers the
//! keep-alive race where a pooled connection died between exchanges.

use super::codec::{read_response, write_request, HttpResponse};
use super::endpoint::{Endpoint, Scheme};
use super::tls::{check_peer, TlsClientContext};
use super::TransportError;
use crate::config::{RuntimeConfig, TlsMode};
use parking_lot::{Condvar, Mutex};
use rustls::pki_types::ServerName;
use rustls::{ClientConnection, StreamOwned};
use std::collections::HashMap;
use std::io::{BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

trait ReadWrite: Read + Write + Send {}
impl<T: Read + Write + Send> ReadWrite for T {}

struct Conn {
    reader: BufReader<Box<dyn ReadWrite>>,
    /// Cloned socket handle for timeout control.
    tcp: TcpStream,
}

struct HostPool {
    idle: Mutex<Vec<Conn>>,
    permits: Mutex<usize>,
    available: Condvar,
}

impl HostPool {
    fn new(limit: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            permits: Mutex::new(limit),
            available: Condvar::new(),
        }
    }
}

/// Shared HTTP(S) client pool.
pub struct HttpClientPool {
    config: Arc<RuntimeConfig>,
    tls: Option<Arc<TlsClientContext>>,
    hosts: Mutex<HashMap<(Scheme, String, u16), Arc<HostPool>>>,
}

impl HttpClientPool {
    /// Build the pool; constructs the TLS client context when the
    /// configured mode needs one.
    pub fn new(config: Arc<RuntimeConfig>) -> Result<Self, TransportError> {
        let tls = match config.get().tls.mode {
            TlsMode::Off => None,
            TlsMode::Server | TlsMode::Mutual => {
                Some(Arc::new(super::tls::build_client_context(&config.get().tls)?))
            }
        };
        Ok(Self { config, tls, hosts: Mutex::new(HashMap::new()) })
    }

    fn host_pool(&self, endpoint: &Endpoint) -> Arc<HostPool> {
        let limit = self.config.get().http_pool_per_host.max(1);
        Arc::clone(
            self.hosts
                .lock()
                .entry(endpoint.pool_key())
                .or_insert_with(|| Arc::new(HostPool::new(limit))),
        )
    }

    fn connect(&self, endpoint: &Endpoint, deadline: Instant) -> Result<Conn, TransportError> {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .ok_or(TransportError::Timeout)?;
        let addr = endpoint
            .authority()
            .to_socket_addrs()
            .map_err(|e| TransportError::ConnectFailed {
                endpoint: endpoint.to_string(),
                source: e,
            })?
            .next()
            .ok_or_else(|| TransportError::InvalidEndpoint(endpoint.to_string()))?;
        let tcp = TcpStream::connect_timeout(&addr, remaining).map_err(|e| {
            TransportError::ConnectFailed { endpoint: endpoint.to_string(), source: e }
        })?;
        tcp.set_nodelay(true).map_err(TransportError::Io)?;
        let tcp_clone = tcp.try_clone().map_err(TransportError::Io)?;

        let stream: Box<dyn ReadWrite> = match endpoint.scheme {
            Scheme::Http => Box::new(tcp),
            Scheme::Https => {
                let tls = self
                    .tls
                    .as_ref()
                    .ok_or_else(|| TransportError::Tls("TLS is disabled".to_string()))?;
                let name = ServerName::try_from(endpoint.host.clone())
                    .map_err(|e| TransportError::Tls(e.to_string()))?;
                let mut conn = ClientConnection::new(Arc::clone(&tls.config), name)
                    .map_err(|e| TransportError::Tls(e.to_string()))?;
                let mut sock = tcp;
                sock.set_read_timeout(Some(remaining)).map_err(TransportError::Io)?;
                while conn.is_handshaking() {
                    conn.complete_io(&mut sock)
                        .map_err(|e| TransportError::Tls(e.to_string()))?;
                }
                check_peer(
                    tls.predicate.as_ref(),
                    conn.peer_certificates(),
                    self.config.get().tls.mode == TlsMode::Mutual,
                )?;
                Box::new(StreamOwned::new(conn, sock))
            }
        };
        log::debug!("[http] connected to {}", endpoint.authority());
        Ok(Conn { reader: BufReader::new(stream), tcp: tcp_clone })
    }

    fn exchange(
        conn: &mut Conn,
        endpoint: &Endpoint,
        content_type: &str,
        body: &[u8],
        deadline: Instant,
    ) -> Result<HttpResponse, TransportError> {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .ok_or(TransportError::Timeout)?;
        conn.tcp.set_write_timeout(Some(remaining)).map_err(TransportError::Io)?;
        conn.tcp.set_read_timeout(Some(remaining)).map_err(TransportError::Io)?;
        write_request(
            conn.reader.get_mut(),
            &endpoint.authority(),
            &endpoint.path,
            content_type,
            body,
            false,
        )?;
        Ok(read_response(&mut conn.reader)?)
    }

    /// POST `body` to `endpoint` and return the parsed response (whatever
    /// its status; fault bodies travel on 4xx/5xx).
    ///
    /// # Errors
    ///
    /// [`TransportError`] on connect/handshake/IO failure or when
    /// `deadline` expires. Never retried beyond the keep-alive reconnect.
    pub fn post(
        &self,
        endpoint: &Endpoint,
        content_type: &str,
        body: &[u8],
        deadline: Option<Duration>,
    ) -> Result<HttpResponse, TransportError> {
        let budget = deadline.unwrap_or(self.config.get().http_deadline);
        let deadline = Instant::now() + budget;
        let pool = self.host_pool(endpoint);

        // Bounded concurrency per host.
        {
            let mut permits = pool.permits.lock();
            while *permits == 0 {
                let remaining = deadline
                    .checked_duration_since(Instant::now())
                    .ok_or(TransportError::Timeout)?;
                if pool.available.wait_for(&mut permits, remaining).timed_out() {
                    return Err(TransportError::Timeout);
                }
            }
            *permits -= 1;
        }
        let _release = PermitGuard { pool: &pool };

        let (mut conn, reused) = match pool.idle.lock().pop() {
            Some(c) => (c, true),
            None => (self.connect(endpoint, deadline)?, false),
        };

        let result = Self::exchange(&mut conn, endpoint, content_type, body, deadline);
        let response = match result {
            Ok(r) => r,
            Err(TransportError::Timeout) => return Err(TransportError::Timeout),
            Err(e) if reused => {
                // The pooled connection died between exchanges; one fresh
                // connection, still under the same deadline.
                log::debug!("[http] pooled connection to {} stale: {}", endpoint.authority(), e);
                conn = self.connect(endpoint, deadline)?;
                Self::exchange(&mut conn, endpoint, content_type, body, deadline)?
            }
            Err(e) => return Err(e),
        };

        if response.keep_alive() {
            let mut idle = pool.idle.lock();
            if idle.len() < self.config.get().http_pool_per_host {
                idle.push(conn);
            }
        }
        Ok(response)
    }
}

struct PermitGuard<'a> {
    pool: &'a HostPool,
}

impl Drop for PermitGuard<'_> {
    fn drop(&mut self) {
        *self.pool.permits.lock() += 1;
        self.pool.available.notify_one();
    }
}
