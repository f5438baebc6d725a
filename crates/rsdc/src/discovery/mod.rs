// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! WS-Discovery 1.1 engine: multicast probe/resolve, Hello/Bye, duplicate
//! suppression, and a restartable discovered-endpoint event stream.
//!
//! One reader thread drains the multicast group socket (3702), a second
//! drains the unicast socket that probes are sent from (matches come back
//! there). Outbound multicast carries the mandated AppSequence and is
//! retransmitted per the SOAP-over-UDP schedule.
//!
//! Per-announcement state machine: `Unannounced -> Hello-sent -> Live ->
//! Bye-sent -> Unannounced`. Hello is repeated on metadata-version bumps;
//! Bye is best-effort at shutdown.

mod dedup;
pub mod messages;

pub use messages::ProbeFilter;

use crate::config::{
    RuntimeConfig, UDP_MIN_DELAY_MS, UDP_REPEAT, UDP_UPPER_DELAY_MS, WSD_MAX_DATAGRAM,
    WSD_MULTICAST_ADDR_V4, WSD_PORT,
};
use crate::soap::{action, body_element, decode_envelope, AppSequence, Headers, Message};
use crossbeam::channel::{unbounded, Receiver, Sender};
use dedup::DedupWindow;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Discovery failures (closed set).
#[derive(Debug)]
pub enum DiscoveryError {
    /// No usable interface, or socket setup on it failed.
    InterfaceUnavailable(String),
    /// The discovery port is taken without address reuse.
    AddressConflict(String),
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::InterfaceUnavailable(d) => write!(f, "interface unavailable: {}", d),
            DiscoveryError::AddressConflict(d) => write!(f, "address conflict: {}", d),
        }
    }
}

impl std::error::Error for DiscoveryError {}

fn io_to_discovery(context: &str, e: io::Error) -> DiscoveryError {
    if e.kind() == io::ErrorKind::AddrInUse {
        DiscoveryError::AddressConflict(format!("{}: {}", context, e))
    } else {
        DiscoveryError::InterfaceUnavailable(format!("{}: {}", context, e))
    }
}

/// A remote (or locally published) discoverable endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredEndpoint {
    /// Stable endpoint reference (`urn:uuid:...`).
    pub epr: String,
    pub types: Vec<String>,
    pub scopes: Vec<String>,
    /// Transport addresses the metadata/services are reachable at.
    pub xaddrs: Vec<String>,
    pub metadata_version: u64,
}

/// Events on the discovery stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A Hello was seen (or a late announcement with a newer metadata
    /// version).
    Entered(DiscoveredEndpoint),
    /// A Bye was seen for this EPR.
    Left(String),
}

/// Filters which remote endpoints surface as events / probe results.
pub type RelevancePredicate = Arc<dyn Fn(&DiscoveredEndpoint) -> bool + Send + Sync>;

struct Inner {
    config: Arc<RuntimeConfig>,
    relevance: Option<RelevancePredicate>,
    /// Socket joined to the group; remote probes/hellos arrive here.
    mcast: UdpSocket,
    /// Ephemeral socket; our probes leave and their matches return here.
    unicast: UdpSocket,
    group: SocketAddrV4,
    instance_id: u64,
    message_number: AtomicU64,
    dedup: Mutex<DedupWindow>,
    listeners: Mutex<Vec<Sender<DiscoveryEvent>>>,
    local: Mutex<HashMap<String, DiscoveredEndpoint>>,
    pending_probes: Mutex<HashMap<String, Sender<DiscoveredEndpoint>>>,
    pending_resolves: Mutex<HashMap<String, Sender<DiscoveredEndpoint>>>,
    shutdown: AtomicBool,
}

/// The discovery engine. Construction binds the sockets and starts the
/// reader threads; drop sends Bye for everything still published.
pub struct WsDiscovery {
    inner: Arc<Inner>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl WsDiscovery {
    /// Bind the discovery sockets on the configured interface and start
    /// listening.
    pub fn start(
        config: Arc<RuntimeConfig>,
        relevance: Option<RelevancePredicate>,
    ) -> Result<Self, DiscoveryError> {
        let cfg = config.get();
        let iface = cfg.interface.unwrap_or_else(primary_interface);
        let ttl = cfg.multicast_ttl;

        let mcast = bind_multicast(iface, ttl)?;
        let unicast = bind_unicast(iface, ttl)?;
        mcast
            .set_read_timeout(Some(Duration::from_millis(250)))
            .map_err(|e| io_to_discovery("read timeout", e))?;
        unicast
            .set_read_timeout(Some(Duration::from_millis(250)))
            .map_err(|e| io_to_discovery("read timeout", e))?;

        let instance_id =
            SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(1);

        let inner = Arc::new(Inner {
            config: Arc::clone(&config),
            relevance,
            mcast,
            unicast,
            group: SocketAddrV4::new(WSD_MULTICAST_ADDR_V4, WSD_PORT),
            instance_id,
            message_number: AtomicU64::new(1),
            dedup: Mutex::new(DedupWindow::new(cfg.dup_suppression_window)),
            listeners: Mutex::new(Vec::new()),
            local: Mutex::new(HashMap::new()),
            pending_probes: Mutex::new(HashMap::new()),
            pending_resolves: Mutex::new(HashMap::new()),
            shutdown: AtomicBool::new(false),
        });

        let mut threads = Vec::new();
        for (name, socket) in [
            ("wsd-mcast", inner.mcast.try_clone()),
            ("wsd-unicast", inner.unicast.try_clone()),
        ] {
            let socket = socket.map_err(|e| io_to_discovery("socket clone", e))?;
            let inner_clone = Arc::clone(&inner);
            threads.push(
                thread::Builder::new()
                    .name(name.to_string())
                    .spawn(move || reader_loop(inner_clone, socket))
                    .map_err(|e| io_to_discovery("thread spawn", e))?,
            );
        }

        log::debug!("[wsd] engine started on interface {} (instance {})", iface, instance_id);
        Ok(Self { inner, threads: Mutex::new(threads) })
    }

    /// Register a new event stream. Streams are independent; a slow
    /// consumer only delays itself (unbounded channel, dropped on
    /// disconnect).
    #[must_use]
    pub fn events(&self) -> Receiver<DiscoveryEvent> {
        let (tx, rx) = unbounded();
        self.inner.listeners.lock().push(tx);
        rx
    }

    /// Probe the network and collect matches for `max_wait` (or the
    /// configured default). Matches are deduplicated by EPR and filtered
    /// through the relevance predicate.
    pub fn probe(
        &self,
        filter: &ProbeFilter,
        max_wait: Option<Duration>,
    ) -> Vec<DiscoveredEndpoint> {
        let wait = max_wait.unwrap_or(self.inner.config.get().discovery_max_wait);
        let headers = self.inner.multicast_headers(action::WSD_PROBE);
        let message_id = headers.message_id.clone();
        let (tx, rx) = unbounded();
        self.inner.pending_probes.lock().insert(message_id.clone(), tx);

        let xml = messages::encode_probe(&headers, filter);
        send_with_retransmits(&self.inner, xml);

        let deadline = Instant::now() + wait;
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            match rx.recv_timeout(remaining) {
                Ok(ep) => {
                    if seen.insert(ep.epr.clone()) {
                        out.push(ep);
                    }
                }
                Err(_) => break,
            }
        }
        self.inner.pending_probes.lock().remove(&message_id);
        out
    }

    /// Resolve transport addresses for one EPR.
    pub fn resolve(&self, epr: &str, max_wait: Option<Duration>) -> Option<DiscoveredEndpoint> {
        let wait = max_wait.unwrap_or(self.inner.config.get().discovery_max_wait);
        let headers = self.inner.multicast_headers(action::WSD_RESOLVE);
        let message_id = headers.message_id.clone();
        let (tx, rx) = unbounded();
        self.inner.pending_resolves.lock().insert(message_id.clone(), tx);

        let xml = messages::encode_resolve(&headers, epr);
        send_with_retransmits(&self.inner, xml);

        let result = rx.recv_timeout(wait).ok();
        self.inner.pending_resolves.lock().remove(&message_id);
        result
    }

    /// Publish a local service: `Unannounced -> Hello-sent -> Live`.
    pub fn publish(&self, service: DiscoveredEndpoint) {
        log::debug!(
            "[wsd] publishing {} (metadata version {})",
            service.epr,
            service.metadata_version
        );
        self.inner.local.lock().insert(service.epr.clone(), service.clone());
        announce_hello(&self.inner, &service);
    }

    /// Re-announce a published service with a bumped metadata version
    /// (interface change, metadata change).
    pub fn republish(&self, epr: &str) {
        let bumped = {
            let mut local = self.inner.local.lock();
            match local.get_mut(epr) {
                Some(s) => {
                    s.metadata_version += 1;
                    Some(s.clone())
                }
                None => None,
            }
        };
        match bumped {
            Some(service) => announce_hello(&self.inner, &service),
            None => log::debug!("[wsd] republish for unknown epr {}", epr),
        }
    }

    /// Withdraw a local service: best-effort Bye, then `Unannounced`.
    pub fn withdraw(&self, epr: &str) {
        if self.inner.local.lock().remove(epr).is_none() {
            return;
        }
        let mut headers = self.inner.multicast_headers(action::WSD_BYE);
        headers.reply_to = None;
        let xml = messages::encode_bye(&headers, epr);
        self.inner.send_multicast_once(&xml);
        log::debug!("[wsd] bye sent for {}", epr);
    }

    /// Stop the engine: Bye for everything still published, then join the
    /// reader threads.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let eprs: Vec<String> = self.inner.local.lock().keys().cloned().collect();
        for epr in eprs {
            let mut headers = self.inner.multicast_headers(action::WSD_BYE);
            headers.reply_to = None;
            let xml = messages::encode_bye(&headers, &epr);
            self.inner.send_multicast_once(&xml);
        }
        self.inner.local.lock().clear();
        for handle in self.threads.lock().drain(..) {
            let _ = handle.join();
        }
        log::debug!("[wsd] engine stopped");
    }
}

impl Drop for WsDiscovery {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn multicast_headers(&self, soap_action: &str) -> Headers {
        let mut headers = Headers::request(soap_action, crate::biceps::qname::WSD_TO);
        headers.app_sequence = Some(AppSequence {
            instance_id: self.instance_id,
            message_number: self.message_number.fetch_add(1, Ordering::Relaxed),
        });
        headers
    }

    fn send_multicast_once(&self, xml: &str) {
        if let Err(e) = self.unicast.send_to(xml.as_bytes(), self.group) {
            log::debug!("[wsd] multicast send failed: {}", e);
        }
    }

    fn emit(&self, event: DiscoveryEvent) {
        let mut listeners = self.listeners.lock();
        listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn relevant(&self, ep: &DiscoveredEndpoint) -> bool {
        self.relevance.as_ref().map(|p| p(ep)).unwrap_or(true)
    }
}

/// First transmission now, then the SOAP-over-UDP retransmit schedule on a
/// short-lived thread (jittered initial delay, doubling, capped).
fn send_with_retransmits(inner: &Arc<Inner>, xml: String) {
    inner.send_multicast_once(&xml);
    let inner = Arc::clone(inner);
    thread::spawn(move || {
        let mut delay = jittered_initial_delay();
        for _ in 0..UDP_REPEAT {
            thread::sleep(delay);
            if inner.shutdown.load(Ordering::Relaxed) {
                return;
            }
            inner.send_multicast_once(&xml);
            delay = (delay * 2).min(Duration::from_millis(UDP_UPPER_DELAY_MS));
        }
    });
}

/// Hello announcement with retransmits (`Hello-sent -> Live`).
fn announce_hello(inner: &Arc<Inner>, service: &DiscoveredEndpoint) {
    let headers = inner.multicast_headers(action::WSD_HELLO);
    let xml = messages::encode_hello(&headers, service);
    send_with_retransmits(inner, xml);
}

fn jittered_initial_delay() -> Duration {
    let span = UDP_UPPER_DELAY_MS.saturating_sub(UDP_MIN_DELAY_MS).max(1);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()))
        .unwrap_or(0);
    Duration::from_millis(UDP_MIN_DELAY_MS + nanos % span)
}

fn reader_loop(inner: Arc<Inner>, socket: UdpSocket) {
    let mut buf = vec![0u8; WSD_MAX_DATAGRAM];
    loop {
        if inner.shutdown.load(Ordering::Relaxed) {
            break;
        }
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(r) => r,
            Err(ref e)
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                continue;
            }
            Err(e) => {
                log::debug!("[wsd] recv failed: {}", e);
                continue;
            }
        };
        let Ok(text) = std::str::from_utf8(&buf[..len]) else {
            log::debug!("[wsd] dropped non-UTF-8 datagram from {}", src);
            continue;
        };
        let msg = match decode_envelope(text) {
            Ok(m) => m,
            Err(e) => {
                // Internal by policy: logged and swallowed.
                log::debug!("[wsd] dropped undecodable datagram from {}: {}", src, e);
                continue;
            }
        };
        if inner
            .dedup
            .lock()
            .is_duplicate(&msg.headers.message_id, msg.headers.app_sequence)
        {
            log::debug!("[wsd] suppressed duplicate {} from {}", msg.headers.message_id, src);
            continue;
        }
        handle_message(&inner, msg, src);
    }
}

fn handle_message(inner: &Arc<Inner>, msg: Message, src: SocketAddr) {
    let Ok(doc) = msg.document() else { return };
    let Some(body) = body_element(&doc) else { return };

    match msg.headers.action.as_str() {
        action::WSD_HELLO => {
            if let Ok(ep) = messages::endpoint_from_node(body) {
                if inner.relevant(&ep) {
                    log::debug!("[wsd] hello from {} ({})", ep.epr, src);
                    inner.emit(DiscoveryEvent::Entered(ep));
                }
            }
        }
        action::WSD_BYE => {
            if let Some(epr) = messages::bye_from_node(body) {
                log::debug!("[wsd] bye from {} ({})", epr, src);
                inner.emit(DiscoveryEvent::Left(epr));
            }
        }
        action::WSD_PROBE => {
            let filter = messages::probe_from_node(body);
            let matches: Vec<DiscoveredEndpoint> = inner
                .local
                .lock()
                .values()
                .filter(|s| messages::service_matches(s, &filter))
                .cloned()
                .collect();
            if matches.is_empty() {
                return;
            }
            let headers = Headers::response(&msg.headers, action::WSD_PROBE_MATCHES);
            let xml = messages::encode_probe_matches(&headers, &matches);
            respond_unicast(inner, xml, src);
        }
        action::WSD_RESOLVE => {
            let Some(epr) = messages::epr_from_node(body) else { return };
            let service = inner.local.lock().get(&epr).cloned();
            if let Some(service) = service {
                let headers = Headers::response(&msg.headers, action::WSD_RESOLVE_MATCHES);
                let xml = messages::encode_resolve_matches(&headers, &service);
                respond_unicast(inner, xml, src);
            }
        }
        action::WSD_PROBE_MATCHES => {
            let Some(relates) = msg.headers.relates_to.clone() else { return };
            let sink = inner.pending_probes.lock().get(&relates).cloned();
            if let Some(sink) = sink {
                for ep in messages::probe_matches_from_node(body) {
                    if inner.relevant(&ep) {
                        let _ = sink.send(ep);
                    }
                }
            }
        }
        action::WSD_RESOLVE_MATCHES => {
            let Some(relates) = msg.headers.relates_to.clone() else { return };
            let sink = inner.pending_resolves.lock().get(&relates).cloned();
            if let (Some(sink), Some(ep)) = (sink, messages::resolve_matches_from_node(body)) {
                if inner.relevant(&ep) {
                    let _ = sink.send(ep);
                }
            }
        }
        other => {
            log::debug!("[wsd] ignored action {} from {}", other, src);
        }
    }
}

/// Unicast response after a small jitter (avoids response storms when many
/// providers answer one probe).
fn respond_unicast(inner: &Arc<Inner>, xml: String, dst: SocketAddr) {
    let inner = Arc::clone(inner);
    thread::spawn(move || {
        thread::sleep(jittered_initial_delay() / 4);
        if inner.shutdown.load(Ordering::Relaxed) {
            return;
        }
        if let Err(e) = inner.unicast.send_to(xml.as_bytes(), dst) {
            log::debug!("[wsd] unicast response to {} failed: {}", dst, e);
        }
    });
}

fn bind_multicast(iface: Ipv4Addr, ttl: u32) -> Result<UdpSocket, DiscoveryError> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )
    .map_err(|e| io_to_discovery("socket", e))?;
    socket.set_reuse_address(true).map_err(|e| io_to_discovery("reuse", e))?;
    let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, WSD_PORT));
    socket
        .bind(&bind_addr.into())
        .map_err(|e| io_to_discovery("bind 3702", e))?;
    let socket: UdpSocket = socket.into();
    socket
        .join_multicast_v4(&WSD_MULTICAST_ADDR_V4, &iface)
        .map_err(|e| io_to_discovery("multicast join", e))?;
    socket
        .set_multicast_loop_v4(true)
        .map_err(|e| io_to_discovery("multicast loop", e))?;
    let _ = socket.set_multicast_ttl_v4(ttl);
    Ok(socket)
}

fn bind_unicast(iface: Ipv4Addr, ttl: u32) -> Result<UdpSocket, DiscoveryError> {
    let socket =
        UdpSocket::bind(SocketAddr::from((iface, 0))).map_err(|e| io_to_discovery("bind", e))?;
    let _ = socket.set_multicast_ttl_v4(ttl);
    let _ = socket.set_multicast_loop_v4(true);
    Ok(socket)
}

/// First non-loopback IPv4 interface address (Linux: `ip -4 addr show`),
/// falling back to the unspecified address.
#[must_use]
pub fn primary_interface() -> Ipv4Addr {
    for addr in interface_addresses() {
        if !addr.is_loopback() {
            return addr;
        }
    }
    Ipv4Addr::UNSPECIFIED
}

#[cfg(target_os = "linux")]
fn interface_addresses() -> Vec<Ipv4Addr> {
    use std::process::Command;
    let Ok(output) = Command::new("ip").args(["-4", "addr", "show"]).output() else {
        return Vec::new();
    };
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut out = Vec::new();
    for line in stdout.lines() {
        if let Some(inet) = line.trim().strip_prefix("inet ") {
            if let Some(addr) = inet.split('/').next() {
                if let Ok(parsed) = addr.trim().parse::<Ipv4Addr>() {
                    out.push(parsed);
                }
            }
        }
    }
    out
}

#[cfg(not(target_os = "linux"))]
fn interface_addresses() -> Vec<Ipv4Addr> {
    Vec::new()
}
