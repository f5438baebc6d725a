// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! SDC consumer: discover, fetch, subscribe, mirror.
//!
//! The mirror is an [`MdibStore`] fed exclusively by incoming reports,
//! applied under the same transaction discipline as the provider side:
//! each report must carry mirror version + 1 and the unchanged sequence
//! id, otherwise the mirror is marked stale and rebuilt with a fresh
//! GetMdib. The façade offers a blocking view (`mdib()`) and a reactive
//! stream (`events()`).

use crate::biceps::qname::{child, Ns};
use crate::biceps::xml::{state_from_node, DecodeError};
use crate::biceps::State;
use crate::config::RuntimeConfig;
use crate::discovery::{DiscoveredEndpoint, DiscoveryError, ProbeFilter, WsDiscovery};
use crate::mdib::{ApplyError, MdibError, MdibSnapshot, MdibStore, RemoteDelta};
use crate::reporting::encode::{decode_report, DecodedReport};
use crate::reporting::{OperationInvokedInfo, ReportAction};
use crate::soap::{
    action, body_element, decode_envelope, encode_envelope, format_duration_iso,
    parse_duration_iso, Headers, Message, SoapError, SoapFault,
};
use crate::transport::{
    Endpoint, HttpClientPool, HttpRequest, HttpResponse, HttpServer, TransportError,
};
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use roxmltree::Node;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const SOAP_CONTENT_TYPE: &str = "application/soap+xml";

/// Consumer-side failures.
#[derive(Debug)]
pub enum ConsumerError {
    Transport(TransportError),
    /// The provider answered with a SOAP fault.
    Fault(SoapFault),
    Decode(DecodeError),
    Mdib(MdibError),
    Discovery(DiscoveryError),
    Io(io::Error),
    /// Protocol-shape problem (missing elements, no xaddr, ...).
    Protocol(String),
}

impl fmt::Display for ConsumerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumerError::Transport(e) => write!(f, "transport: {}", e),
            ConsumerError::Fault(e) => write!(f, "fault: {}", e),
            ConsumerError::Decode(e) => write!(f, "decode: {}", e),
            ConsumerError::Mdib(e) => write!(f, "mdib: {}", e),
            ConsumerError::Discovery(e) => write!(f, "discovery: {}", e),
            ConsumerError::Io(e) => write!(f, "io: {}", e),
            ConsumerError::Protocol(d) => write!(f, "protocol: {}", d),
        }
    }
}

impl std::error::Error for ConsumerError {}

impl From<TransportError> for ConsumerError {
    fn from(e: TransportError) -> Self {
        ConsumerError::Transport(e)
    }
}

impl From<DecodeError> for ConsumerError {
    fn from(e: DecodeError) -> Self {
        ConsumerError::Decode(e)
    }
}

impl From<MdibError> for ConsumerError {
    fn from(e: MdibError) -> Self {
        ConsumerError::Mdib(e)
    }
}

impl From<DiscoveryError> for ConsumerError {
    fn from(e: DiscoveryError) -> Self {
        ConsumerError::Discovery(e)
    }
}

impl From<io::Error> for ConsumerError {
    fn from(e: io::Error) -> Self {
        ConsumerError::Io(e)
    }
}

impl From<SoapError> for ConsumerError {
    fn from(e: SoapError) -> Self {
        match e {
            SoapError::Fault(f) => ConsumerError::Fault(f),
            SoapError::Decode(d) => ConsumerError::Decode(d),
        }
    }
}

/// Events on the mirror stream.
#[derive(Debug, Clone)]
pub enum MirrorEvent {
    /// A report was applied; the mirror now shows this MDIB version.
    Updated { version: u64, action: ReportAction },
    /// The mirror was rebuilt after a gap or sequence change.
    Resynced { reason: String },
    /// The provider ended the subscription.
    SubscriptionEnded(String),
    /// Operation progress from the provider.
    OperationInvoked(OperationInvokedInfo),
}

struct SubscriptionInfo {
    id: String,
    granted: Duration,
}

struct Inner {
    http: Arc<HttpClientPool>,
    service: Endpoint,
    provider_epr: String,
    mirror: Arc<MdibStore>,
    callback_url: String,
    subscription: Mutex<Option<SubscriptionInfo>>,
    listeners: Mutex<Vec<Sender<MirrorEvent>>>,
    shutdown: Arc<AtomicBool>,
}

/// A connected SDC consumer.
pub struct SdcConsumer {
    inner: Arc<Inner>,
    callback_server: HttpServer,
    renew_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn emit(&self, event: MirrorEvent) {
        let mut listeners = self.listeners.lock();
        listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn soap_post(&self, envelope: &str) -> Result<Message, ConsumerError> {
        let response =
            self.http.post(&self.service, SOAP_CONTENT_TYPE, envelope.as_bytes(), None)?;
        let text = String::from_utf8(response.body)
            .map_err(|_| ConsumerError::Protocol("non-UTF-8 response body".to_string()))?;
        let msg = decode_envelope(&text)?;
        if let Ok(doc) = msg.document() {
            if let Some(fault) = SoapFault::from_body(&doc) {
                return Err(ConsumerError::Fault(fault));
            }
        }
        Ok(msg)
    }

    /// Fetch the full MDIB and rebuild the mirror from it.
    fn fetch_mdib(&self) -> Result<(), ConsumerError> {
        let headers = Headers::request(action::GET_MDIB, &self.service.to_string());
        let envelope = encode_envelope(&headers, |w| {
            w.start(Ns::Msg, "GetMdib");
            w.end();
        });
        let msg = self.soap_post(&envelope)?;
        let doc = msg.document()?;
        let body = body_element(&doc)
            .ok_or_else(|| ConsumerError::Protocol("GetMdibResponse body missing".to_string()))?;
        // The response body element carries its own namespace declarations,
        // so the slice is a standalone document.
        let slice = &msg.raw[body.range()];
        self.mirror.reload_from_document(slice)?;
        Ok(())
    }

    fn resync(&self, reason: &str) {
        log::debug!("[consumer] mirror stale ({}), rebuilding", reason);
        match self.fetch_mdib() {
            Ok(()) => self.emit(MirrorEvent::Resynced { reason: reason.to_string() }),
            Err(e) => log::warn!("[consumer] mirror rebuild failed: {}", e),
        }
    }

    fn apply_states(&self, action: ReportAction, version: crate::mdib::MdibVersionGroup, states: Vec<State>) {
        match self.mirror.apply_remote(&version, RemoteDelta::States(states)) {
            Ok(()) => {
                self.emit(MirrorEvent::Updated { version: version.mdib_version, action });
            }
            Err(ApplyError::Gap(gap)) => self.resync(&gap.to_string()),
            Err(ApplyError::SequenceChanged { ours, theirs }) => {
                self.resync(&format!("sequence id changed ({} -> {})", ours, theirs));
            }
            Err(ApplyError::Inconsistent(detail)) => self.resync(&detail),
        }
    }

    fn handle_notification(&self, req: &HttpRequest) -> HttpResponse {
        let Ok(text) = std::str::from_utf8(&req.body) else {
            return HttpResponse::status(400, "Bad Request");
        };
        let msg = match decode_envelope(text) {
            Ok(m) => m,
            Err(e) => {
                log::debug!("[consumer] dropped undecodable notification: {}", e);
                return HttpResponse::status(400, "Bad Request");
            }
        };

        if msg.headers.action == action::WSE_SUBSCRIPTION_END {
            let status = msg
                .document()
                .ok()
                .and_then(|doc| {
                    body_element(&doc).and_then(|b| {
                        child(b, Ns::Wse, "Status")
                            .and_then(|s| s.text())
                            .map(|t| t.trim().to_string())
                    })
                })
                .unwrap_or_default();
            log::debug!("[consumer] subscription ended by source: {}", status);
            *self.subscription.lock() = None;
            self.emit(MirrorEvent::SubscriptionEnded(status));
            return HttpResponse::status(202, "Accepted");
        }

        let Ok(doc) = msg.document() else {
            return HttpResponse::status(400, "Bad Request");
        };
        let Some(body) = body_element(&doc) else {
            return HttpResponse::status(400, "Bad Request");
        };
        match decode_report(&msg.headers.action, body) {
            Ok(DecodedReport::States { action, version, states }) => {
                self.apply_states(action, version, states);
            }
            Ok(DecodedReport::Description { version, created, updated, removed, states }) => {
                let delta = RemoteDelta::Description { created, updated, removed, states };
                match self.mirror.apply_remote(&version, delta) {
                    Ok(()) => self.emit(MirrorEvent::Updated {
                        version: version.mdib_version,
                        action: ReportAction::DescriptionModificationReport,
                    }),
                    Err(ApplyError::Gap(gap)) => self.resync(&gap.to_string()),
                    Err(ApplyError::SequenceChanged { ours, theirs }) => {
                        self.resync(&format!("sequence id changed ({} -> {})", ours, theirs));
                    }
                    Err(ApplyError::Inconsistent(detail)) => self.resync(&detail),
                }
            }
            Ok(DecodedReport::OperationInvoked { info, .. }) => {
                self.emit(MirrorEvent::OperationInvoked(info));
            }
            Ok(DecodedReport::SystemError { text, .. }) => {
                log::warn!("[consumer] provider reported system error: {}", text);
            }
            Err(e) => {
                log::debug!("[consumer] dropped undecodable report: {}", e);
                return HttpResponse::status(400, "Bad Request");
            }
        }
        HttpResponse::status(202, "Accepted")
    }
}

impl SdcConsumer {
    /// One-shot discovery convenience: probe and collect endpoints.
    pub fn discover(
        config: Arc<RuntimeConfig>,
        filter: &ProbeFilter,
        max_wait: Option<Duration>,
    ) -> Result<Vec<DiscoveredEndpoint>, ConsumerError> {
        let wsd = WsDiscovery::start(config, None)?;
        Ok(wsd.probe(filter, max_wait))
    }

    /// Connect to a discovered endpoint: parse its transport address,
    /// fetch the MDIB, build the local mirror.
    pub fn connect(
        config: Arc<RuntimeConfig>,
        endpoint: &DiscoveredEndpoint,
    ) -> Result<Self, ConsumerError> {
        let xaddr = endpoint
            .xaddrs
            .first()
            .ok_or_else(|| ConsumerError::Protocol("endpoint has no XAddrs".to_string()))?;
        Self::connect_to_url(config, xaddr, &endpoint.epr)
    }

    /// Connect directly to a known service URL.
    pub fn connect_to_url(
        config: Arc<RuntimeConfig>,
        service_url: &str,
        provider_epr: &str,
    ) -> Result<Self, ConsumerError> {
        let service = Endpoint::parse(service_url)?;
        let http = Arc::new(HttpClientPool::new(Arc::clone(&config))?);

        let cfg = config.get();
        let iface = cfg.interface.unwrap_or_else(crate::discovery::primary_interface);
        let callback_server = HttpServer::bind(SocketAddr::from((iface, 0)), None)?;
        let callback_path = format!("/notify/{}", uuid::Uuid::new_v4());
        // The notification sink stays plain HTTP; SDC notification-over-TLS
        // would reuse the provider-side server context here.
        let callback_url = format!(
            "http://{}:{}{}",
            iface,
            callback_server.local_addr().port(),
            callback_path
        );

        let inner = Arc::new(Inner {
            http,
            service,
            provider_epr: provider_epr.to_string(),
            mirror: Arc::new(MdibStore::new()),
            callback_url,
            subscription: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
        });

        {
            let inner = Arc::clone(&inner);
            callback_server
                .register(&callback_path, Arc::new(move |req| inner.handle_notification(req)));
        }

        inner.fetch_mdib()?;
        log::debug!(
            "[consumer] connected to {} (mirror at mdib_version {})",
            inner.provider_epr,
            inner.mirror.read_snapshot().mdib_version()
        );

        Ok(Self { inner, callback_server, renew_thread: Mutex::new(None) })
    }

    /// Latest coherent mirror snapshot (blocking API).
    #[must_use]
    pub fn mdib(&self) -> Arc<MdibSnapshot> {
        self.inner.mirror.read_snapshot()
    }

    /// Reactive mirror event stream.
    #[must_use]
    pub fn events(&self) -> Receiver<MirrorEvent> {
        let (tx, rx) = unbounded();
        self.inner.listeners.lock().push(tx);
        rx
    }

    /// Subscribe to a set of report actions; notifications flow into the
    /// mirror. A renew thread keeps the subscription alive at 2/3 TTL.
    pub fn subscribe(&self, actions: &[ReportAction]) -> Result<(), ConsumerError> {
        let filter: Vec<String> = actions.iter().map(|a| a.uri().to_string()).collect();
        let headers = Headers::request(action::WSE_SUBSCRIBE, &self.inner.service.to_string());
        let callback = self.inner.callback_url.clone();
        let envelope = encode_envelope(&headers, |w| {
            w.start(Ns::Wse, "Subscribe");
            w.start(Ns::Wse, "Delivery");
            w.start(Ns::Wse, "NotifyTo");
            w.leaf_text(Ns::Wsa, "Address", &callback);
            w.end();
            w.end();
            w.start(Ns::Wse, "Filter");
            w.attr("Dialect", "http://docs.oasis-open.org/ws-dd/ns/dpws/2009/01/Action");
            w.text(&filter.join(" "));
            w.end();
            w.end();
        });
        let msg = self.inner.soap_post(&envelope)?;
        let doc = msg.document()?;
        let body = body_element(&doc)
            .ok_or_else(|| ConsumerError::Protocol("SubscribeResponse body missing".to_string()))?;
        let manager = child(body, Ns::Wse, "SubscriptionManager")
            .ok_or_else(|| ConsumerError::Protocol("missing wse:SubscriptionManager".to_string()))?;
        let id = child(manager, Ns::Wsa, "ReferenceParameters")
            .and_then(|rp| child(rp, Ns::Wse, "Identifier"))
            .and_then(|i| i.text())
            .map(|t| t.trim().to_string())
            .ok_or_else(|| ConsumerError::Protocol("missing wse:Identifier".to_string()))?;
        let granted = subscribe_expires(body)
            .unwrap_or_else(|| Duration::from_secs(3600));

        *self.inner.subscription.lock() = Some(SubscriptionInfo { id, granted });
        self.start_renew_thread();
        log::debug!("[consumer] subscribed for {:?} (ttl {:?})", actions, granted);
        Ok(())
    }

    fn start_renew_thread(&self) {
        let mut slot = self.renew_thread.lock();
        if slot.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *slot = Some(thread::spawn(move || renew_loop(&inner)));
    }

    /// Invoke SetValue; returns the provider's transaction id. Completion
    /// arrives as [`MirrorEvent::OperationInvoked`].
    pub fn set_value(&self, operation: &str, value: f64) -> Result<u64, ConsumerError> {
        let headers = Headers::request(action::SET_VALUE, &self.inner.service.to_string());
        let envelope = encode_envelope(&headers, |w| {
            w.start(Ns::Msg, "SetValue");
            w.leaf_text(Ns::Msg, "OperationHandleRef", operation);
            w.leaf_text(Ns::Msg, "RequestedNumericValue", &format!("{}", value));
            w.end();
        });
        let msg = self.inner.soap_post(&envelope)?;
        let doc = msg.document()?;
        let body = body_element(&doc)
            .ok_or_else(|| ConsumerError::Protocol("SetValueResponse body missing".to_string()))?;
        invocation_transaction_id(body)
            .ok_or_else(|| ConsumerError::Protocol("missing msg:InvocationInfo".to_string()))
    }

    /// Fetch states of specific descriptors straight from the provider
    /// (bypassing the mirror).
    pub fn get_md_state(&self, handles: &[&str]) -> Result<Vec<State>, ConsumerError> {
        let headers = Headers::request(action::GET_MD_STATE, &self.inner.service.to_string());
        let envelope = encode_envelope(&headers, |w| {
            w.start(Ns::Msg, "GetMdState");
            for h in handles {
                w.leaf_text(Ns::Msg, "HandleRef", h);
            }
            w.end();
        });
        let msg = self.inner.soap_post(&envelope)?;
        let doc = msg.document()?;
        let body = body_element(&doc)
            .ok_or_else(|| ConsumerError::Protocol("GetMdStateResponse body missing".to_string()))?;
        let md_state = child(body, Ns::Pm, "MdState")
            .ok_or_else(|| ConsumerError::Protocol("missing pm:MdState".to_string()))?;
        let mut out = Vec::new();
        for node in md_state.children().filter(|c| crate::biceps::qname::is(*c, Ns::Pm, "State")) {
            out.push(state_from_node(node)?);
        }
        Ok(out)
    }

    /// End the subscription cleanly.
    pub fn unsubscribe(&self) -> Result<(), ConsumerError> {
        let id = match self.inner.subscription.lock().take() {
            Some(info) => info.id,
            None => return Ok(()),
        };
        let mut headers = Headers::request(action::WSE_UNSUBSCRIBE, &self.inner.service.to_string());
        headers.identifier = Some(id);
        let envelope = encode_envelope(&headers, |w| {
            w.start(Ns::Wse, "Unsubscribe");
            w.end();
        });
        self.inner.soap_post(&envelope)?;
        Ok(())
    }

    /// Stop the consumer: unsubscribe best-effort, stop callback server
    /// and renew thread.
    pub fn stop(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.unsubscribe() {
            log::debug!("[consumer] unsubscribe on stop failed: {}", e);
        }
        self.callback_server.shutdown();
        let handle = self.renew_thread.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for SdcConsumer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn subscribe_expires(body: Node<'_, '_>) -> Option<Duration> {
    child(body, Ns::Wse, "Expires")
        .and_then(|e| e.text())
        .and_then(|t| parse_duration_iso(t.trim()))
}

fn invocation_transaction_id(body: Node<'_, '_>) -> Option<u64> {
    child(body, Ns::Msg, "InvocationInfo")
        .and_then(|i| i.attribute("TransactionId"))
        .and_then(|t| t.parse().ok())
}

fn renew_loop(inner: &Arc<Inner>) {
    loop {
        let granted = match &*inner.subscription.lock() {
            Some(info) => info.granted,
            None => return,
        };
        // Renew at two thirds of the granted duration, polling the
        // shutdown flag in small steps.
        let renew_after = granted * 2 / 3;
        let mut waited = Duration::ZERO;
        while waited < renew_after {
            if inner.shutdown.load(Ordering::Relaxed) {
                return;
            }
            let step = Duration::from_millis(250).min(renew_after - waited);
            thread::sleep(step);
            waited += step;
        }

        let id = match &*inner.subscription.lock() {
            Some(info) => info.id.clone(),
            None => return,
        };
        let mut headers = Headers::request(action::WSE_RENEW, &inner.service.to_string());
        headers.identifier = Some(id);
        let requested = format_duration_iso(granted);
        let envelope = encode_envelope(&headers, |w| {
            w.start(Ns::Wse, "Renew");
            w.leaf_text(Ns::Wse, "Expires", &requested);
            w.end();
        });
        match inner.soap_post(&envelope) {
            Ok(msg) => {
                let renewed = msg
                    .document()
                    .ok()
                    .and_then(|doc| body_element(&doc).and_then(subscribe_expires));
                if let Some(renewed) = renewed {
                    let mut guard = inner.subscription.lock();
                    if let Some(info) = guard.as_mut() {
                        info.granted = renewed;
                    }
                }
                log::debug!("[consumer] subscription renewed");
            }
            Err(e) => {
                log::warn!("[consumer] renew failed: {}", e);
                *inner.subscription.lock() = None;
                inner.emit(MirrorEvent::SubscriptionEnded(format!("renew failed: {}", e)));
                return;
            }
        }
    }
}
