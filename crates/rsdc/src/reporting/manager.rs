// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Subscription registry, dispatcher, periodic ticker, delivery threads.

use super::encode::encode_notification;
use super::{
    OperationInvokedInfo, ReportAction, ReportItem, ReportPayload, SubscriptionEndReason,
    SubscriptionError,
};
use crate::biceps::qname::Ns;
use crate::biceps::{Handle, State};
use crate::config::RuntimeConfig;
use crate::mdib::{MdibVersionGroup, TransactionReport, TxKind};
use crate::soap::{action, encode_envelope, Headers};
use crate::transport::{Endpoint, HttpClientPool};
use crossbeam::channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const SOAP_CONTENT_TYPE: &str = "application/soap+xml";

/// What a successful Subscribe returns.
#[derive(Debug, Clone)]
pub struct SubscribeGrant {
    /// Subscription identifier (`urn:uuid:...`), carried as wse:Identifier.
    pub id: String,
    /// Granted duration (requested, clamped to the configured maximum).
    pub expires: Duration,
}

struct Subscription {
    id: String,
    filter: HashSet<ReportAction>,
    notify_to: Endpoint,
    end_to: Option<Endpoint>,
    expires_at: Mutex<Instant>,
    queue_tx: Sender<ReportItem>,
    consecutive_failures: AtomicU32,
    ended: AtomicBool,
    sender_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Subscription {
    fn remaining(&self) -> Duration {
        self.expires_at
            .lock()
            .checked_duration_since(Instant::now())
            .unwrap_or(Duration::ZERO)
    }
}

/// Per-action buffer for periodic aggregation: latest state per key, tagged
/// with the version of the newest contributing commit.
#[derive(Default)]
struct PeriodicBuffer {
    latest: HashMap<Handle, Arc<State>>,
    order: Vec<Handle>,
    version: Option<MdibVersionGroup>,
}

impl PeriodicBuffer {
    fn absorb(&mut self, states: &[Arc<State>], version: &MdibVersionGroup) {
        for s in states {
            let key = s.key().clone();
            if self.latest.insert(key.clone(), Arc::clone(s)).is_none() {
                self.order.push(key);
            }
        }
        self.version = Some(version.clone());
    }

    fn drain(&mut self) -> Option<(Vec<Arc<State>>, MdibVersionGroup)> {
        let version = self.version.take()?;
        let states = self
            .order
            .drain(..)
            .filter_map(|k| self.latest.remove(&k))
            .collect();
        Some((states, version))
    }
}

struct MgrInner {
    config: Arc<RuntimeConfig>,
    http: Arc<HttpClientPool>,
    subs: RwLock<HashMap<String, Arc<Subscription>>>,
    periodic: Mutex<HashMap<ReportAction, PeriodicBuffer>>,
    shutdown: AtomicBool,
}

/// WS-Eventing subscription manager and report fan-out.
pub struct SubscriptionManager {
    inner: Arc<MgrInner>,
    report_tx: Sender<TransactionReport>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl SubscriptionManager {
    /// Start the dispatcher and periodic ticker. Hand
    /// [`SubscriptionManager::report_sink`] to the store.
    #[must_use]
    pub fn start(config: Arc<RuntimeConfig>, http: Arc<HttpClientPool>) -> Self {
        let (report_tx, report_rx) = unbounded::<TransactionReport>();
        let inner = Arc::new(MgrInner {
            config,
            http,
            subs: RwLock::new(HashMap::new()),
            periodic: Mutex::new(HashMap::new()),
            shutdown: AtomicBool::new(false),
        });

        let mut threads = Vec::new();
        {
            let inner = Arc::clone(&inner);
            threads.push(thread::spawn(move || dispatcher_loop(inner, report_rx)));
        }
        {
            let inner = Arc::clone(&inner);
            threads.push(thread::spawn(move || periodic_loop(inner)));
        }

        Self { inner, report_tx, threads: Mutex::new(threads) }
    }

    /// The channel the MDIB store commits its deltas into.
    #[must_use]
    pub fn report_sink(&self) -> Sender<TransactionReport> {
        self.report_tx.clone()
    }

    /// Create a subscription from a WS-Eventing Subscribe.
    ///
    /// # Errors
    ///
    /// `FilterNotSupported` when no filter entry names a supported action,
    /// or the notify-to address does not parse.
    pub fn subscribe(
        &self,
        filter_uris: &[String],
        notify_to: &str,
        end_to: Option<&str>,
        requested: Option<Duration>,
    ) -> Result<SubscribeGrant, SubscriptionError> {
        let mut filter = HashSet::new();
        for uri in filter_uris {
            match ReportAction::from_uri(uri) {
                Some(a) => {
                    filter.insert(a);
                }
                None => return Err(SubscriptionError::FilterNotSupported(uri.clone())),
            }
        }
        if filter.is_empty() {
            return Err(SubscriptionError::FilterNotSupported("<empty>".to_string()));
        }
        let notify_to = Endpoint::parse(notify_to)
            .map_err(|_| SubscriptionError::FilterNotSupported(notify_to.to_string()))?;
        let end_to = end_to.and_then(|e| Endpoint::parse(e).ok());

        let cfg = self.inner.config.get();
        let expires = requested
            .unwrap_or(cfg.subscription_default_ttl)
            .min(cfg.subscription_max_ttl);

        let id = format!("urn:uuid:{}", uuid::Uuid::new_v4());
        let (queue_tx, queue_rx) = bounded(cfg.subscription_max_queue);
        let sub = Arc::new(Subscription {
            id: id.clone(),
            filter,
            notify_to,
            end_to,
            expires_at: Mutex::new(Instant::now() + expires),
            queue_tx,
            consecutive_failures: AtomicU32::new(0),
            ended: AtomicBool::new(false),
            sender_thread: Mutex::new(None),
        });

        let handle = {
            let inner = Arc::clone(&self.inner);
            let sub = Arc::clone(&sub);
            thread::spawn(move || sender_loop(inner, sub, queue_rx))
        };
        *sub.sender_thread.lock() = Some(handle);

        self.inner.subs.write().insert(id.clone(), sub);
        log::debug!("[reporting] subscription {} created (expires in {:?})", id, expires);
        Ok(SubscribeGrant { id, expires })
    }

    /// Renew: extend the expiration instant.
    pub fn renew(
        &self,
        id: &str,
        requested: Option<Duration>,
    ) -> Result<Duration, SubscriptionError> {
        let sub = self.get(id)?;
        let cfg = self.inner.config.get();
        let granted = requested
            .unwrap_or(cfg.subscription_default_ttl)
            .min(cfg.subscription_max_ttl);
        *sub.expires_at.lock() = Instant::now() + granted;
        log::debug!("[reporting] subscription {} renewed for {:?}", id, granted);
        Ok(granted)
    }

    /// GetStatus: remaining time.
    pub fn status(&self, id: &str) -> Result<Duration, SubscriptionError> {
        Ok(self.get(id)?.remaining())
    }

    /// Unsubscribe: clean termination without a SubscriptionEnd message.
    pub fn unsubscribe(&self, id: &str) -> Result<(), SubscriptionError> {
        let sub = self.get(id)?;
        self.inner.subs.write().remove(id);
        sub.ended.store(true, Ordering::Release);
        log::debug!("[reporting] subscription {} unsubscribed", id);
        Ok(())
    }

    /// Emit an OperationInvokedReport outside the store commit path.
    pub fn emit_operation_invoked(&self, version: MdibVersionGroup, info: OperationInvokedInfo) {
        let item = ReportItem {
            action: ReportAction::OperationInvokedReport,
            version,
            payload: ReportPayload::OperationInvoked(info),
        };
        self.inner.fan_out(&item);
    }

    /// Emit a SystemErrorReport.
    pub fn emit_system_error(&self, version: MdibVersionGroup, text: &str) {
        let item = ReportItem {
            action: ReportAction::SystemErrorReport,
            version,
            payload: ReportPayload::SystemError(text.to_string()),
        };
        self.inner.fan_out(&item);
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.subs.read().len()
    }

    /// Terminate everything and stop the pipeline threads.
    pub fn shutdown(&self, reason: SubscriptionEndReason) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let subs: Vec<Arc<Subscription>> = self.inner.subs.write().drain().map(|(_, s)| s).collect();
        for sub in subs {
            self.inner.terminate(&sub, reason);
            let handle = sub.sender_thread.lock().take();
            if let Some(handle) = handle {
                let _ = handle.join();
            }
        }
        for handle in self.threads.lock().drain(..) {
            let _ = handle.join();
        }
        log::debug!("[reporting] pipeline stopped ({:?})", reason);
    }

    fn get(&self, id: &str) -> Result<Arc<Subscription>, SubscriptionError> {
        self.inner
            .subs
            .read()
            .get(id)
            .cloned()
            .ok_or(SubscriptionError::Expired)
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.shutdown(SubscriptionEndReason::SourceShuttingDown);
    }
}

impl MgrInner {
    /// Append one item to every subscription whose filter selects it.
    fn fan_out(&self, item: &ReportItem) {
        let backpressure = self.config.get().backpressure_wait;
        let targets: Vec<Arc<Subscription>> = self
            .subs
            .read()
            .values()
            .filter(|s| s.filter.contains(&item.action))
            .cloned()
            .collect();
        for sub in targets {
            // Briefly block under backpressure, then fail the subscription -
            // never the transaction.
            if sub.queue_tx.send_timeout(item.clone(), backpressure).is_err() {
                log::warn!(
                    "[reporting] subscription {} queue overflow at mdib_version {}",
                    sub.id,
                    item.version.mdib_version
                );
                self.subs.write().remove(&sub.id);
                self.terminate(&sub, SubscriptionEndReason::DeliveryFailure);
            }
        }
    }

    /// Terminate one subscription: mark ended, best-effort SubscriptionEnd.
    fn terminate(&self, sub: &Arc<Subscription>, reason: SubscriptionEndReason) {
        if sub.ended.swap(true, Ordering::AcqRel) {
            return;
        }
        let target = sub.end_to.as_ref().unwrap_or(&sub.notify_to);
        let mut headers = Headers::request(action::WSE_SUBSCRIPTION_END, &target.to_string());
        headers.reply_to = None;
        headers.identifier = Some(sub.id.clone());
        let xml = encode_envelope(&headers, |w| {
            w.start(Ns::Wse, "SubscriptionEnd");
            w.leaf_text(Ns::Wse, "Status", reason.status_uri());
            w.end();
        });
        if let Err(e) = self.http.post(target, SOAP_CONTENT_TYPE, xml.as_bytes(), None) {
            log::debug!("[reporting] SubscriptionEnd for {} undeliverable: {}", sub.id, e);
        }
        log::debug!("[reporting] subscription {} terminated ({:?})", sub.id, reason);
    }
}

/// Dispatcher: decompose transaction reports into per-action slices.
fn dispatcher_loop(inner: Arc<MgrInner>, rx: Receiver<TransactionReport>) {
    loop {
        if inner.shutdown.load(Ordering::Relaxed) {
            break;
        }
        let report = match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(r) => r,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let item = decompose(&report);
        if let Some(item) = &item {
            inner.fan_out(item);
        }

        // Periodic siblings buffer the same slice until the next tick.
        if let (Some(periodic_action), Some(ReportItem { payload: ReportPayload::States(states), .. })) =
            (ReportAction::periodic_for(report.kind), &item)
        {
            inner
                .periodic
                .lock()
                .entry(periodic_action)
                .or_default()
                .absorb(states, &report.version);
        }
    }
}

/// Build the episodic report item of one transaction report.
fn decompose(report: &TransactionReport) -> Option<ReportItem> {
    let action = ReportAction::episodic_for(report.kind);
    let payload = match (report.kind, &report.description) {
        (TxKind::DescriptorModification, Some(delta)) => ReportPayload::Description {
            created: delta.created.clone(),
            updated: delta.updated.clone(),
            removed: delta.removed.clone(),
            states: delta.states.clone(),
        },
        _ => {
            let states: Vec<Arc<State>> =
                report.states.iter().filter_map(|c| c.after.clone()).collect();
            if states.is_empty() {
                return None;
            }
            ReportPayload::States(states)
        }
    };
    Some(ReportItem { action, version: report.version.clone(), payload })
}

/// Ticker: flush periodic buffers once per configured interval and expire
/// overdue subscriptions.
fn periodic_loop(inner: Arc<MgrInner>) {
    let mut next_flush = Instant::now() + inner.config.get().periodic_report_interval;
    loop {
        if inner.shutdown.load(Ordering::Relaxed) {
            break;
        }
        // Short poll so shutdown and expiry stay responsive; the buffers
        // themselves flush only on the interval ticks below.
        let interval = inner.config.get().periodic_report_interval;
        thread::sleep(interval.min(Duration::from_millis(250)));

        if Instant::now() >= next_flush {
            next_flush = Instant::now() + interval;
            let due: Vec<(ReportAction, Vec<Arc<State>>, MdibVersionGroup)> = {
                let mut buffers = inner.periodic.lock();
                buffers
                    .iter_mut()
                    .filter_map(|(a, b)| b.drain().map(|(s, v)| (*a, s, v)))
                    .collect()
            };
            for (action, states, version) in due {
                let item = ReportItem { action, version, payload: ReportPayload::States(states) };
                inner.fan_out(&item);
            }
        }

        // Expire overdue subscriptions.
        let expired: Vec<Arc<Subscription>> = inner
            .subs
            .read()
            .values()
            .filter(|s| s.remaining() == Duration::ZERO)
            .cloned()
            .collect();
        for sub in expired {
            inner.subs.write().remove(&sub.id);
            inner.terminate(&sub, SubscriptionEndReason::Expired);
        }
    }
}

/// Per-subscription delivery: FIFO, serialized, failure-counted.
fn sender_loop(inner: Arc<MgrInner>, sub: Arc<Subscription>, rx: Receiver<ReportItem>) {
    let mut carry: Option<ReportItem> = None;
    loop {
        if sub.ended.load(Ordering::Acquire) || inner.shutdown.load(Ordering::Relaxed) {
            break;
        }
        let item = match carry.take() {
            Some(item) => item,
            None => match rx.recv_timeout(Duration::from_millis(250)) {
                Ok(item) => item,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            },
        };

        // Waveform blocks may coalesce: concatenate immediately queued
        // waveform items (order preserved), stopping at any other action.
        let item = if item.action == ReportAction::WaveformStream {
            let mut merged = item;
            while let Ok(next) = rx.try_recv() {
                if next.action == ReportAction::WaveformStream {
                    if let (
                        ReportPayload::States(acc),
                        ReportPayload::States(more),
                    ) = (&mut merged.payload, &next.payload)
                    {
                        acc.extend(more.iter().cloned());
                        merged.version = next.version.clone();
                        continue;
                    }
                }
                carry = Some(next);
                break;
            }
            merged
        } else {
            item
        };

        let xml = encode_notification(&item, &sub.notify_to.to_string(), &sub.id);
        match inner.http.post(&sub.notify_to, SOAP_CONTENT_TYPE, xml.as_bytes(), None) {
            Ok(resp) if resp.status < 300 => {
                sub.consecutive_failures.store(0, Ordering::Relaxed);
            }
            outcome => {
                let failures = sub.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                match outcome {
                    Ok(resp) => log::debug!(
                        "[reporting] {} rejected notification ({}): failure {}",
                        sub.notify_to,
                        resp.status,
                        failures
                    ),
                    Err(e) => log::debug!(
                        "[reporting] delivery to {} failed: {} (failure {})",
                        sub.notify_to,
                        e,
                        failures
                    ),
                }
                if failures >= inner.config.get().delivery_failure_limit {
                    inner.subs.write().remove(&sub.id);
                    inner.terminate(&sub, SubscriptionEndReason::DeliveryFailure);
                    break;
                }
            }
        }
    }
}
