// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Global configuration - single source of truth.
//!
//! Two levels:
//!
//! - **Static**: compile-time protocol constants (multicast group, SOAP-over-UDP
//!   retransmission schedule, default timings). Never hardcode these elsewhere.
//! - **Dynamic**: [`RuntimeConfig`], an explicitly constructed object passed
//!   through every component constructor. There are no process-wide singletons;
//!   two providers in one process can run with different configurations.
//!
//! The effective [`SdcConfig`] is swapped atomically so long-lived threads can
//! observe updates without locking.

use crate::transport::TrustPredicate;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

// =======================================================================
// WS-Discovery 1.1 / SOAP-over-UDP constants
// =======================================================================

/// IANA-assigned WS-Discovery IPv4 multicast group (WS-DD Discovery 1.1 Sec.2.4).
pub const WSD_MULTICAST_ADDR_V4: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// IANA-assigned WS-Discovery IPv6 multicast group, link-local scope.
pub const WSD_MULTICAST_ADDR_V6: &str = "FF02::C";

/// WS-Discovery UDP port (both multicast and unicast replies).
pub const WSD_PORT: u16 = 3702;

/// SOAP-over-UDP retransmission: lower bound of the initial random delay.
pub const UDP_MIN_DELAY_MS: u64 = 50;

/// SOAP-over-UDP retransmission: upper bound of the initial random delay.
pub const UDP_MAX_DELAY_MS: u64 = 250;

/// SOAP-over-UDP retransmission: cap on the exponentially growing delay.
pub const UDP_UPPER_DELAY_MS: u64 = 500;

/// SOAP-over-UDP retransmission: number of repeats after the first send.
pub const UDP_REPEAT: u32 = 2;

/// Largest discovery datagram we accept. WS-DD mandates support for 32767
/// octets (MTU considerations aside); anything larger is dropped.
pub const WSD_MAX_DATAGRAM: usize = 32 * 1024;

// =======================================================================
// Default timings (overridable through SdcConfig)
// =======================================================================

/// Default window for discovery duplicate suppression.
pub const DEFAULT_DUP_SUPPRESSION_WINDOW: Duration = Duration::from_secs(10);

/// Default upper bound for collecting probe/resolve matches.
pub const DEFAULT_DISCOVERY_MAX_WAIT: Duration = Duration::from_secs(5);

/// Default subscription expiration when the subscriber requests none.
pub const DEFAULT_SUBSCRIPTION_TTL: Duration = Duration::from_secs(3600);

/// Hard cap on granted subscription duration.
pub const DEFAULT_SUBSCRIPTION_MAX_TTL: Duration = Duration::from_secs(7200);

/// Default per-subscription report queue bound.
pub const DEFAULT_SUBSCRIPTION_MAX_QUEUE: usize = 1024;

/// Default aggregation interval for periodic reports.
pub const DEFAULT_PERIODIC_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Default deadline for one HTTP request/response exchange.
pub const DEFAULT_HTTP_DEADLINE: Duration = Duration::from_secs(10);

// =======================================================================
// TLS mode
// =======================================================================

/// TLS operating mode for the HTTP plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// Plain HTTP. The default; common in segregated lab networks.
    #[default]
    Off,
    /// Server-authenticated TLS.
    Server,
    /// Mutually authenticated TLS; peers present certificates and the
    /// configured trust predicate is applied to the peer identity.
    Mutual,
}

/// TLS material and policy.
///
/// Certificate chain and key are PEM blobs; validation is delegated to
/// rustls against `webpki-roots` plus any extra configured anchors, with the
/// SDC-specific [`TrustPredicate`] applied on top of chain validation.
#[derive(Clone, Default)]
pub struct TlsSettings {
    pub mode: TlsMode,
    /// PEM certificate chain presented to peers (server, or client in mutual mode).
    pub cert_chain_pem: Option<Vec<u8>>,
    /// PEM private key matching `cert_chain_pem`.
    pub private_key_pem: Option<Vec<u8>>,
    /// Additional PEM trust anchors (SDC installations commonly pin a site CA).
    pub extra_roots_pem: Vec<Vec<u8>>,
    /// Predicate over the validated peer identity; `None` accepts any
    /// chain-valid peer.
    pub trust_predicate: Option<TrustPredicate>,
}

impl fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSettings")
            .field("mode", &self.mode)
            .field("has_identity", &self.cert_chain_pem.is_some())
            .field("extra_roots", &self.extra_roots_pem.len())
            .field("has_trust_predicate", &self.trust_predicate.is_some())
            .finish()
    }
}

// =======================================================================
// SdcConfig
// =======================================================================

/// The complete set of tunables.
#[derive(Debug, Clone)]
pub struct SdcConfig {
    /// Interface address to bind multicast and HTTP sockets to.
    /// `None` selects the first non-loopback IPv4 interface.
    pub interface: Option<Ipv4Addr>,
    /// TTL for outbound multicast (1 = link-local, the SDC default).
    pub multicast_ttl: u32,
    /// Upper bound for collecting probe/resolve matches.
    pub discovery_max_wait: Duration,
    /// Window in which a repeated (AppSequence, MessageID) pair is discarded.
    pub dup_suppression_window: Duration,
    /// Granted subscription duration when the subscriber requests none.
    pub subscription_default_ttl: Duration,
    /// Hard cap on granted subscription duration.
    pub subscription_max_ttl: Duration,
    /// Per-subscription report queue bound; overflow terminates the subscription.
    pub subscription_max_queue: usize,
    /// Consecutive delivery failures after which a subscription is terminated.
    pub delivery_failure_limit: u32,
    /// How long a full subscription queue may stall the fan-out before the
    /// subscription (never the transaction) is failed.
    pub backpressure_wait: Duration,
    /// Aggregation interval for periodic report actions.
    pub periodic_report_interval: Duration,
    /// Interval of the alert-system self-check worker.
    pub self_check_interval: Duration,
    /// Deadline for one HTTP request/response exchange.
    pub http_deadline: Duration,
    /// Maximum pooled connections per remote host.
    pub http_pool_per_host: usize,
    /// TLS material and policy for the HTTP plane.
    pub tls: TlsSettings,
}

impl Default for SdcConfig {
    fn default() -> Self {
        Self {
            interface: None,
            multicast_ttl: 1,
            discovery_max_wait: DEFAULT_DISCOVERY_MAX_WAIT,
            dup_suppression_window: DEFAULT_DUP_SUPPRESSION_WINDOW,
            subscription_default_ttl: DEFAULT_SUBSCRIPTION_TTL,
            subscription_max_ttl: DEFAULT_SUBSCRIPTION_MAX_TTL,
            subscription_max_queue: DEFAULT_SUBSCRIPTION_MAX_QUEUE,
            delivery_failure_limit: 3,
            backpressure_wait: Duration::from_millis(50),
            periodic_report_interval: DEFAULT_PERIODIC_REPORT_INTERVAL,
            self_check_interval: Duration::from_secs(5),
            http_deadline: DEFAULT_HTTP_DEADLINE,
            http_pool_per_host: 4,
            tls: TlsSettings::default(),
        }
    }
}

// =======================================================================
// RuntimeConfig
// =======================================================================

/// Runtime configuration shared by all components of one provider/consumer.
///
/// The effective [`SdcConfig`] is published through an atomic swap so that
/// long-lived threads read it without locking; free-form string overrides
/// (used by hosts for vendor extensions and test harnesses) live in a
/// lock-free map.
pub struct RuntimeConfig {
    effective: ArcSwap<SdcConfig>,
    overrides: DashMap<Arc<str>, Arc<str>>,
}

impl RuntimeConfig {
    /// Create a runtime configuration from an explicit [`SdcConfig`].
    #[must_use]
    pub fn new(config: SdcConfig) -> Self {
        Self {
            effective: ArcSwap::from_pointee(config),
            overrides: DashMap::new(),
        }
    }

    /// Current effective configuration (cheap, lock-free).
    #[must_use]
    pub fn get(&self) -> Arc<SdcConfig> {
        self.effective.load_full()
    }

    /// Atomically replace the effective configuration.
    ///
    /// Components pick up the new values at their next suspension point;
    /// values captured at construction time (bound ports, queue capacities of
    /// live subscriptions) keep their original sizing.
    pub fn update(&self, mutate: impl FnOnce(&mut SdcConfig)) {
        let mut next = (*self.effective.load_full()).clone();
        mutate(&mut next);
        self.effective.store(Arc::new(next));
    }

    /// Set a free-form override key.
    pub fn set_override(&self, key: &str, value: &str) {
        self.overrides.insert(Arc::from(key), Arc::from(value));
    }

    /// Read a free-form override key.
    #[must_use]
    pub fn get_override(&self, key: &str) -> Option<Arc<str>> {
        self.overrides.get(key).map(|v| v.value().clone())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new(SdcConfig::default())
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("effective", &self.effective.load())
            .field("overrides", &self.overrides.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_mandates() {
        let cfg = SdcConfig::default();
        assert_eq!(cfg.multicast_ttl, 1);
        assert_eq!(cfg.dup_suppression_window, Duration::from_secs(10));
        assert_eq!(cfg.subscription_max_queue, 1024);
        assert_eq!(cfg.periodic_report_interval, Duration::from_secs(1));
        assert_eq!(WSD_PORT, 3702);
        assert_eq!(WSD_MULTICAST_ADDR_V4, Ipv4Addr::new(239, 255, 255, 250));
    }

    #[test]
    fn update_is_visible_to_later_reads() {
        let rt = RuntimeConfig::default();
        rt.update(|c| c.multicast_ttl = 4);
        assert_eq!(rt.get().multicast_ttl, 4);
    }

    #[test]
    fn overrides_roundtrip() {
        let rt = RuntimeConfig::default();
        assert!(rt.get_override("vendor.mode").is_none());
        rt.set_override("vendor.mode", "simulation");
        assert_eq!(rt.get_override("vendor.mode").as_deref(), Some("simulation"));
    }
}
