// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! # rsdc - Service-oriented Device Connectivity for Rust
//!
//! A pure Rust implementation of the IEEE 11073 SDC family of protocols
//! (BICEPS participant/message model, DPWS, WS-Discovery, WS-Eventing,
//! SOAP 1.2 over HTTP) for interoperating with point-of-care medical
//! devices over IP networks.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rsdc::{RuntimeConfig, SdcProvider, TxKind};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(RuntimeConfig::default());
//!     let seed = std::fs::read_to_string("mdib.xml")?;
//!
//!     // Publish a device (provider side)
//!     let provider = SdcProvider::builder("ventilator")
//!         .with_mdib_document(&seed)
//!         .with_config(config)
//!         .build()?;
//!     provider.start()?;
//!
//!     // Change a metric value; subscribers receive an EpisodicMetricReport
//!     let store = provider.mdib();
//!     let tx = store.begin_transaction(TxKind::MetricStates);
//!     // ... stage state updates ...
//!     tx.commit()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        Application Layer                           |
//! |        SdcProvider (device)  /  SdcConsumer (client mirror)        |
//! +--------------------------------------------------------------------+
//! |                          Service Layer                             |
//! |  Get/Set/Context services | WS-Eventing subscriptions | SCO queue  |
//! +--------------------------------------------------------------------+
//! |                            MDIB Core                               |
//! |  Snapshot store (one writer lane) | Transactions | Report fan-out  |
//! +--------------------------------------------------------------------+
//! |                         Protocol Layer                             |
//! |     BICEPS XML binding | SOAP 1.2 codec | WS-Discovery engine      |
//! +--------------------------------------------------------------------+
//! |                         Transport Layer                            |
//! |      HTTP/1.1 client pool + server | TLS (rustls) | UDP multicast  |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`MdibStore`] | Versioned descriptor/state tree with atomic transactions |
//! | [`Transaction`] | Single-writer staged mutation, one MDIB version per commit |
//! | [`SdcProvider`] | Publishes an MDIB, serves Get/Set/Subscribe operations |
//! | [`SdcConsumer`] | Discovers providers and mirrors their MDIB locally |
//! | [`WsDiscovery`] | Multicast probe/resolve/hello/bye engine |
//! | [`RuntimeConfig`] | All tunables; passed through constructors, no globals |
//!
//! ## Concurrency model
//!
//! One writer lane per MDIB; readers take lock-free snapshots pinned to a
//! specific MDIB version. All long-lived loops are plain threads guarded by
//! shutdown flags and joined on drop. Queues between stages are typed and
//! bounded; subscription delivery is serialized per subscription and
//! parallel across subscriptions.

/// BICEPS participant and message model types plus their XML binding.
pub mod biceps;
/// Compile-time constants and the runtime configuration object.
pub mod config;
/// SDC consumer facade: discover, fetch, subscribe, mirror.
pub mod consumer;
/// WS-Discovery engine (multicast probe/resolve, hello/bye, dedup).
pub mod discovery;
/// MDIB store: snapshots, transactions, version bookkeeping.
pub mod mdib;
/// SDC provider: hosted services, dispatch, operation invocation.
pub mod provider;
/// Report fan-out and WS-Eventing subscription management.
pub mod reporting;
/// SOAP 1.2 envelope codec, WS-Addressing headers, fault mapping.
pub mod soap;
/// HTTP/1.1 transport (client pool, server, TLS).
pub mod transport;

pub use biceps::{
    Descriptor, DescriptorBody, DescriptorKind, Extensions, Handle, State, StateBody, StateClass,
};
pub use biceps::xml::DecodeError;
pub use config::{RuntimeConfig, SdcConfig, TlsMode};
pub use consumer::{ConsumerError, MirrorEvent, SdcConsumer};
pub use discovery::{
    DiscoveredEndpoint, DiscoveryError, DiscoveryEvent, ProbeFilter, RelevancePredicate,
    WsDiscovery,
};
pub use mdib::{
    MdibSnapshot, MdibStore, MdibVersionGroup, Transaction, TransactionError, TransactionReport,
    TxKind, VersionGap,
};
pub use provider::{
    OperationPayload, OperationRequest, ProviderError, SdcLocation, SdcProvider,
    SdcProviderBuilder, ThisDevice, ThisModel,
};
pub use reporting::{ReportAction, SubscriptionEndReason, SubscriptionError, SubscriptionManager};
pub use soap::SoapFault;
pub use transport::{PeerIdentity, TransportError, TrustPredicate};

/// rsdc version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
