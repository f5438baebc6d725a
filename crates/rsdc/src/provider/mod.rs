// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! SDC provider: publishes an MDIB on the network.
//!
//! Assembly order mirrors the data flow: store, reporting pipeline, SCO,
//! HTTP server with the hosted-service dispatch, then discovery. `start`
//! announces Hello; `stop` terminates subscriptions, says Bye, and joins
//! every owned thread.

mod alarm;
mod services;
mod sco;

pub use alarm::set_alert_condition_presence;
pub use sco::{
    OperationHandler, OperationOutcome, OperationPayload, OperationRequest, ScoRuntime,
};

use crate::biceps::pm::{ContextAssociation, InstanceIdentifier, now_timestamp};
use crate::biceps::{DescriptorKind, State, StateBody};
use crate::config::{RuntimeConfig, TlsMode};
use crate::discovery::{DiscoveredEndpoint, DiscoveryError, WsDiscovery};
use crate::mdib::{MdibError, MdibSnapshot, MdibStore, TransactionError, TxKind};
use crate::reporting::{SubscriptionEndReason, SubscriptionManager};
use crate::transport::{
    build_server_context, HttpClientPool, HttpServer, TransportError,
};
use parking_lot::{Mutex, RwLock};
use services::{soap_handler, ServiceCtx};
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// DPWS model metadata (manufacturer-scoped).
#[derive(Debug, Clone, Default)]
pub struct ThisModel {
    pub manufacturer: String,
    pub manufacturer_url: String,
    pub model_name: String,
    pub model_number: String,
    pub model_url: String,
    pub presentation_url: String,
}

/// DPWS device metadata (instance-scoped).
#[derive(Debug, Clone, Default)]
pub struct ThisDevice {
    pub friendly_name: String,
    pub firmware_version: String,
    pub serial_number: String,
}

/// A point-of-care location, published as a discovery scope and as the
/// associated location context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdcLocation {
    pub facility: String,
    pub point_of_care: String,
    pub bed: String,
}

impl SdcLocation {
    /// The discovery scope URI of this location.
    #[must_use]
    pub fn scope_uri(&self) -> String {
        format!("sdc.ctxt.loc:/{}/{}/{}", self.facility, self.point_of_care, self.bed)
    }
}

/// Provider construction/start failures.
#[derive(Debug)]
pub enum ProviderError {
    Mdib(MdibError),
    Transaction(TransactionError),
    Transport(TransportError),
    Discovery(DiscoveryError),
    Io(io::Error),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Mdib(e) => write!(f, "mdib: {}", e),
            ProviderError::Transaction(e) => write!(f, "transaction: {}", e),
            ProviderError::Transport(e) => write!(f, "transport: {}", e),
            ProviderError::Discovery(e) => write!(f, "discovery: {}", e),
            ProviderError::Io(e) => write!(f, "io: {}", e),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<MdibError> for ProviderError {
    fn from(e: MdibError) -> Self {
        ProviderError::Mdib(e)
    }
}

impl From<TransactionError> for ProviderError {
    fn from(e: TransactionError) -> Self {
        ProviderError::Transaction(e)
    }
}

impl From<TransportError> for ProviderError {
    fn from(e: TransportError) -> Self {
        ProviderError::Transport(e)
    }
}

impl From<DiscoveryError> for ProviderError {
    fn from(e: DiscoveryError) -> Self {
        ProviderError::Discovery(e)
    }
}

impl From<io::Error> for ProviderError {
    fn from(e: io::Error) -> Self {
        ProviderError::Io(e)
    }
}

/// Builder for [`SdcProvider`].
pub struct SdcProviderBuilder {
    name: String,
    config: Arc<RuntimeConfig>,
    mdib_xml: Option<String>,
    store: Option<Arc<MdibStore>>,
    model: ThisModel,
    device: ThisDevice,
    epr: Option<String>,
    discovery: Option<Arc<WsDiscovery>>,
    announce: bool,
}

impl SdcProviderBuilder {
    /// Seed the MDIB from a canonical document.
    #[must_use]
    pub fn with_mdib_document(mut self, xml: &str) -> Self {
        self.mdib_xml = Some(xml.to_string());
        self
    }

    /// Use an already populated store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<MdibStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: Arc<RuntimeConfig>) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: ThisModel) -> Self {
        self.model = model;
        self
    }

    #[must_use]
    pub fn with_device(mut self, device: ThisDevice) -> Self {
        self.device = device;
        self
    }

    /// Fix the endpoint reference (defaults to a fresh `urn:uuid:`).
    #[must_use]
    pub fn with_epr(mut self, epr: &str) -> Self {
        self.epr = Some(epr.to_string());
        self
    }

    /// Share a discovery engine with other providers in the process.
    #[must_use]
    pub fn with_discovery(mut self, discovery: Arc<WsDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Skip WS-Discovery entirely (managed networks where endpoints are
    /// configured out of band).
    #[must_use]
    pub fn without_discovery(mut self) -> Self {
        self.announce = false;
        self
    }

    /// Assemble the provider (bound but unannounced).
    pub fn build(self) -> Result<SdcProvider, ProviderError> {
        let store = match (self.store, self.mdib_xml) {
            (Some(store), _) => store,
            (None, Some(xml)) => Arc::new(MdibStore::from_document(&xml)?),
            (None, None) => Arc::new(MdibStore::new()),
        };
        let epr = self.epr.unwrap_or_else(|| format!("urn:uuid:{}", uuid::Uuid::new_v4()));

        let http_client = Arc::new(HttpClientPool::new(Arc::clone(&self.config))?);
        let subs =
            Arc::new(SubscriptionManager::start(Arc::clone(&self.config), Arc::clone(&http_client)));
        store.set_report_sink(subs.report_sink());
        let sco = ScoRuntime::start(Arc::clone(&store), Arc::clone(&subs));

        let cfg = self.config.get();
        let tls = match cfg.tls.mode {
            TlsMode::Off => None,
            TlsMode::Server => Some(Arc::new(build_server_context(&cfg.tls, false)?)),
            TlsMode::Mutual => Some(Arc::new(build_server_context(&cfg.tls, true)?)),
        };
        let iface = cfg.interface.unwrap_or_else(crate::discovery::primary_interface);
        let bind: SocketAddr = SocketAddr::from((iface, 0));
        let server = HttpServer::bind(bind, tls)?;

        // Service path derived from the EPR's uuid part.
        let path = format!("/{}", epr.rsplit(':').next().unwrap_or("sdc"));
        let scheme = if cfg.tls.mode == TlsMode::Off { "http" } else { "https" };
        let host = if iface == Ipv4Addr::UNSPECIFIED {
            crate::discovery::primary_interface()
        } else {
            iface
        };
        let service_url = format!("{}://{}:{}{}", scheme, host, server.local_addr().port(), path);

        let ctx = Arc::new(ServiceCtx {
            epr: epr.clone(),
            service_url: RwLock::new(service_url.clone()),
            store: Arc::clone(&store),
            subs: Arc::clone(&subs),
            sco: Arc::clone(&sco),
            model: self.model,
            device: self.device,
        });
        server.register(&path, soap_handler(Arc::clone(&ctx)));

        let discovery = if self.announce {
            match self.discovery {
                Some(d) => Some(d),
                None => Some(Arc::new(WsDiscovery::start(Arc::clone(&self.config), None)?)),
            }
        } else {
            None
        };

        Ok(SdcProvider {
            name: self.name,
            epr,
            service_url,
            config: self.config,
            store,
            http_server: server,
            subs,
            sco,
            discovery,
            alarm: Mutex::new(None),
            location: Mutex::new(None),
            metadata_version: AtomicU64::new(1),
            started: AtomicBool::new(false),
        })
    }
}

/// A running (or startable) SDC provider.
pub struct SdcProvider {
    name: String,
    epr: String,
    service_url: String,
    config: Arc<RuntimeConfig>,
    store: Arc<MdibStore>,
    http_server: HttpServer,
    subs: Arc<SubscriptionManager>,
    sco: Arc<ScoRuntime>,
    discovery: Option<Arc<WsDiscovery>>,
    alarm: Mutex<Option<alarm::AlarmRole>>,
    location: Mutex<Option<SdcLocation>>,
    metadata_version: AtomicU64,
    started: AtomicBool,
}

impl SdcProvider {
    /// Start building a provider.
    #[must_use]
    pub fn builder(name: &str) -> SdcProviderBuilder {
        SdcProviderBuilder {
            name: name.to_string(),
            config: Arc::new(RuntimeConfig::default()),
            mdib_xml: None,
            store: None,
            model: ThisModel::default(),
            device: ThisDevice::default(),
            epr: None,
            discovery: None,
            announce: true,
        }
    }

    /// Announce the device (Hello) and start the alert role worker.
    pub fn start(&self) -> Result<(), ProviderError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(discovery) = &self.discovery {
            discovery.publish(self.service_record());
        }
        *self.alarm.lock() =
            Some(alarm::AlarmRole::start(Arc::clone(&self.store), Arc::clone(&self.config)));
        log::debug!("[provider] {} started at {} ({})", self.name, self.service_url, self.epr);
        Ok(())
    }

    /// Stop everything: subscriptions end, Bye goes out, threads join.
    pub fn stop(&self) {
        if !self.started.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(mut alarm) = self.alarm.lock().take() {
            alarm.stop();
        }
        self.subs.shutdown(SubscriptionEndReason::SourceShuttingDown);
        self.sco.stop();
        if let Some(discovery) = &self.discovery {
            discovery.withdraw(&self.epr);
        }
        self.http_server.shutdown();
        log::debug!("[provider] {} stopped", self.name);
    }

    /// The MDIB this provider publishes.
    #[must_use]
    pub fn mdib(&self) -> Arc<MdibStore> {
        Arc::clone(&self.store)
    }

    /// Current snapshot shortcut.
    #[must_use]
    pub fn snapshot(&self) -> Arc<MdibSnapshot> {
        self.store.read_snapshot()
    }

    /// Endpoint reference of this device.
    #[must_use]
    pub fn epr(&self) -> &str {
        &self.epr
    }

    /// Absolute URL of the hosted service endpoint.
    #[must_use]
    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    /// Subscription manager (status inspection, tests).
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subs
    }

    /// Operation runtime, for registering device-specific handlers.
    #[must_use]
    pub fn sco(&self) -> &Arc<ScoRuntime> {
        &self.sco
    }

    /// Flip one alert condition, aggregating alert-system presence in the
    /// same transaction.
    pub fn set_alert_condition_presence(
        &self,
        condition_handle: &str,
        presence: bool,
    ) -> Result<(), TransactionError> {
        alarm::set_alert_condition_presence(&self.store, condition_handle, presence)
    }

    /// Associate a location context (disassociating any previous one in
    /// the same transaction) and re-announce with the location scope.
    pub fn set_location(&self, location: SdcLocation) -> Result<(), ProviderError> {
        if self.location.lock().as_ref() == Some(&location) {
            return Ok(());
        }
        let snap = self.store.read_snapshot();
        let descriptor = snap
            .descriptors_in_tree_order()
            .into_iter()
            .find(|d| d.kind() == DescriptorKind::LocationContext);
        if let Some(descriptor) = descriptor {
            let mut tx = self.store.begin_transaction(TxKind::ContextStates);
            for existing in snap.context_states_of(&descriptor.handle) {
                if let StateBody::Context { association: ContextAssociation::Associated, .. } =
                    existing.body
                {
                    let mut next = (*existing).clone();
                    if let StateBody::Context { association, .. } = &mut next.body {
                        *association = ContextAssociation::Disassociated;
                    }
                    tx.write_state(next)?;
                }
            }
            let instance = format!("{}.loc.{}", descriptor.handle, now_timestamp());
            let mut state = State::new_context(
                &descriptor.handle,
                &instance,
                StateBody::Context {
                    association: ContextAssociation::Associated,
                    binding_mdib_version: None,
                    unbinding_mdib_version: None,
                    binding_start: None,
                    binding_end: None,
                    identifications: vec![InstanceIdentifier {
                        root: Some("sdc.ctxt.loc.detail".to_string()),
                        extension: Some(location.scope_uri()),
                    }],
                },
            );
            state.descriptor_version = descriptor.version;
            tx.write_state(state)?;
            tx.commit()?;
        } else {
            log::debug!("[provider] no location context descriptor; scope-only location");
        }

        *self.location.lock() = Some(location);
        self.metadata_version.fetch_add(1, Ordering::Relaxed);
        if self.started.load(Ordering::Acquire) {
            if let Some(discovery) = &self.discovery {
                discovery.publish(self.service_record());
            }
        }
        Ok(())
    }

    fn service_record(&self) -> DiscoveredEndpoint {
        let mut scopes = vec!["sdc.mds.pkp:1.2.840.10004.20701.1.1".to_string()];
        if let Some(loc) = &*self.location.lock() {
            scopes.push(loc.scope_uri());
        }
        DiscoveredEndpoint {
            epr: self.epr.clone(),
            types: vec!["dpws:Device".to_string(), "mdpws:MedicalDevice".to_string()],
            scopes,
            xaddrs: vec![self.service_url.clone()],
            metadata_version: self.metadata_version.load(Ordering::Relaxed),
        }
    }
}

impl Drop for SdcProvider {
    fn drop(&mut self) {
        self.stop();
    }
}
