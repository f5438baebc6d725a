// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Reporting pipeline: transaction deltas in, ordered notification
//! envelopes out.
//!
//! One dispatcher thread decomposes each [`TransactionReport`] into
//! per-action slices and appends them to every subscription whose filter
//! selects the slice. Per-subscription sender threads drain their bounded
//! FIFO in MDIB-version order and post envelopes through the shared HTTP
//! pool. Periodic actions buffer until the next tick; episodic actions go
//! out immediately; a commit matching both feeds both.

pub mod encode;

mod manager;

pub use manager::{SubscribeGrant, SubscriptionManager};

use crate::biceps::pm::{InvocationError, InvocationState};
use crate::biceps::{Descriptor, Handle, State};
use crate::mdib::{MdibVersionGroup, TxKind};
use crate::soap::action;
use std::fmt;
use std::sync::Arc;

/// The closed set of report actions a subscription may filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportAction {
    EpisodicMetricReport,
    PeriodicMetricReport,
    EpisodicAlertReport,
    PeriodicAlertReport,
    EpisodicComponentReport,
    PeriodicComponentReport,
    EpisodicContextReport,
    PeriodicContextReport,
    EpisodicOperationalStateReport,
    PeriodicOperationalStateReport,
    DescriptionModificationReport,
    WaveformStream,
    SystemErrorReport,
    OperationInvokedReport,
}

impl ReportAction {
    /// WS-Addressing action URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            ReportAction::EpisodicMetricReport => action::EPISODIC_METRIC_REPORT,
            ReportAction::PeriodicMetricReport => action::PERIODIC_METRIC_REPORT,
            ReportAction::EpisodicAlertReport => action::EPISODIC_ALERT_REPORT,
            ReportAction::PeriodicAlertReport => action::PERIODIC_ALERT_REPORT,
            ReportAction::EpisodicComponentReport => action::EPISODIC_COMPONENT_REPORT,
            ReportAction::PeriodicComponentReport => action::PERIODIC_COMPONENT_REPORT,
            ReportAction::EpisodicContextReport => action::EPISODIC_CONTEXT_REPORT,
            ReportAction::PeriodicContextReport => action::PERIODIC_CONTEXT_REPORT,
            ReportAction::EpisodicOperationalStateReport => {
                action::EPISODIC_OPERATIONAL_STATE_REPORT
            }
            ReportAction::PeriodicOperationalStateReport => {
                action::PERIODIC_OPERATIONAL_STATE_REPORT
            }
            ReportAction::DescriptionModificationReport => action::DESCRIPTION_MODIFICATION_REPORT,
            ReportAction::WaveformStream => action::WAVEFORM_STREAM,
            ReportAction::SystemErrorReport => action::SYSTEM_ERROR_REPORT,
            ReportAction::OperationInvokedReport => action::OPERATION_INVOKED_REPORT,
        }
    }

    /// Parse an action URI from a subscription filter.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        const ALL: [ReportAction; 14] = [
            ReportAction::EpisodicMetricReport,
            ReportAction::PeriodicMetricReport,
            ReportAction::EpisodicAlertReport,
            ReportAction::PeriodicAlertReport,
            ReportAction::EpisodicComponentReport,
            ReportAction::PeriodicComponentReport,
            ReportAction::EpisodicContextReport,
            ReportAction::PeriodicContextReport,
            ReportAction::EpisodicOperationalStateReport,
            ReportAction::PeriodicOperationalStateReport,
            ReportAction::DescriptionModificationReport,
            ReportAction::WaveformStream,
            ReportAction::SystemErrorReport,
            ReportAction::OperationInvokedReport,
        ];
        ALL.into_iter().find(|a| a.uri() == uri)
    }

    /// XML element name of the report body.
    #[must_use]
    pub const fn element_name(self) -> &'static str {
        match self {
            ReportAction::EpisodicMetricReport => "EpisodicMetricReport",
            ReportAction::PeriodicMetricReport => "PeriodicMetricReport",
            ReportAction::EpisodicAlertReport => "EpisodicAlertReport",
            ReportAction::PeriodicAlertReport => "PeriodicAlertReport",
            ReportAction::EpisodicComponentReport => "EpisodicComponentReport",
            ReportAction::PeriodicComponentReport => "PeriodicComponentReport",
            ReportAction::EpisodicContextReport => "EpisodicContextReport",
            ReportAction::PeriodicContextReport => "PeriodicContextReport",
            ReportAction::EpisodicOperationalStateReport => "EpisodicOperationalStateReport",
            ReportAction::PeriodicOperationalStateReport => "PeriodicOperationalStateReport",
            ReportAction::DescriptionModificationReport => "DescriptionModificationReport",
            ReportAction::WaveformStream => "WaveformStream",
            ReportAction::SystemErrorReport => "SystemErrorReport",
            ReportAction::OperationInvokedReport => "OperationInvokedReport",
        }
    }

    /// The episodic action a transaction kind produces.
    #[must_use]
    pub(crate) const fn episodic_for(kind: TxKind) -> ReportAction {
        match kind {
            TxKind::DescriptorModification => ReportAction::DescriptionModificationReport,
            TxKind::MetricStates => ReportAction::EpisodicMetricReport,
            TxKind::AlertStates => ReportAction::EpisodicAlertReport,
            TxKind::ComponentStates => ReportAction::EpisodicComponentReport,
            TxKind::ContextStates => ReportAction::EpisodicContextReport,
            TxKind::OperationalStates => ReportAction::EpisodicOperationalStateReport,
            TxKind::RealTimeSamples => ReportAction::WaveformStream,
        }
    }

    /// The periodic sibling of a transaction kind, where one exists.
    #[must_use]
    pub(crate) const fn periodic_for(kind: TxKind) -> Option<ReportAction> {
        match kind {
            TxKind::MetricStates => Some(ReportAction::PeriodicMetricReport),
            TxKind::AlertStates => Some(ReportAction::PeriodicAlertReport),
            TxKind::ComponentStates => Some(ReportAction::PeriodicComponentReport),
            TxKind::ContextStates => Some(ReportAction::PeriodicContextReport),
            TxKind::OperationalStates => Some(ReportAction::PeriodicOperationalStateReport),
            TxKind::DescriptorModification | TxKind::RealTimeSamples => None,
        }
    }
}

/// Why a subscription ended (WS-Eventing SubscriptionEnd status).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionEndReason {
    DeliveryFailure,
    Expired,
    SourceShuttingDown,
    SourceCancelling,
    FilterNotSupported,
}

impl SubscriptionEndReason {
    /// WS-Eventing status URI. The wire vocabulary has three values;
    /// expiry and filter problems travel as SourceCancelling.
    #[must_use]
    pub const fn status_uri(self) -> &'static str {
        match self {
            SubscriptionEndReason::DeliveryFailure => {
                "http://schemas.xmlsoap.org/ws/2004/08/eventing/DeliveryFailure"
            }
            SubscriptionEndReason::SourceShuttingDown => {
                "http://schemas.xmlsoap.org/ws/2004/08/eventing/SourceShuttingDown"
            }
            SubscriptionEndReason::Expired
            | SubscriptionEndReason::SourceCancelling
            | SubscriptionEndReason::FilterNotSupported => {
                "http://schemas.xmlsoap.org/ws/2004/08/eventing/SourceCancelling"
            }
        }
    }
}

/// Subscription-layer failure (closed set).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// Delivery to the notify-to endpoint kept failing.
    DeliveryFailure,
    /// The subscription does not exist (anymore).
    Expired,
    /// The bounded report queue overflowed.
    Overflow,
    /// The filter names no supported action.
    FilterNotSupported(String),
}

impl fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionError::DeliveryFailure => write!(f, "delivery failure"),
            SubscriptionError::Expired => write!(f, "subscription expired or unknown"),
            SubscriptionError::Overflow => write!(f, "report queue overflow"),
            SubscriptionError::FilterNotSupported(filter) => {
                write!(f, "unsupported filter \"{}\"", filter)
            }
        }
    }
}

impl std::error::Error for SubscriptionError {}

/// Progress of one invoked operation, as reported to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationInvokedInfo {
    pub transaction_id: u64,
    pub operation_handle: Handle,
    pub invocation_state: InvocationState,
    pub error: Option<InvocationError>,
    pub error_message: Option<String>,
}

/// Payload of one queued report item.
#[derive(Debug, Clone)]
pub enum ReportPayload {
    /// State upserts (all episodic/periodic state reports and waveforms).
    States(Vec<Arc<State>>),
    /// Structural delta.
    Description {
        created: Vec<Arc<Descriptor>>,
        updated: Vec<Arc<Descriptor>>,
        removed: Vec<Arc<Descriptor>>,
        states: Vec<Arc<State>>,
    },
    /// Operation progress.
    OperationInvoked(OperationInvokedInfo),
    /// Free-text system error report.
    SystemError(String),
}

/// One entry of a subscription queue, tagged with the MDIB version it
/// belongs to. Items leave the queue in exactly the order they entered.
#[derive(Debug, Clone)]
pub struct ReportItem {
    pub action: ReportAction,
    pub version: MdibVersionGroup,
    pub payload: ReportPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_roundtrip() {
        for a in [
            ReportAction::EpisodicMetricReport,
            ReportAction::PeriodicContextReport,
            ReportAction::WaveformStream,
            ReportAction::OperationInvokedReport,
        ] {
            assert_eq!(ReportAction::from_uri(a.uri()), Some(a));
        }
        assert_eq!(ReportAction::from_uri("urn:not-a-report"), None);
    }

    #[test]
    fn kind_to_action_mapping() {
        assert_eq!(
            ReportAction::episodic_for(TxKind::MetricStates),
            ReportAction::EpisodicMetricReport
        );
        assert_eq!(
            ReportAction::episodic_for(TxKind::RealTimeSamples),
            ReportAction::WaveformStream
        );
        assert_eq!(ReportAction::periodic_for(TxKind::RealTimeSamples), None);
        assert_eq!(
            ReportAction::periodic_for(TxKind::AlertStates),
            Some(ReportAction::PeriodicAlertReport)
        );
    }
}
