// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! WS-Addressing action URIs (closed set).
//!
//! Service actions follow the IEEE 11073-20701 service descriptions; the
//! infrastructure actions are the OASIS/W3C ones.

pub const GET_MDIB: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/GetService/GetMdib";
pub const GET_MDIB_RESPONSE: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/GetService/GetMdibResponse";
pub const GET_MD_DESCRIPTION: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/GetService/GetMdDescription";
pub const GET_MD_DESCRIPTION_RESPONSE: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/GetService/GetMdDescriptionResponse";
pub const GET_MD_STATE: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/GetService/GetMdState";
pub const GET_MD_STATE_RESPONSE: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/GetService/GetMdStateResponse";

pub const GET_CONTEXT_STATES: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/ContextService/GetContextStates";
pub const GET_CONTEXT_STATES_RESPONSE: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/ContextService/GetContextStatesResponse";
pub const SET_CONTEXT_STATE: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/ContextService/SetContextState";
pub const SET_CONTEXT_STATE_RESPONSE: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/ContextService/SetContextStateResponse";

pub const SET_VALUE: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/SetService/SetValue";
pub const SET_VALUE_RESPONSE: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/SetService/SetValueResponse";
pub const SET_STRING: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/SetService/SetString";
pub const SET_STRING_RESPONSE: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/SetService/SetStringResponse";
pub const ACTIVATE: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/SetService/Activate";
pub const ACTIVATE_RESPONSE: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/SetService/ActivateResponse";
pub const SET_METRIC_STATE: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/SetService/SetMetricState";
pub const SET_METRIC_STATE_RESPONSE: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/SetService/SetMetricStateResponse";
pub const SET_COMPONENT_STATE: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/SetService/SetComponentState";
pub const SET_COMPONENT_STATE_RESPONSE: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/SetService/SetComponentStateResponse";
pub const SET_ALERT_STATE: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/SetService/SetAlertState";
pub const SET_ALERT_STATE_RESPONSE: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/SetService/SetAlertStateResponse";
pub const OPERATION_INVOKED_REPORT: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/SetService/OperationInvokedReport";

pub const EPISODIC_METRIC_REPORT: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/StateEventService/EpisodicMetricReport";
pub const PERIODIC_METRIC_REPORT: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/StateEventService/PeriodicMetricReport";
pub const EPISODIC_ALERT_REPORT: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/StateEventService/EpisodicAlertReport";
pub const PERIODIC_ALERT_REPORT: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/StateEventService/PeriodicAlertReport";
pub const EPISODIC_COMPONENT_REPORT: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/StateEventService/EpisodicComponentReport";
pub const PERIODIC_COMPONENT_REPORT: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/StateEventService/PeriodicComponentReport";
pub const EPISODIC_OPERATIONAL_STATE_REPORT: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/StateEventService/EpisodicOperationalStateReport";
pub const PERIODIC_OPERATIONAL_STATE_REPORT: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/StateEventService/PeriodicOperationalStateReport";
pub const SYSTEM_ERROR_REPORT: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/StateEventService/SystemErrorReport";
pub const EPISODIC_CONTEXT_REPORT: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/ContextService/EpisodicContextReport";
pub const PERIODIC_CONTEXT_REPORT: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/ContextService/PeriodicContextReport";
pub const DESCRIPTION_MODIFICATION_REPORT: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/DescriptionEventService/DescriptionModificationReport";
pub const WAVEFORM_STREAM: &str =
    "http://standards.ieee.org/downloads/11073/11073-20701-2018/WaveformService/WaveformStream";

pub const WSE_SUBSCRIBE: &str = "http://schemas.xmlsoap.org/ws/2004/08/eventing/Subscribe";
pub const WSE_SUBSCRIBE_RESPONSE: &str =
    "http://schemas.xmlsoap.org/ws/2004/08/eventing/SubscribeResponse";
pub const WSE_RENEW: &str = "http://schemas.xmlsoap.org/ws/2004/08/eventing/Renew";
pub const WSE_RENEW_RESPONSE: &str = "http://schemas.xmlsoap.org/ws/2004/08/eventing/RenewResponse";
pub const WSE_GET_STATUS: &str = "http://schemas.xmlsoap.org/ws/2004/08/eventing/GetStatus";
pub const WSE_GET_STATUS_RESPONSE: &str =
    "http://schemas.xmlsoap.org/ws/2004/08/eventing/GetStatusResponse";
pub const WSE_UNSUBSCRIBE: &str = "http://schemas.xmlsoap.org/ws/2004/08/eventing/Unsubscribe";
pub const WSE_UNSUBSCRIBE_RESPONSE: &str =
    "http://schemas.xmlsoap.org/ws/2004/08/eventing/UnsubscribeResponse";
pub const WSE_SUBSCRIPTION_END: &str =
    "http://schemas.xmlsoap.org/ws/2004/08/eventing/SubscriptionEnd";

pub const WSD_HELLO: &str = "http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01/Hello";
pub const WSD_BYE: &str = "http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01/Bye";
pub const WSD_PROBE: &str = "http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01/Probe";
pub const WSD_PROBE_MATCHES: &str =
    "http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01/ProbeMatches";
pub const WSD_RESOLVE: &str = "http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01/Resolve";
pub const WSD_RESOLVE_MATCHES: &str =
    "http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01/ResolveMatches";

pub const WXF_GET: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Get";
pub const WXF_GET_RESPONSE: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/GetResponse";

/// SOAP 1.2 fault action.
pub const SOAP_FAULT: &str = "http://www.w3.org/2005/08/addressing/soap/fault";
