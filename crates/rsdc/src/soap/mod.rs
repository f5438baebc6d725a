// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! SOAP 1.2 message plane: envelope codec, WS-Addressing headers, faults.
//!
//! The codec is stateless; request/response correlation state (MessageID to
//! RelatesTo) lives with the transport callers. Everything here works on
//! strings in and strings out - one decoded [`Message`] keeps the raw
//! document so handlers can re-parse the body with full namespace context.

pub mod action;

mod envelope;
mod fault;

pub use envelope::{
    body_element, decode_envelope, encode_envelope, AppSequence, Headers, Message,
};
pub use fault::{FaultCode, SoapFault};

use crate::biceps::xml::DecodeError;
use std::fmt;
use std::time::Duration;

/// Format a duration as the xsd:duration subset WS-Eventing uses.
#[must_use]
pub fn format_duration_iso(d: Duration) -> String {
    format!("PT{}S", d.as_secs())
}

/// Parse the common xsd:duration shapes (`PT30S`, `PT5M`, `PT2H`,
/// `PT1H30M15S`); plain integers are accepted as seconds.
#[must_use]
pub fn parse_duration_iso(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let rest = s.strip_prefix("PT").or_else(|| s.strip_prefix("pt"))?;
    let mut total = 0u64;
    let mut number = String::new();
    for ch in rest.chars() {
        if ch.is_ascii_digit() || ch == '.' {
            number.push(ch);
            continue;
        }
        let value: f64 = number.parse().ok()?;
        number.clear();
        let factor = match ch.to_ascii_uppercase() {
            'H' => 3600.0,
            'M' => 60.0,
            'S' => 1.0,
            _ => return None,
        };
        total += (value * factor) as u64;
    }
    if !number.is_empty() {
        return None;
    }
    Some(Duration::from_secs(total))
}

/// Failure while decoding an inbound SOAP message.
#[derive(Debug)]
pub enum SoapError {
    /// The bytes are not a usable envelope.
    Decode(DecodeError),
    /// The envelope is usable but must be answered with a fault
    /// (MustUnderstand, VersionMismatch).
    Fault(SoapFault),
}

impl fmt::Display for SoapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoapError::Decode(e) => write!(f, "envelope decode: {}", e),
            SoapError::Fault(fault) => write!(f, "fault: {}", fault),
        }
    }
}

impl std::error::Error for SoapError {}

impl From<DecodeError> for SoapError {
    fn from(e: DecodeError) -> Self {
        SoapError::Decode(e)
    }
}

impl From<SoapFault> for SoapError {
    fn from(f: SoapFault) -> Self {
        SoapError::Fault(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_roundtrip() {
        assert_eq!(parse_duration_iso("PT3600S"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration_iso("PT1H30M15S"), Some(Duration::from_secs(5415)));
        assert_eq!(parse_duration_iso("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration_iso("P1D"), None);
        assert_eq!(parse_duration_iso("PT5"), None);
        assert_eq!(format_duration_iso(Duration::from_secs(7200)), "PT7200S");
    }
}
