// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Common participant-model value types and enumerations.
//!
//! Enumerations carry their exact wire spellings (`as_str`/`parse_wire`);
//! an unknown literal on decode is a schema violation, never a silent
//! default.

/// Milliseconds since the Unix epoch, the participant model's timestamp unit.
pub type Timestamp = u64;

/// Current wall-clock time as a participant-model timestamp.
#[must_use]
pub fn now_timestamp() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A code from a coding system (defaults to the IEEE nomenclature).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodedValue {
    pub code: String,
    pub coding_system: Option<String>,
    pub coding_system_version: Option<String>,
}

impl CodedValue {
    /// Code in the default (IEEE 11073-10101) coding system.
    #[must_use]
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            coding_system: None,
            coding_system_version: None,
        }
    }

    /// Codes match when code and (explicit or implied) coding system agree.
    #[must_use]
    pub fn matches(&self, other: &CodedValue) -> bool {
        self.code == other.code && self.coding_system == other.coding_system
    }
}

/// An identification in some identifier namespace (patient id, location id, ...).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstanceIdentifier {
    pub root: Option<String>,
    pub extension: Option<String>,
}

/// Human-readable text with an optional language tag.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocalizedText {
    pub text: String,
    pub lang: Option<String>,
}

/// A closed numeric interval; either bound may be open.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Range {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl Range {
    /// True when `v` lies within the (possibly half-open) interval.
    #[must_use]
    pub fn contains(&self, v: f64) -> bool {
        self.lower.map_or(true, |l| v >= l) && self.upper.map_or(true, |u| v <= u)
    }
}

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            /// Wire spelling of this literal.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }

            /// Parse a wire literal; `None` for anything outside the schema set.
            #[must_use]
            pub fn parse_wire(s: &str) -> Option<Self> {
                match s {
                    $($wire => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

wire_enum! {
    /// Measurement validity.
    Validity {
        Valid => "Vld",
        ValidatedData => "Vldated",
        Ongoing => "Ong",
        Questionable => "Qst",
        CalibrationOngoing => "Calib",
        Invalid => "Inv",
        Overflow => "Oflw",
        Underflow => "Uflw",
        NotAvailable => "NA",
    }
}

wire_enum! {
    /// How a measured value was produced.
    GenerationMode {
        Real => "Real",
        Test => "Test",
        Demo => "Demo",
    }
}

wire_enum! {
    /// Activation of a component (MDS, VMD, channel, metric, ...).
    ComponentActivation {
        On => "On",
        NotReady => "NotRdy",
        StandBy => "StndBy",
        Off => "Off",
        Shutdown => "Shtdn",
        Failure => "Fail",
    }
}

wire_enum! {
    /// Activation of an alert system, condition, or signal.
    AlertActivation {
        On => "On",
        Off => "Off",
        Paused => "Psd",
    }
}

wire_enum! {
    /// Nature of an alert condition.
    AlertConditionKind {
        Physiological => "Phy",
        Technical => "Tec",
        Other => "Oth",
    }
}

wire_enum! {
    /// Severity of an alert condition.
    AlertConditionPriority {
        None => "None",
        Low => "Lo",
        Medium => "Me",
        High => "Hi",
    }
}

wire_enum! {
    /// Presence of an alert signal.
    AlertSignalPresence {
        On => "On",
        Off => "Off",
        Latched => "Latch",
        Acknowledged => "Ack",
    }
}

wire_enum! {
    /// How an alert signal manifests to the operator.
    AlertSignalManifestation {
        Audible => "Aud",
        Visible => "Vis",
        Tangible => "Tan",
        Other => "Oth",
    }
}

wire_enum! {
    /// Where an alert signal is generated.
    AlertSignalLocation {
        Local => "Loc",
        Remote => "Rem",
    }
}

wire_enum! {
    /// Association of a context state with its subject.
    ContextAssociation {
        NotAssociated => "No",
        PreAssociated => "Pre",
        Associated => "Assoc",
        Disassociated => "Dis",
    }
}

wire_enum! {
    /// Progress of an invoked operation.
    InvocationState {
        Wait => "Wait",
        Start => "Start",
        Finished => "Fin",
        FinishedWithModification => "FinMod",
        Cancelled => "Cnclld",
        CancelledManually => "CnclldMan",
        Failed => "Fail",
    }
}

wire_enum! {
    /// Why an invoked operation failed.
    InvocationError {
        Unspecified => "Unspec",
        Unknown => "Unkn",
        InvalidValue => "Inv",
        Other => "Oth",
    }
}

wire_enum! {
    /// Whether an operation may currently be invoked.
    OperatingMode {
        Disabled => "Dis",
        Enabled => "En",
        NotAvailable => "NA",
    }
}

wire_enum! {
    /// What role a metric plays.
    MetricCategory {
        Unspecified => "Unspec",
        Measurement => "Msrmt",
        Calculation => "Clc",
        Setting => "Set",
        Presetting => "Preset",
        Recommendation => "Rcmm",
    }
}

wire_enum! {
    /// Whether a metric is determined continuously or on demand.
    MetricAvailability {
        Intermittent => "Intr",
        Continuous => "Cont",
    }
}

wire_enum! {
    /// Risk classification of an entity.
    SafetyClassification {
        Informational => "Inf",
        MedicalClassA => "MedA",
        MedicalClassB => "MedB",
        MedicalClassC => "MedC",
    }
}

impl Default for SafetyClassification {
    fn default() -> Self {
        Self::Informational
    }
}

impl Default for Validity {
    fn default() -> Self {
        Self::Valid
    }
}

impl Default for GenerationMode {
    fn default() -> Self {
        Self::Real
    }
}

/// A numeric measured or derived value with its quality attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricValue {
    pub value: Option<f64>,
    pub determination_time: Option<Timestamp>,
    pub validity: Validity,
    pub generation_mode: GenerationMode,
}

impl MetricValue {
    /// A valid, real measurement determined now.
    #[must_use]
    pub fn measured(value: f64) -> Self {
        Self {
            value: Some(value),
            determination_time: Some(now_timestamp()),
            validity: Validity::Valid,
            generation_mode: GenerationMode::Real,
        }
    }
}

/// A string measured or derived value.
#[derive(Debug, Clone, PartialEq)]
pub struct StringMetricValue {
    pub value: Option<String>,
    pub determination_time: Option<Timestamp>,
    pub validity: Validity,
    pub generation_mode: GenerationMode,
}

/// One block of real-time samples from a waveform source.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleArrayValue {
    pub samples: Vec<f64>,
    pub determination_time: Option<Timestamp>,
    pub validity: Validity,
    pub generation_mode: GenerationMode,
}

/// Activation of one signal manifestation at alert-system level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemSignalActivation {
    pub manifestation: AlertSignalManifestation,
    pub state: AlertActivation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_spellings_roundtrip() {
        for v in [
            Validity::Valid,
            Validity::Questionable,
            Validity::Overflow,
            Validity::NotAvailable,
        ] {
            assert_eq!(Validity::parse_wire(v.as_str()), Some(v));
        }
        assert_eq!(ContextAssociation::parse_wire("Assoc"), Some(ContextAssociation::Associated));
        assert_eq!(InvocationState::parse_wire("FinMod"), Some(InvocationState::FinishedWithModification));
        assert_eq!(Validity::parse_wire("bogus"), None);
    }

    #[test]
    fn range_bounds() {
        let r = Range { lower: Some(0.0), upper: Some(10.0) };
        assert!(r.contains(0.0));
        assert!(r.contains(10.0));
        assert!(!r.contains(10.1));
        let open = Range { lower: None, upper: Some(1.0) };
        assert!(open.contains(-1e9));
    }
}
