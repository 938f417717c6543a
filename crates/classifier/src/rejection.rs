//! Classification outcomes other than an intent.

use tallyscan_types::{OutPoint, ScriptKind};

/// Why a transaction did not yield an intent.
///
/// Every variant except [`Rejection::MissingInputs`] is an ordinary
/// classification outcome for a transaction that simply is not an overlay
/// transaction (or is malformed). `MissingInputs` means the classifier could
/// not see the transaction's history and must not be skipped silently.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("no protocol marker present")]
    NoMarker,

    #[error("sender could not be determined")]
    NoSender,

    #[error("previous output {}:{} is unavailable", .0.txid, .0.vout)]
    MissingInputs(OutPoint),

    #[error("input or output values out of range")]
    ValueOutOfRange,

    #[error("legacy input spends a non-standard output")]
    LegacyBadOutputType,

    #[error("legacy input of type {0} is not allowed")]
    LegacyBadInputType(ScriptKind),

    #[error("legacy input has no single destination")]
    LegacyNoDestination,

    #[error("marker-tagged input spends a non-standard output")]
    TaggedBadOutputType,

    #[error("marker-tagged input of type {0} is not allowed")]
    TaggedBadInputType(ScriptKind),

    #[error("marker-tagged input has no single destination")]
    TaggedNoDestination,
}

impl Rejection {
    /// Stable negative code recorded in logs and metrics.
    pub fn code(&self) -> i32 {
        match self {
            Rejection::NoMarker => -1,
            Rejection::NoSender => -5,
            Rejection::MissingInputs(_) => -101,
            Rejection::ValueOutOfRange => -102,
            Rejection::LegacyBadOutputType => -104,
            Rejection::LegacyBadInputType(_) => -105,
            Rejection::LegacyNoDestination => -106,
            Rejection::TaggedBadOutputType => -108,
            Rejection::TaggedBadInputType(_) => -109,
            Rejection::TaggedNoDestination => -110,
        }
    }

    pub fn is_input_unavailable(&self) -> bool {
        matches!(self, Rejection::MissingInputs(_))
    }

    /// Low-cardinality label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Rejection::NoMarker => "no_marker",
            Rejection::NoSender => "no_sender",
            Rejection::MissingInputs(_) => "missing_inputs",
            Rejection::ValueOutOfRange => "value_out_of_range",
            Rejection::LegacyBadOutputType | Rejection::TaggedBadOutputType => "bad_output_type",
            Rejection::LegacyBadInputType(_) | Rejection::TaggedBadInputType(_) => {
                "bad_input_type"
            }
            Rejection::LegacyNoDestination | Rejection::TaggedNoDestination => "no_destination",
        }
    }
}
