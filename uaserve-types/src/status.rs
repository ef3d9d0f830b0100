//! OPC UA status codes used by the subscription engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status codes returned in service results and carried on data values.
///
/// These are a subset of the OPC UA status code table, restricted to the
/// codes the subscription engine actually produces. The numeric values are
/// part of the protocol contract and must remain stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StatusCode {
    #[default]
    Good,
    /// Good, but a value was lost to a queue overflow (info bits set).
    GoodWithOverflowBit,
    BadUnexpectedError,
    BadInternalError,
    BadTimeout,
    BadShutdown,
    BadNothingToDo,
    BadTooManyOperations,
    BadIdentityTokenInvalid,
    BadIdentityTokenRejected,
    BadSecureChannelIdInvalid,
    BadNonceInvalid,
    BadSessionIdInvalid,
    BadSessionClosed,
    BadSessionNotActivated,
    BadSubscriptionIdInvalid,
    BadTimestampsToReturnInvalid,
    BadNodeIdInvalid,
    BadNodeIdUnknown,
    BadAttributeIdInvalid,
    BadIndexRangeInvalid,
    BadMonitoringModeInvalid,
    BadMonitoredItemIdInvalid,
    BadMonitoredItemFilterUnsupported,
    BadContinuationPointInvalid,
    BadNoContinuationPoints,
    BadTooManySessions,
    BadApplicationSignatureInvalid,
    BadNoValidCertificates,
    BadViewIdUnknown,
    BadTooManySubscriptions,
    BadTooManyPublishRequests,
    BadNoSubscription,
    BadSequenceNumberUnknown,
    BadMessageNotAvailable,
    BadIdentityChangeNotSupported,
}

impl StatusCode {
    /// Returns the numeric OPC UA status code value.
    pub const fn value(&self) -> u32 {
        match self {
            StatusCode::Good => 0x0000_0000,
            StatusCode::GoodWithOverflowBit => 0x0000_0480,
            StatusCode::BadUnexpectedError => 0x8001_0000,
            StatusCode::BadInternalError => 0x8002_0000,
            StatusCode::BadTimeout => 0x800A_0000,
            StatusCode::BadShutdown => 0x800C_0000,
            StatusCode::BadNothingToDo => 0x800F_0000,
            StatusCode::BadTooManyOperations => 0x8010_0000,
            StatusCode::BadIdentityTokenInvalid => 0x8020_0000,
            StatusCode::BadIdentityTokenRejected => 0x8021_0000,
            StatusCode::BadSecureChannelIdInvalid => 0x8022_0000,
            StatusCode::BadNonceInvalid => 0x8024_0000,
            StatusCode::BadSessionIdInvalid => 0x8025_0000,
            StatusCode::BadSessionClosed => 0x8026_0000,
            StatusCode::BadSessionNotActivated => 0x8027_0000,
            StatusCode::BadSubscriptionIdInvalid => 0x8028_0000,
            StatusCode::BadTimestampsToReturnInvalid => 0x802B_0000,
            StatusCode::BadNodeIdInvalid => 0x8033_0000,
            StatusCode::BadNodeIdUnknown => 0x8034_0000,
            StatusCode::BadAttributeIdInvalid => 0x8035_0000,
            StatusCode::BadIndexRangeInvalid => 0x8036_0000,
            StatusCode::BadMonitoringModeInvalid => 0x8041_0000,
            StatusCode::BadMonitoredItemIdInvalid => 0x8042_0000,
            StatusCode::BadMonitoredItemFilterUnsupported => 0x8044_0000,
            StatusCode::BadContinuationPointInvalid => 0x804A_0000,
            StatusCode::BadNoContinuationPoints => 0x804B_0000,
            StatusCode::BadTooManySessions => 0x8056_0000,
            StatusCode::BadApplicationSignatureInvalid => 0x8058_0000,
            StatusCode::BadNoValidCertificates => 0x8059_0000,
            StatusCode::BadViewIdUnknown => 0x806B_0000,
            StatusCode::BadTooManySubscriptions => 0x8077_0000,
            StatusCode::BadTooManyPublishRequests => 0x8078_0000,
            StatusCode::BadNoSubscription => 0x8079_0000,
            StatusCode::BadSequenceNumberUnknown => 0x807A_0000,
            StatusCode::BadMessageNotAvailable => 0x807B_0000,
            StatusCode::BadIdentityChangeNotSupported => 0x80C6_0000,
        }
    }

    /// Returns whether the severity is Good (top two bits clear).
    pub const fn is_good(&self) -> bool {
        self.value() & 0x8000_0000 == 0
    }

    /// Returns whether the severity is Bad.
    pub const fn is_bad(&self) -> bool {
        !self.is_good()
    }

    /// Returns this code with the data-value overflow info bit applied.
    ///
    /// Only Good values gain the bit; Bad codes pass through unchanged.
    pub const fn with_overflow_bit(self) -> Self {
        match self {
            StatusCode::Good => StatusCode::GoodWithOverflowBit,
            other => other,
        }
    }

    /// Returns the symbolic name of this status code.
    pub const fn name(&self) -> &'static str {
        match self {
            StatusCode::Good => "Good",
            StatusCode::GoodWithOverflowBit => "GoodWithOverflowBit",
            StatusCode::BadUnexpectedError => "BadUnexpectedError",
            StatusCode::BadInternalError => "BadInternalError",
            StatusCode::BadTimeout => "BadTimeout",
            StatusCode::BadShutdown => "BadShutdown",
            StatusCode::BadNothingToDo => "BadNothingToDo",
            StatusCode::BadTooManyOperations => "BadTooManyOperations",
            StatusCode::BadIdentityTokenInvalid => "BadIdentityTokenInvalid",
            StatusCode::BadIdentityTokenRejected => "BadIdentityTokenRejected",
            StatusCode::BadSecureChannelIdInvalid => "BadSecureChannelIdInvalid",
            StatusCode::BadNonceInvalid => "BadNonceInvalid",
            StatusCode::BadSessionIdInvalid => "BadSessionIdInvalid",
            StatusCode::BadSessionClosed => "BadSessionClosed",
            StatusCode::BadSessionNotActivated => "BadSessionNotActivated",
            StatusCode::BadSubscriptionIdInvalid => "BadSubscriptionIdInvalid",
            StatusCode::BadTimestampsToReturnInvalid => "BadTimestampsToReturnInvalid",
            StatusCode::BadNodeIdInvalid => "BadNodeIdInvalid",
            StatusCode::BadNodeIdUnknown => "BadNodeIdUnknown",
            StatusCode::BadAttributeIdInvalid => "BadAttributeIdInvalid",
            StatusCode::BadIndexRangeInvalid => "BadIndexRangeInvalid",
            StatusCode::BadMonitoringModeInvalid => "BadMonitoringModeInvalid",
            StatusCode::BadMonitoredItemIdInvalid => "BadMonitoredItemIdInvalid",
            StatusCode::BadMonitoredItemFilterUnsupported => "BadMonitoredItemFilterUnsupported",
            StatusCode::BadContinuationPointInvalid => "BadContinuationPointInvalid",
            StatusCode::BadNoContinuationPoints => "BadNoContinuationPoints",
            StatusCode::BadTooManySessions => "BadTooManySessions",
            StatusCode::BadApplicationSignatureInvalid => "BadApplicationSignatureInvalid",
            StatusCode::BadNoValidCertificates => "BadNoValidCertificates",
            StatusCode::BadViewIdUnknown => "BadViewIdUnknown",
            StatusCode::BadTooManySubscriptions => "BadTooManySubscriptions",
            StatusCode::BadTooManyPublishRequests => "BadTooManyPublishRequests",
            StatusCode::BadNoSubscription => "BadNoSubscription",
            StatusCode::BadSequenceNumberUnknown => "BadSequenceNumberUnknown",
            StatusCode::BadMessageNotAvailable => "BadMessageNotAvailable",
            StatusCode::BadIdentityChangeNotSupported => "BadIdentityChangeNotSupported",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#010X})", self.name(), self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity() {
        assert!(StatusCode::Good.is_good());
        assert!(StatusCode::GoodWithOverflowBit.is_good());
        assert!(StatusCode::BadSessionIdInvalid.is_bad());
        assert!(StatusCode::BadTimeout.is_bad());
    }

    #[test]
    fn test_overflow_bit() {
        assert_eq!(
            StatusCode::Good.with_overflow_bit(),
            StatusCode::GoodWithOverflowBit
        );
        // Bad codes are not rewritten
        assert_eq!(
            StatusCode::BadTimeout.with_overflow_bit(),
            StatusCode::BadTimeout
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(StatusCode::Good.to_string(), "Good (0x00000000)");
        assert_eq!(
            StatusCode::BadSessionNotActivated.to_string(),
            "BadSessionNotActivated (0x80270000)"
        );
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&StatusCode::BadNothingToDo).unwrap();
        assert_eq!(json, "\"BadNothingToDo\"");
        let parsed: StatusCode = serde_json::from_str("\"Good\"").unwrap();
        assert_eq!(parsed, StatusCode::Good);
    }
}
