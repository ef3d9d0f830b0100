//! Core engine errors and their status-code mapping.

use thiserror::Error;
use uaserve_types::StatusCode;

/// Errors produced by the session and subscription engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("session not found")]
    SessionNotFound,

    #[error("session not activated")]
    SessionNotActivated,

    #[error("session closed")]
    SessionClosed,

    #[error("request arrived on a channel the session is not bound to")]
    ChannelMismatch,

    #[error("certificate does not match the session's bound certificate")]
    CertificateMismatch,

    #[error("identity token rejected")]
    IdentityTokenInvalid,

    #[error("identity cannot change during session transfer")]
    IdentityChangeNotSupported,

    #[error("session limit reached")]
    TooManySessions,

    #[error("subscription limit reached for session")]
    TooManySubscriptions,

    #[error("publish request limit reached")]
    TooManyPublishRequests,

    #[error("subscription {id} not found")]
    SubscriptionNotFound { id: u32 },

    #[error("no subscription available to publish for")]
    NoSubscription,

    #[error("monitored item {id} not found")]
    MonitoredItemNotFound { id: u32 },

    #[error("continuation point invalid or expired")]
    ContinuationPointInvalid,

    #[error("no continuation point available")]
    NoContinuationPoints,

    #[error("notification message {sequence} is no longer available")]
    MessageNotAvailable { sequence: u32 },

    #[error("nothing to do: empty operation list")]
    NothingToDo,

    #[error("too many operations in one request")]
    TooManyOperations,

    #[error("timestamps-to-return value is invalid")]
    TimestampsToReturnInvalid,

    #[error("node unknown")]
    NodeUnknown,

    #[error("attribute id invalid")]
    AttributeInvalid,

    #[error("monitoring mode invalid")]
    MonitoringModeInvalid,

    #[error("monitored item filter unsupported")]
    FilterUnsupported,

    #[error("publish request timed out")]
    PublishTimeout,

    #[error("server shutting down")]
    Shutdown,

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Maps the error onto the status code reported to the client.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::SessionNotFound => StatusCode::BadSessionIdInvalid,
            CoreError::SessionNotActivated => StatusCode::BadSessionNotActivated,
            CoreError::SessionClosed => StatusCode::BadSessionClosed,
            CoreError::ChannelMismatch => StatusCode::BadSecureChannelIdInvalid,
            CoreError::CertificateMismatch => StatusCode::BadNoValidCertificates,
            CoreError::IdentityTokenInvalid => StatusCode::BadIdentityTokenRejected,
            CoreError::IdentityChangeNotSupported => StatusCode::BadIdentityChangeNotSupported,
            CoreError::TooManySessions => StatusCode::BadTooManySessions,
            CoreError::TooManySubscriptions => StatusCode::BadTooManySubscriptions,
            CoreError::TooManyPublishRequests => StatusCode::BadTooManyPublishRequests,
            CoreError::SubscriptionNotFound { .. } => StatusCode::BadSubscriptionIdInvalid,
            CoreError::NoSubscription => StatusCode::BadNoSubscription,
            CoreError::MonitoredItemNotFound { .. } => StatusCode::BadMonitoredItemIdInvalid,
            CoreError::ContinuationPointInvalid => StatusCode::BadContinuationPointInvalid,
            CoreError::NoContinuationPoints => StatusCode::BadNoContinuationPoints,
            CoreError::MessageNotAvailable { .. } => StatusCode::BadMessageNotAvailable,
            CoreError::NothingToDo => StatusCode::BadNothingToDo,
            CoreError::TooManyOperations => StatusCode::BadTooManyOperations,
            CoreError::TimestampsToReturnInvalid => StatusCode::BadTimestampsToReturnInvalid,
            CoreError::NodeUnknown => StatusCode::BadNodeIdUnknown,
            CoreError::AttributeInvalid => StatusCode::BadAttributeIdInvalid,
            CoreError::MonitoringModeInvalid => StatusCode::BadMonitoringModeInvalid,
            CoreError::FilterUnsupported => StatusCode::BadMonitoredItemFilterUnsupported,
            CoreError::PublishTimeout => StatusCode::BadTimeout,
            CoreError::Shutdown => StatusCode::BadShutdown,
            CoreError::Internal(_) => StatusCode::BadInternalError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            CoreError::SessionNotFound.status_code(),
            StatusCode::BadSessionIdInvalid
        );
        assert_eq!(
            CoreError::SubscriptionNotFound { id: 9 }.status_code(),
            StatusCode::BadSubscriptionIdInvalid
        );
        assert_eq!(CoreError::NothingToDo.status_code(), StatusCode::BadNothingToDo);
        assert_eq!(CoreError::PublishTimeout.status_code(), StatusCode::BadTimeout);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            CoreError::SubscriptionNotFound { id: 4 }.to_string(),
            "subscription 4 not found"
        );
        assert_eq!(
            CoreError::MessageNotAvailable { sequence: 12 }.to_string(),
            "notification message 12 is no longer available"
        );
    }
}
