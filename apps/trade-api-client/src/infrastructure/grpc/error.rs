//! Client Errors

use tonic::Code;
use tonic_types::StatusExt;

use crate::application::ports::InstrumentSourceError;

/// Error returned by every fallible [`TradeApiClient`](super::TradeApiClient)
/// operation.
#[derive(Debug, thiserror::Error)]
pub enum TradeApiError {
    /// The configured endpoint is not a valid URI.
    #[error("invalid endpoint {endpoint}: {message}")]
    InvalidEndpoint {
        /// Endpoint as configured.
        endpoint: String,
        /// Parser message.
        message: String,
    },

    /// The transport could not be configured.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// The access token cannot be carried in request metadata.
    #[error("access token is not valid ASCII metadata")]
    InvalidToken,

    /// The broker answered with a non-OK status, or the call never reached it.
    #[error("{method} failed with {code:?}: {message}")]
    Rpc {
        /// RPC method name.
        method: &'static str,
        /// gRPC status code.
        code: Code,
        /// Status message.
        message: String,
        /// `ErrorInfo.reason` from the rich status details, if attached.
        reason: Option<String>,
    },

    /// The client has been shut down.
    #[error("client is shut down")]
    Closed,

    /// The client was constructed outside a Tokio runtime.
    #[error("no Tokio runtime available; construct the client inside a runtime")]
    NoRuntime,
}

impl TradeApiError {
    /// Build an [`TradeApiError::Rpc`] from a failed call.
    #[must_use]
    pub fn from_status(method: &'static str, status: &tonic::Status) -> Self {
        let reason = status
            .get_error_details()
            .error_info()
            .map(|info| info.reason.clone())
            .filter(|reason| !reason.is_empty());

        Self::Rpc {
            method,
            code: status.code(),
            message: status.message().to_string(),
            reason,
        }
    }

    /// gRPC status code, if the error came from a call.
    #[must_use]
    pub const fn code(&self) -> Option<Code> {
        match self {
            Self::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Check whether the broker could not be reached.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self.code(),
            Some(Code::Unavailable | Code::DeadlineExceeded)
        )
    }
}

impl From<TradeApiError> for InstrumentSourceError {
    fn from(err: TradeApiError) -> Self {
        Self::Unavailable {
            message: err.to_string(),
        }
    }
}
