//! Instrument Source Port (Driven Port)
//!
//! Interface for fetching the broker's instrument directory.

use async_trait::async_trait;

use crate::domain::instruments::Instrument;

/// Instrument source error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InstrumentSourceError {
    /// The source could not be reached or rejected the request.
    #[error("instrument source unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },
}

/// Port for fetching instrument reference data.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InstrumentSource: Send + Sync {
    /// Fetch every instrument the broker lists.
    async fn fetch_instruments(&self) -> Result<Vec<Instrument>, InstrumentSourceError>;
}
